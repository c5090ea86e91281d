use std::collections::VecDeque;

use rusqlite::Connection;

use crate::db::repository::list_records_page;
use crate::models::enums::RecordKind;
use crate::models::{ListFilter, Record};

use super::StoreError;

/// Rows fetched per round trip.
pub const LIST_PAGE_SIZE: usize = 100;

/// Lazy, finite listing of one kind, fetched a page at a time in id order.
///
/// Each page is read in its own statement, so a long scan never holds a lock
/// and sees every record committed before its page was read. `restart`
/// begins again from the first id.
pub struct RecordScan {
    conn: Connection,
    kind: RecordKind,
    filter: ListFilter,
    page_size: usize,
    cursor: Option<String>,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl RecordScan {
    pub(crate) fn new(conn: Connection, kind: RecordKind, filter: ListFilter, page_size: usize) -> Self {
        Self {
            conn,
            kind,
            filter,
            page_size: page_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fetch_page(&mut self) -> Result<(), StoreError> {
        let page = list_records_page(
            &self.conn,
            self.kind,
            &self.filter,
            self.cursor.as_deref(),
            self.page_size,
        )?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            self.cursor = Some(last.id().to_string());
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for RecordScan {
    type Item = Result<Record, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl std::fmt::Debug for RecordScan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordScan")
            .field("kind", &self.kind)
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}
