use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::enums::RecordKind;

/// Remember a deleted id so it is never assigned again.
pub fn insert_tombstone(
    conn: &Connection,
    kind: RecordKind,
    id: &str,
    deleted_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO tombstones (kind, id, deleted_at) VALUES (?1, ?2, ?3)",
        params![kind.as_str(), id, deleted_at],
    )?;
    Ok(())
}

pub fn is_tombstoned(conn: &Connection, kind: RecordKind, id: &str) -> Result<bool, DatabaseError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM tombstones WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}
