use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::authorization::ApiKey;

use super::StoreError;

/// Shared cancellation flag. Honoured up to the moment a write transaction
/// begins; after that the operation always commits or rolls back.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Who is calling, and how the call can be abandoned.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    credential: Option<ApiKey>,
    cancel: Option<CancelToken>,
}

impl Caller {
    pub fn new(key: impl Into<ApiKey>) -> Self {
        Self {
            credential: Some(key.into()),
            cancel: None,
        }
    }

    /// A caller without a credential. Every gated operation refuses it.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn credential(&self) -> Option<&ApiKey> {
        self.credential.as_ref()
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), StoreError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(StoreError::Cancelled),
            _ => Ok(()),
        }
    }
}
