pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Unknown field {field} on {entity_type}")]
    UnknownField { entity_type: String, field: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Version conflict on {entity_type} {id}: expected {expected}, found {actual}")]
    VersionConflict {
        entity_type: String,
        id: String,
        expected: i64,
        actual: i64,
    },
}

impl DatabaseError {
    /// True when SQLite gave up waiting for a lock held by another connection.
    pub fn is_busy(&self) -> bool {
        match self {
            DatabaseError::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}
