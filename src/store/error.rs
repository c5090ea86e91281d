//! Tagged errors returned at the store boundary.
//!
//! Hosts map `ErrorKind` to their own protocol codes; nothing here knows
//! about HTTP or any other transport.

use std::fmt;

use serde::Serialize;

use crate::authorization::AuthorizationError;
use crate::config::ConfigError;
use crate::db::DatabaseError;
use crate::integrity::IntegrityError;

/// Error category a host can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Validation,
    Reference,
    NotFound,
    Conflict,
    Timeout,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Validation => "validation",
            Self::Reference => "reference",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a write conflicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    /// Other records still reference the target.
    HasDependents { count: usize },
    /// The record changed since the caller read it.
    VersionMismatch { expected: i64, actual: i64 },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasDependents { count } => write!(f, "entity has {count} dependents"),
            Self::VersionMismatch { expected, actual } => {
                write!(f, "expected version {expected}, found {actual}")
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Authorization failed: {0}")]
    Auth(AuthorizationError),

    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{field} references missing {entity} {id}")]
    Reference { field: String, entity: String, id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Conflict on {entity} {id}: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: ConflictReason,
    },

    #[error("Timed out waiting for the database")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::Auth,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Reference { .. } => ErrorKind::Reference,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Timeout => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for a lost version race or a lock wait that ran out.
    /// Dependents blocking a delete will not go away on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict {
                reason: ConflictReason::VersionMismatch { .. },
                ..
            } | Self::Timeout
        )
    }

    /// Structured form for hosts that serialize errors.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

/// Serializable error description.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        if e.is_busy() {
            return StoreError::Timeout;
        }
        match e {
            DatabaseError::NotFound { entity_type, id } => StoreError::NotFound {
                entity: entity_type,
                id,
            },
            DatabaseError::VersionConflict {
                entity_type,
                id,
                expected,
                actual,
            } => StoreError::Conflict {
                entity: entity_type,
                id,
                reason: ConflictReason::VersionMismatch { expected, actual },
            },
            DatabaseError::UnknownField { entity_type, field } => StoreError::Validation {
                reason: format!("{entity_type} has no field {field}"),
                field,
            },
            DatabaseError::ConstraintViolation(reason) => StoreError::Validation {
                field: "kind".into(),
                reason,
            },
            other => StoreError::Internal(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::from(e).into()
    }
}

impl From<IntegrityError> for StoreError {
    fn from(e: IntegrityError) -> Self {
        match e {
            IntegrityError::Validation { field, reason } => StoreError::Validation {
                field: field.into(),
                reason,
            },
            IntegrityError::Reference { field, kind, id } => StoreError::Reference {
                field: field.into(),
                entity: kind.label().into(),
                id,
            },
            IntegrityError::NotFound { kind, id } => StoreError::NotFound {
                entity: kind.label().into(),
                id,
            },
            IntegrityError::HasDependents { kind, id, count } => StoreError::Conflict {
                entity: kind.label().into(),
                id,
                reason: ConflictReason::HasDependents { count },
            },
            IntegrityError::Database(e) => e.into(),
        }
    }
}

impl From<AuthorizationError> for StoreError {
    fn from(e: AuthorizationError) -> Self {
        match e {
            AuthorizationError::Database(e) => e.into(),
            other => StoreError::Auth(other),
        }
    }
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        StoreError::Validation {
            field: "config".into(),
            reason: e.to_string(),
        }
    }
}
