//! Authorization gate: API-key validation and the access policy seam.
//!
//! Every operation presents an API key. The gate checks that the key exists,
//! matches its stored hash, is not revoked and has not expired, then asks the
//! configured policy whether the operation is allowed on the record kind.
//! The default policy allows every operation for any valid key.

use std::fmt;

use base64::Engine;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::db::repository::{get_api_key, insert_api_key};
use crate::models::enums::{Operation, RecordKind};
use crate::models::ApiKeyInfo;

// ═══════════════════════════════════════════════════════════
// Credentials
// ═══════════════════════════════════════════════════════════

/// A presented API key of the form `<key id>.<secret>`.
///
/// Zeroed on drop. `Debug` only shows the key id.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The public key id in front of the secret.
    pub fn key_id(&self) -> Option<&str> {
        match self.0.split_once('.') {
            Some((id, secret)) if !id.is_empty() && !secret.is_empty() => Some(id),
            _ => None,
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_id() {
            Some(id) => write!(f, "ApiKey({id}.***)"),
            None => f.write_str("ApiKey(***)"),
        }
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl From<&str> for ApiKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// A freshly issued key. The plaintext is only available here.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub key: ApiKey,
    pub info: ApiKeyInfo,
}

/// A key that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCredential {
    pub key_id: String,
    pub expires_at: DateTime<Utc>,
}

/// SHA-256 of the full presented key.
pub fn hash_key(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

/// Generate a new key: a random id and 32 bytes of URL-safe base64 secret.
pub fn generate_key() -> (String, ApiKey) {
    let key_id = Uuid::new_v4().simple().to_string();
    let mut bytes: [u8; 32] = rand::random();
    let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
    bytes.zeroize();
    let key = ApiKey(format!("{key_id}.{secret}"));
    (key_id, key)
}

/// Create and store a key valid until `expires_at`.
pub fn issue_key(
    conn: &Connection,
    description: Option<&str>,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<IssuedApiKey, AuthorizationError> {
    let (key_id, key) = generate_key();
    let info = ApiKeyInfo {
        id: key_id,
        description: description.map(String::from),
        created_at: now,
        expires_at,
        revoked: false,
    };
    insert_api_key(conn, &info, &hash_key(key.expose()))?;
    tracing::info!(key_id = %info.id, expires_at = %info.expires_at, "Issued API key");
    Ok(IssuedApiKey { key, info })
}

// ═══════════════════════════════════════════════════════════
// Policy
// ═══════════════════════════════════════════════════════════

/// Why access was granted (or denied).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// Any valid public API key may perform any operation.
    PublicApiKey,
    /// A custom policy allowed the operation.
    Policy,
    /// The policy refused the operation.
    Denied,
}

/// Result of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    pub fn allow(reason: AccessReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::Denied,
        }
    }
}

/// Decides whether a validated caller may run an operation on a kind.
pub trait AccessPolicy: Send + Sync {
    fn decide(&self, credential: &ValidatedCredential, operation: Operation, kind: RecordKind) -> AccessDecision;
}

impl<F> AccessPolicy for F
where
    F: Fn(&ValidatedCredential, Operation, RecordKind) -> bool + Send + Sync,
{
    fn decide(&self, credential: &ValidatedCredential, operation: Operation, kind: RecordKind) -> AccessDecision {
        if self(credential, operation, kind) {
            AccessDecision::allow(AccessReason::Policy)
        } else {
            AccessDecision::deny()
        }
    }
}

/// Blanket public-API-key access: every operation on every kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicApiKeyPolicy;

impl AccessPolicy for PublicApiKeyPolicy {
    fn decide(&self, _: &ValidatedCredential, _: Operation, _: RecordKind) -> AccessDecision {
        AccessDecision::allow(AccessReason::PublicApiKey)
    }
}

// ═══════════════════════════════════════════════════════════
// Error type
// ═══════════════════════════════════════════════════════════

/// Errors from authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("missing credential")]
    MissingCredential,
    #[error("unknown credential")]
    UnknownCredential,
    #[error("credential expired at {expired_at}")]
    Expired { key_id: String, expired_at: DateTime<Utc> },
    #[error("credential revoked")]
    Revoked { key_id: String },
    #[error("{operation} on {} denied by policy", .kind.label())]
    Denied { operation: Operation, kind: RecordKind },
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

// ═══════════════════════════════════════════════════════════
// Gate
// ═══════════════════════════════════════════════════════════

/// Single policy point in front of the integrity enforcer and the store.
pub struct AuthorizationGate {
    policy: Box<dyn AccessPolicy>,
}

impl AuthorizationGate {
    pub fn new(policy: impl AccessPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }

    /// Check the presented key against the key table.
    pub fn validate(
        &self,
        conn: &Connection,
        credential: Option<&ApiKey>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedCredential, AuthorizationError> {
        let key = match credential {
            Some(key) if !key.is_empty() => key,
            _ => return Err(AuthorizationError::MissingCredential),
        };
        let key_id = key.key_id().ok_or(AuthorizationError::UnknownCredential)?;
        let (info, stored_hash) = get_api_key(conn, key_id)?.ok_or(AuthorizationError::UnknownCredential)?;

        let presented = hash_key(key.expose());
        if !bool::from(presented[..].ct_eq(&stored_hash[..])) {
            return Err(AuthorizationError::UnknownCredential);
        }
        if info.revoked {
            return Err(AuthorizationError::Revoked { key_id: info.id });
        }
        if info.is_expired_at(now) {
            return Err(AuthorizationError::Expired {
                key_id: info.id,
                expired_at: info.expires_at,
            });
        }

        Ok(ValidatedCredential {
            key_id: info.id,
            expires_at: info.expires_at,
        })
    }

    /// Ask the policy about an already validated caller.
    pub fn permit(
        &self,
        credential: &ValidatedCredential,
        operation: Operation,
        kind: RecordKind,
    ) -> Result<AccessDecision, AuthorizationError> {
        let decision = self.policy.decide(credential, operation, kind);
        if !decision.allowed {
            return Err(AuthorizationError::Denied { operation, kind });
        }
        Ok(decision)
    }

    /// Validate the key, then check the policy.
    pub fn authorize(
        &self,
        conn: &Connection,
        credential: Option<&ApiKey>,
        operation: Operation,
        kind: RecordKind,
        now: DateTime<Utc>,
    ) -> Result<ValidatedCredential, AuthorizationError> {
        let result = self
            .validate(conn, credential, now)
            .and_then(|validated| self.permit(&validated, operation, kind).map(|_| validated));
        if let Err(e) = &result {
            tracing::warn!(%operation, %kind, error = %e, "Authorization refused");
        }
        result
    }
}

impl Default for AuthorizationGate {
    fn default() -> Self {
        Self::new(PublicApiKeyPolicy)
    }
}

impl fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationGate").finish_non_exhaustive()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
