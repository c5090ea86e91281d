use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "ClinicStore";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the store database inside its directory.
pub const DB_FILE_NAME: &str = "clinicstore.db";

pub const ENV_CASCADE_DELETES: &str = "CLINICSTORE_CASCADE_DELETES";
pub const ENV_CREDENTIAL_TTL_DAYS: &str = "CLINICSTORE_CREDENTIAL_TTL_DAYS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CLINICSTORE_BUSY_TIMEOUT_MS";

/// Longest lifetime of an issued API key, in days.
pub const MAX_CREDENTIAL_TTL_DAYS: i64 = 365;

/// Key lifetimes accepted for issued API keys, in days.
const CREDENTIAL_TTL_RANGE: std::ops::RangeInclusive<i64> = 1..=MAX_CREDENTIAL_TTL_DAYS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("credentialTTLDays must be between 1 and 365, got {0}")]
    TtlOutOfRange(i64),
}

/// Options recognized by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Delete dependents along with a parent when the caller does not say.
    pub cascade_deletes: bool,
    /// Lifetime of newly issued API keys.
    #[serde(rename = "credentialTTLDays")]
    pub credential_ttl_days: i64,
    /// How long a call waits for a lock held by another writer.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cascade_deletes: false,
            credential_ttl_days: 30,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `CLINICSTORE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_CASCADE_DELETES) {
            config.cascade_deletes = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(invalid(ENV_CASCADE_DELETES, value)),
            };
        }
        if let Some(value) = lookup(ENV_CREDENTIAL_TTL_DAYS) {
            config.credential_ttl_days = value
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_CREDENTIAL_TTL_DAYS, value.clone()))?;
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = value
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_BUSY_TIMEOUT_MS, value.clone()))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !CREDENTIAL_TTL_RANGE.contains(&self.credential_ttl_days) {
            return Err(ConfigError::TtlOutOfRange(self.credential_ttl_days));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn credential_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.credential_ttl_days)
    }
}

fn invalid(name: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { name, value }
}

/// Get the application data directory (platform data dir + app name).
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_NAME))
}

/// Default location of the store database.
pub fn default_db_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join(DB_FILE_NAME))
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "clinicstore_lib=info,warn"
}
