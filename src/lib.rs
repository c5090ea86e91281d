pub mod authorization;
pub mod config;
pub mod db;
pub mod integrity;
pub mod models;
pub mod store;

pub use authorization::{
    AccessDecision, AccessPolicy, AccessReason, ApiKey, IssuedApiKey, PublicApiKeyPolicy, ValidatedCredential,
};
pub use config::StoreConfig;
pub use models::enums::{Operation, RecordKind};
pub use store::{
    CancelToken, Caller, ClinicStore, ConflictReason, DeleteOptions, DeletedRecord, ErrorKind, RecordScan, StoreError,
};

use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber for hosts that have none.
///
/// Reads `RUST_LOG`, falling back to `config::default_log_filter()`.
/// Calling it again, or after the host installed its own subscriber, is a no-op.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{} logging initialized", config::APP_NAME, config::APP_VERSION);
    }
}
