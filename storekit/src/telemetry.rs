use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::StoreError;

/// Installs the global tracing subscriber for a host process.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (e.g. `"storekit=info"`)
/// is used. Fails instead of panicking when a global subscriber already exists.
pub fn init_tracing(default_filter: &str) -> Result<(), StoreError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| StoreError::ConfigError(format!("Invalid log filter: {}", e)))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| StoreError::ConfigError(format!("Tracing already initialized: {}", e)))
}
