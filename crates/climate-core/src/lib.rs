pub mod config;
pub mod error;

pub use config::{ApiConfig, Config, ConfigValidationError, LocationConfig, ValidationResult};
pub use error::{NetworkError, ReqwestErrorExt, StorageError};

use anyhow::Result;

/// Initialize logging for the application.
///
/// Library crates only emit `tracing` events; the binary calls this once.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    tracing::info!("Climate core initialized");
    Ok(())
}
