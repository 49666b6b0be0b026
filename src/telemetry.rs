//! Tracing subscriber setup for processes embedding the indexer.

use crate::config::LoggingSettings;
use crate::error::{ConfigError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins over the configured filter. Fails if the filter does not
/// parse or a global subscriber is already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&settings.filter).map_err(|e| {
            ConfigError::Invalid(format!("invalid log filter {:?}: {e}", settings.filter))
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::debug!("tracing initialized");
    Ok(())
}
