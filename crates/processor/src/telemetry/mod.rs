//! Log subscriber setup
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`]. `RUST_LOG`
//! takes precedence over the configured level.

use crate::error::{ProcessorError, Result};
use metricflow_config::ObservabilityConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Build the filter for `config`
pub fn env_filter(config: &ObservabilityConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            ProcessorError::Telemetry(format!("invalid log level '{}': {}", config.log_level, e))
        }),
    }
}

/// Install the global subscriber
///
/// Fails instead of panicking when a subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    installed.map_err(|e| ProcessorError::Telemetry(e.to_string()))
}
