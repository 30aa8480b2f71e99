//! Tracing subscriber setup

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::{LogFormat, LoggingConfig};
use crate::domain::DomainError;

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), DomainError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => configured_filter(&config.level)?,
    };

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
    };

    result.map_err(|e| DomainError::internal(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!(
        level = %config.level,
        format = ?config.format,
        "Logging initialized"
    );
    Ok(())
}

fn configured_filter(level: &str) -> Result<EnvFilter, DomainError> {
    EnvFilter::try_new(level)
        .map_err(|e| DomainError::configuration(format!("Invalid log level '{}': {}", level, e)))
}
