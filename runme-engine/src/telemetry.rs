//! Tracing subscriber initialization

use crate::config::LogFormat;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "runme_engine=info,warn";

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub log_format: LogFormat,
    /// Fallback filter directives when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    pub fn with_format(log_format: LogFormat) -> Self {
        Self {
            log_format,
            ..Self::default()
        }
    }
}

#[derive(Debug, Error)]
#[error("Failed to init subscriber: {0}")]
pub struct TelemetryError(String);

/// Installs the global tracing subscriber, writing to stderr.
///
/// Safe to call more than once; only the first call has any effect.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    INITIALIZED
        .get_or_try_init(|| {
            let env_filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.default_filter))
                .map_err(|e| TelemetryError(e.to_string()))?;

            let registry = tracing_subscriber::registry().with(env_filter);
            let result = match config.log_format {
                LogFormat::Json => registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                    .try_init(),
                LogFormat::Pretty => registry
                    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                    .try_init(),
            };
            result.map_err(|e| TelemetryError(e.to_string()))?;

            tracing::debug!(format = %config.log_format, "Telemetry initialized");
            Ok(())
        })
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_telemetry_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.default_filter, DEFAULT_FILTER);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = TelemetryConfig::with_format(LogFormat::Json);
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
