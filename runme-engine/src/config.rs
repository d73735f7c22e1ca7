//! Engine Configuration Module
//!
//! Settings are read from environment variables with defaults that match the
//! editor extension. Command line flags override them.

use runme_core::{LifecycleParseError, LifecycleSetting};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle identity setting (`None`, `Doc`, `Cell`, `All` or `0`..`3`).
pub const ENV_LIFECYCLE_IDENTITY: &str = "RUNME_LIFECYCLE_IDENTITY";
/// Log output format (`pretty` or `json`).
pub const ENV_LOG_FORMAT: &str = "RUNME_LOG_FORMAT";
/// Directory for session outputs documents.
pub const ENV_SESSION_OUTPUTS_DIR: &str = "RUNME_SESSION_OUTPUTS_DIR";

// ============================================================================
// LOG FORMAT
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidLogFormat(s.to_string())),
        }
    }
}

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

/// Invalid configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("RUNME_LIFECYCLE_IDENTITY: {0}")]
    Lifecycle(#[from] LifecycleParseError),

    #[error("RUNME_LOG_FORMAT: invalid log format {0} (expected pretty or json)")]
    InvalidLogFormat(String),
}

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Which identities saves create.
    pub lifecycle: LifecycleSetting,

    pub log_format: LogFormat,

    /// Where session outputs documents go. `None` writes them next to the notebook.
    pub session_outputs_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Create EngineConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RUNME_LIFECYCLE_IDENTITY`: `None`, `Doc`, `Cell` or `All` (default: All)
    /// - `RUNME_LOG_FORMAT`: `pretty` or `json` (default: pretty)
    /// - `RUNME_SESSION_OUTPUTS_DIR`: session outputs directory (default: unset)
    ///
    /// Empty values count as unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EngineConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let lifecycle = value(ENV_LIFECYCLE_IDENTITY)
            .map(|v| v.parse::<LifecycleSetting>())
            .transpose()?
            .unwrap_or_default();

        let log_format = value(ENV_LOG_FORMAT)
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        let session_outputs_dir = value(ENV_SESSION_OUTPUTS_DIR).map(PathBuf::from);

        Ok(Self {
            lifecycle,
            log_format,
            session_outputs_dir,
        })
    }
}
