//! Reporter error types
//!
//! Only construction, configuration and terminal dispatch can fail. The
//! reporting path itself never surfaces an error: failures there are
//! rerouted into the escalation pipeline instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for reporter operations
pub type ReporterResult<T> = Result<T, ReporterError>;

/// Errors raised while building a reporter or delivering an escalation
#[derive(Error, Debug)]
pub enum ReporterError {
    /// `build()` was called outside a tokio runtime and no handle was given
    #[error("No tokio runtime available to schedule escalation timers")]
    NoRuntime,

    /// Configuration file could not be read
    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for the expected schema
    #[error("Invalid config at {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Configuration value from the environment could not be parsed
    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },

    /// The terminal action could not hand the report off
    #[error("Terminal action '{action}' failed: {message}")]
    Dispatch { action: String, message: String },
}

impl ReporterError {
    /// Create a dispatch error for the named terminal action
    pub fn dispatch(action: &str, message: impl Into<String>) -> Self {
        Self::Dispatch {
            action: action.to_string(),
            message: message.into(),
        }
    }

    /// Whether the error came from configuration loading
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigRead { .. } | Self::ConfigParse { .. } | Self::InvalidEnv { .. }
        )
    }
}
