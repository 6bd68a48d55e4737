//! Error types for the scenario harness
//!
//! These are infrastructure errors raised by collaborators (shell backend,
//! configuration loading, result sinks). Step-level classification lives in
//! [`crate::scenario::StepError`].

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === VM Errors ===
    #[error("VM '{0}' is not alive")]
    VmNotAlive(String),

    #[error("Guest kernel crashed:\n{0}")]
    GuestCrashed(String),

    // === Command Errors ===
    #[error("Command '{command}' failed with status {status:?}: {output}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },

    #[error("Command '{command}' timed out after {}s", .after.as_secs_f64())]
    CommandTimeout { command: String, after: Duration },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Invalid parameter '{key}': {reason}")]
    InvalidParam { key: String, reason: String },

    #[error("Missing required parameter '{0}'")]
    MissingParam(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("Failed to remove file '{path}': {error}")]
    FileRemove { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a command failed error
    pub fn command_failed(command: &str, status: Option<i32>, output: &str) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            status,
            output: output.trim().to_string(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_param(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the operation ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::CommandTimeout { .. })
    }
}
