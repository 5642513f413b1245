//! Error types for the sandbox executor.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type.
///
/// Runtime failures of a sandbox (provider down, timeouts, crashing code) are
/// never surfaced through this type by [`crate::Executor::execute`]; they are
/// folded into the [`crate::ExecutionResult`]. This enum covers contract
/// violations and the plumbing around the executor.
#[derive(Error, Debug)]
pub enum Error {
    /// The execution request violates its contract.
    #[error("invalid execution request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to read a configuration file.
    #[error("failed to read {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration could not be parsed.
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for executor operations.
pub type Result<T> = std::result::Result<T, Error>;
