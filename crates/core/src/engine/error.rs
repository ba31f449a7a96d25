//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a codec engine instance.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be launched.
    #[error("Engine binary not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The entry name would escape the engine's namespace.
    #[error("Invalid virtual file name: {name:?}")]
    InvalidName { name: String },

    /// The requested entry does not exist in the namespace.
    #[error("Virtual file not found: {name}")]
    FileNotFound { name: String },

    /// A single engine invocation ran past its deadline.
    #[error("Engine invocation timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while touching the namespace.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Creates a new invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// Creates a new file not found error.
    pub fn file_not_found(name: impl Into<String>) -> Self {
        Self::FileNotFound { name: name.into() }
    }
}
