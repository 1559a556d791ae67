//! Core error types

use thiserror::Error;

/// Core error type for namechain
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
