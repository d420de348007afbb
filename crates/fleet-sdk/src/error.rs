//! SDK error types

use thiserror::Error;

/// SDK error type
#[derive(Error, Debug)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Runtime error
    #[error("Runtime error: {0}")]
    RuntimeError(#[from] fleet_runtime::RuntimeError),

    /// Rejected input
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] fleet_core::CoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Engine has been shut down
    #[error("Engine is shut down")]
    ShutDown,
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;
