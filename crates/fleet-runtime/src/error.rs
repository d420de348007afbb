//! Runtime error types

use fleet_core::CoreError;
use thiserror::Error;

/// Runtime error
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Input rejected before processing
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] CoreError),

    /// Could not establish the broker connection
    #[error("Transport connect error: {0}")]
    Connect(String),

    /// Publish was not accepted by the transport
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// Subscription could not be registered
    #[error("Subscribe to '{pattern}' failed: {reason}")]
    Subscribe { pattern: String, reason: String },

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Partner delivery failure
    #[error("Dispatch to partner '{partner}' failed: {reason}")]
    Dispatch { partner: String, reason: String },

    /// Operation exceeded its deadline
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Partner rate limit exhausted
    #[error("Rate limit exceeded for partner '{0}'")]
    RateLimited(String),

    /// Component is shut down or its queue is closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unreadable or invalid configuration input (partner files ...)
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;
