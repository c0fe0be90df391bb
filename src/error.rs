//! Error types for the AI quota service.

use thiserror::Error;

/// Main error type for quota operations.
#[derive(Error, Debug)]
pub enum QuotaError {
    /// The window store could not be reached or rejected the script
    #[error("Window store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The window store answered with something the counter cannot interpret
    #[error("Unexpected window store reply: {0}")]
    UnexpectedReply(String),

    /// The caller asked for something the counter cannot do
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuotaError {
    /// Whether this error means the store could not complete the atomic step.
    ///
    /// These are the failures a `StoreFailurePolicy` is applied to.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, QuotaError::Store(_) | QuotaError::UnexpectedReply(_))
    }
}

/// Result type alias for quota operations.
pub type Result<T> = std::result::Result<T, QuotaError>;
