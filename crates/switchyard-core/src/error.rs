//! Error types for switchyard-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Coordination store failure (connection, command, script)
    #[error("store error: {0}")]
    Store(String),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Distributed lock could not be taken before the timeout elapsed
    #[error("lock not acquired: {name}")]
    LockNotAcquired {
        /// Lock name
        name: String,
    },
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
