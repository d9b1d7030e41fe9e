//! Retouch error types

use thiserror::Error;

/// Retouch error type
#[derive(Error, Debug)]
pub enum Error {
    /// File copy, delete or index write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// A mutating store call was made before `initialize()`
    #[error("Artifact store is not initialized")]
    NotInitialized,

    /// An edit was recorded while no editing session is active
    #[error("No active editing session")]
    NoActiveSession,

    /// Image transform collaborator failed
    #[error("Preprocess error: {0}")]
    Preprocess(String),

    /// Remote edit backend failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build a storage error from an operation description and its cause
    pub(crate) fn storage(context: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Error::Storage(format!("{}: {}", context, cause))
    }
}

/// Result type alias for Retouch operations
pub type Result<T> = std::result::Result<T, Error>;
