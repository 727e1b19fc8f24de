//! Error types for sizewatch

use thiserror::Error;

/// Core error type for sizewatch operations
#[derive(Error, Debug)]
pub enum SizewatchError {
    /// The resource handle was closed, either explicitly or after a fault.
    /// Permanent until the handle is recreated.
    #[error("resource closed")]
    ResourceClosed,

    #[error("Query error: {0}")]
    Query(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Driver error: {0}")]
    Driver(String),

    /// Nothing to sample. Logged as a warning, never reported as a failure.
    #[error("No targets found: {0}")]
    NoTargetsFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Metric error: {0}")]
    Metric(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SizewatchError {
    /// Whether this error means the handle can no longer be used
    pub fn is_closed(&self) -> bool {
        matches!(self, SizewatchError::ResourceClosed)
    }
}

/// Result type alias for sizewatch operations
pub type Result<T> = std::result::Result<T, SizewatchError>;
