//! Error handling for the beacon agent
//!
//! Probe failures are not errors: a camera or host that does not answer is a
//! normal negative liveness result. Everything here is logged by the caller
//! and never terminates the agent once it is running.

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Directory API refresh failed (stale snapshot is kept)
    #[error("Directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// Collector unreachable or rejected the batch
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// Local JSON artifact could not be parsed
    #[error("Storage corrupt at {}: {message}", path.display())]
    StorageCorrupt { path: PathBuf, message: String },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for local storage corruption, which callers degrade to "empty"
    pub fn is_storage_corrupt(&self) -> bool {
        matches!(self, Error::StorageCorrupt { .. })
    }
}
