//! Error types for sitesync-core

use thiserror::Error;

/// Result type alias using sitesync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sitesync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// `SQLite` error from one of the local stores
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Truncated or invalid photo archive
    #[error("Photo archive is corrupt: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Archive entry that would land outside the photos directory
    #[error("Photo archive entry is not a plain file name: {0}")]
    UnsafeArchiveEntry(String),

    /// Archive entry that decompresses past the per-photo limit
    #[error("Photo archive entry {0} exceeds {1} bytes")]
    OversizedArchiveEntry(String, u64),

    /// Outbound HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Requested store file or row is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
