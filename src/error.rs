//! Centralized error types for the codex core engine.
//!
//! One variant per entry in the error taxonomy so callers get a stable
//! discriminator instead of matching on string content, with an embedded
//! detail string for diagnostics.

use thiserror::Error;

/// Primary error type returned by every fallible operation in this crate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A `codex://` URI failed to parse (bad prefix, missing/empty components).
    #[error("invalid uri: {0}")]
    InvalidUri(String),

    /// A path component contained `..` or an illegal separator after decoding.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The requested content does not exist at any storage provider.
    #[error("not found: {0}")]
    NotFound(String),

    /// The provider rejected the request for missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A network or subprocess transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The fetched content exceeded the configured `max_size`.
    #[error("content too large: {0}")]
    ContentTooLarge(String),

    /// No registered storage provider claimed the reference.
    #[error("no provider available for reference: {0}")]
    NoProvider(String),

    /// An on-disk cache entry was unreadable or inconsistent and was treated as absent.
    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    /// A sync produced a conflicting change with no resolution policy available.
    #[error("sync conflict: {0}")]
    SyncConflict(String),

    /// A sync was already running against this working tree.
    #[error("sync already in progress: {0}")]
    SyncInProgress(String),

    /// A caller-supplied configuration value was invalid.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Generic I/O failure (file read/write, directory creation, rename, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller's cancellation token fired before the operation finished.
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<globset::Error> for Error {
    fn from(err: globset::Error) -> Self {
        Error::ConfigInvalid(format!("invalid glob pattern: {err}"))
    }
}
