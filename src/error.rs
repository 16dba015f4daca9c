//! Error types shared by the indexer and the search engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while indexing or searching a document tree.
#[derive(Debug, Error)]
pub enum Error {
    /// Root path, shard-group or shard index does not exist
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// The text extractor could not read a document
    #[error("text extraction failed for {path}: {message}")]
    ExtractionFailed { path: PathBuf, message: String },

    /// A shard index on disk is unreadable or inconsistent
    #[error("index corrupt at {path}: {message}")]
    IndexCorrupt { path: PathBuf, message: String },

    /// Every shard of a shard-group failed to open
    #[error("no usable shard indexes under {0}")]
    NoUsableShards(PathBuf),

    /// Cooperative cancellation was requested
    #[error("operation cancelled")]
    Cancelled,

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A document filter glob or query pattern did not compile
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

impl Error {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::IndexCorrupt {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn extraction(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::ExtractionFailed {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<globset::Error> for Error {
    fn from(e: globset::Error) -> Self {
        Error::InvalidPattern(e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidPattern(e.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
