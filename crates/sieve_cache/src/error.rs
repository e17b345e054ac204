//! Cache error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while reading or updating the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// An I/O error on a specific path.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A commit could not be applied as a whole.
    #[error("Cache conflict: {0}")]
    Conflict(String),
}

impl CacheError {
    /// Creates an I/O error bound to `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Returns the I/O error kind, if this is an I/O error.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io { source, .. } => Some(source.kind()),
            Self::Conflict(_) => None,
        }
    }
}
