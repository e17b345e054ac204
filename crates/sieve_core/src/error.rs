//! Filter error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::TransformError;

/// Errors that can fail a build pass.
///
/// A pass has no partial success: the first error from any file aborts it.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O error.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The transform failed for a source file.
    #[error("Transform failed for {}: {source}", path.display())]
    Transform {
        /// Source-relative path of the file being transformed.
        path: PathBuf,
        /// The error returned by the transform.
        source: TransformError,
    },

    /// A cache entry references an output missing from the cache directory.
    #[error(
        "Cache entry for {} references missing output {}",
        key.display(),
        missing.display()
    )]
    CacheConsistency {
        /// Source-relative path of the entry.
        key: PathBuf,
        /// The missing output path.
        missing: PathBuf,
    },

    /// A transform produced an output path outside the output tree.
    #[error(
        "Invalid output path {} produced for {}",
        output.display(),
        source_path.display()
    )]
    InvalidOutputPath {
        /// Source-relative path of the file being transformed.
        source_path: PathBuf,
        /// The rejected output path.
        output: PathBuf,
    },

    /// Two outputs of one pass share the same path.
    #[error(
        "Output {} is produced by both {} and {}",
        output.display(),
        first.display(),
        second.display()
    )]
    OutputCollision {
        /// The contested output path.
        output: PathBuf,
        /// Source file that produced it first.
        first: PathBuf,
        /// Source file that produced it again.
        second: PathBuf,
    },

    /// Cache error.
    #[error("Cache error: {0}")]
    Cache(#[from] sieve_cache::CacheError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FilterError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an I/O error bound to `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
