//! Staged output writes.
//!
//! Outputs are first written to uniquely named temporary files inside the
//! directory they will finally live in, then renamed into place by
//! [`CacheStore::commit`](crate::CacheStore::commit). A failed write leaves
//! the cache untouched: dropping [`StagedOutputs`] removes every temporary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::CacheError;

const STAGE_PREFIX: &str = ".sieve-stage-";

/// Output files written under a cache root but not yet visible.
#[derive(Debug)]
pub struct StagedOutputs {
    files: Vec<(PathBuf, NamedTempFile)>,
}

impl StagedOutputs {
    /// Writes every `(relative path, bytes)` pair to a temporary file next to
    /// `root/<relative path>`, creating parent directories as needed.
    ///
    /// Relative paths must already be validated to stay inside `root`.
    pub fn stage<I, B>(root: &Path, outputs: I) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = (PathBuf, B)>,
        B: AsRef<[u8]>,
    {
        let mut files = Vec::new();

        for (rel_path, bytes) in outputs {
            debug_assert!(rel_path.is_relative());
            let dest = root.join(&rel_path);
            let parent = dest.parent().unwrap_or(root);
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

            let mut tmp = tempfile::Builder::new()
                .prefix(STAGE_PREFIX)
                .tempfile_in(parent)
                .map_err(|e| CacheError::io(parent, e))?;
            tmp.write_all(bytes.as_ref())
                .and_then(|()| tmp.flush())
                .map_err(|e| CacheError::io(&dest, e))?;

            files.push((rel_path, tmp));
        }

        debug!("Staged {} output(s) under {}", files.len(), root.display());
        Ok(Self { files })
    }

    /// Relative paths of the staged outputs, in staging order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(path, _)| path.as_path())
    }

    /// Returns the number of staged outputs.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing was staged.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Renames every staged file to its final location under `root`.
    ///
    /// On failure, returns the paths already moved into place together with
    /// the error, so the caller can roll them back. Files not yet moved are
    /// removed when dropped.
    pub(crate) fn persist(self, root: &Path) -> Result<Vec<PathBuf>, (Vec<PathBuf>, CacheError)> {
        let mut persisted = Vec::with_capacity(self.files.len());

        for (rel_path, tmp) in self.files {
            let dest = root.join(&rel_path);
            if let Err(e) = tmp.persist(&dest) {
                return Err((persisted, CacheError::io(&dest, e.error)));
            }
            persisted.push(rel_path);
        }

        Ok(persisted)
    }
}
