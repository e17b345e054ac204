//! In-memory cache store backed by a cache-side directory.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::mem;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{CacheEntry, CacheError, Signature, StagedOutputs};

const CACHE_DIR_PREFIX: &str = "sieve-cache-";

/// Maps source-relative paths to the outputs last produced for them.
///
/// The output bytes live in a temporary cache-side directory owned by the
/// store. For every entry, each of its `outputs` exists as a regular file
/// under [`CacheStore::root`].
#[derive(Debug)]
pub struct CacheStore {
    /// Directory holding the output bytes.
    dir: TempDir,
    /// Parent for the cache-side directory, `None` for the system temp dir.
    parent: Option<PathBuf>,
    /// In-memory cache entries.
    entries: HashMap<PathBuf, CacheEntry>,
    /// Key whose entry last wrote each cache file.
    owners: HashMap<PathBuf, PathBuf>,
}

impl CacheStore {
    /// Creates an empty store with its directory in the system temp dir.
    pub fn new() -> Result<Self, CacheError> {
        Self::create(None)
    }

    /// Creates an empty store with its directory under `parent`.
    pub fn new_in(parent: impl Into<PathBuf>) -> Result<Self, CacheError> {
        Self::create(Some(parent.into()))
    }

    fn create(parent: Option<PathBuf>) -> Result<Self, CacheError> {
        let dir = make_dir(parent.as_deref())?;
        debug!("Created cache directory {}", dir.path().display());
        Ok(Self {
            dir,
            parent,
            entries: HashMap::new(),
            owners: HashMap::new(),
        })
    }

    /// Returns the cache-side directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Gets the entry for a source-relative path.
    pub fn lookup(&self, key: &Path) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Moves `staged` into place and records it as the entry for `key`,
    /// replacing any previous entry.
    ///
    /// Each cache file is owned by the key that last wrote it. Writing a file
    /// owned by another key drops that key's entry, since its bytes are gone.
    /// Cache files of the previous entry that the new one no longer produces
    /// are removed unless another key has taken them over. If moving the
    /// staged files fails part-way, `key` is left without an entry and the
    /// files already moved are removed again.
    pub fn commit(
        &mut self,
        key: impl Into<PathBuf>,
        signature: Signature,
        staged: StagedOutputs,
    ) -> Result<CacheEntry, CacheError> {
        let key = key.into();
        let previous = self.entries.remove(&key);

        let outputs = match staged.persist(self.dir.path()) {
            Ok(outputs) => outputs,
            Err((moved, error)) => {
                self.claim(&key, &moved);
                self.release(&key, &moved);
                if let Some(previous) = previous {
                    self.release(&key, &previous.outputs);
                }
                return Err(CacheError::conflict(format!(
                    "commit for {} aborted: {error}",
                    key.display()
                )));
            }
        };

        self.claim(&key, &outputs);
        if let Some(previous) = previous {
            let current: HashSet<&PathBuf> = outputs.iter().collect();
            let stale: Vec<PathBuf> = previous
                .outputs
                .into_iter()
                .filter(|p| !current.contains(p))
                .collect();
            self.release(&key, &stale);
        }

        debug!("Committed {} output(s) for {}", outputs.len(), key.display());
        let entry = CacheEntry::new(signature, outputs);
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// Drops the entry for `key` together with the cache files it owns.
    pub fn invalidate(&mut self, key: &Path) {
        if let Some(entry) = self.entries.remove(key) {
            debug!("Invalidated cache entry for {}", key.display());
            self.release(key, &entry.outputs);
        }
    }

    /// Returns the key owning the cache file at `output`.
    pub fn owner(&self, output: &Path) -> Option<&Path> {
        self.owners.get(output).map(PathBuf::as_path)
    }

    /// Records `key` as the owner of `outputs`, evicting the entries of
    /// previous owners.
    fn claim(&mut self, key: &Path, outputs: &[PathBuf]) {
        for output in outputs {
            let Some(other) = self.owners.insert(output.clone(), key.to_path_buf()) else {
                continue;
            };
            if other == key {
                continue;
            }
            if let Some(entry) = self.entries.remove(&other) {
                debug!(
                    "{} took over {} from {}",
                    key.display(),
                    output.display(),
                    other.display()
                );
                self.release(&other, &entry.outputs);
            }
        }
    }

    /// Removes the cache files in `outputs` that are still owned by `key`.
    fn release(&mut self, key: &Path, outputs: &[PathBuf]) {
        let owned: Vec<&PathBuf> = outputs
            .iter()
            .filter(|output| self.owners.get(*output).is_some_and(|owner| owner == key))
            .collect();
        self.remove_files(owned.iter().copied());
        for output in owned {
            self.owners.remove(output);
        }
    }

    /// Checks that every output of `entry` exists under the cache root.
    ///
    /// Returns the first missing output path on failure.
    pub fn verify(&self, entry: &CacheEntry) -> Result<(), PathBuf> {
        match entry
            .outputs
            .iter()
            .find(|output| !self.dir.path().join(output).is_file())
        {
            Some(missing) => Err(missing.clone()),
            None => Ok(()),
        }
    }

    /// Discards every entry and replaces the cache-side directory with a
    /// fresh empty one.
    pub fn reset(&mut self) -> Result<(), CacheError> {
        let fresh = make_dir(self.parent.as_deref())?;
        let old = mem::replace(&mut self.dir, fresh);
        self.entries.clear();
        self.owners.clear();

        let old_path = old.path().to_path_buf();
        old.close().map_err(|e| CacheError::io(&old_path, e))?;
        debug!("Reset cache directory to {}", self.dir.path().display());
        Ok(())
    }

    /// Removes the cache-side directory.
    pub fn close(self) -> Result<(), CacheError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| CacheError::io(&path, e))
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_files<'a>(&self, paths: impl Iterator<Item = &'a PathBuf>) {
        for rel_path in paths {
            let path = self.dir.path().join(rel_path);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove cache file {}: {}", path.display(), e),
            }
        }
    }
}

fn make_dir(parent: Option<&Path>) -> Result<TempDir, CacheError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(CACHE_DIR_PREFIX);
    match parent {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
            builder
                .tempdir_in(parent)
                .map_err(|e| CacheError::io(parent, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| CacheError::io(std::env::temp_dir(), e)),
    }
}
