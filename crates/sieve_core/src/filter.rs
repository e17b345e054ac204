//! Pass orchestration.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, stream};
use parking_lot::Mutex;
use sieve_cache::{CacheEntry, CacheStore, Signature, StagedOutputs};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::file_finder::FileFinder;
use crate::invoker::invoke;
use crate::materialize::materialize;
use crate::{FilterError, FilterOptions, Transform, TreeSource};

const DEST_DIR_PREFIX: &str = "sieve-dest-";

/// Where a [`Filter`] is in its current or most recent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    /// No pass has run since construction or reset.
    Idle,
    /// Listing matched files in the source tree.
    Enumerating,
    /// Checking signatures and transforming stale files.
    Processing,
    /// Placing outputs into the destination directory.
    Materializing,
    /// The last pass succeeded.
    Done,
    /// The last pass failed.
    Failed,
}

impl fmt::Display for PassState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PassState::Idle => "idle",
            PassState::Enumerating => "enumerating",
            PassState::Processing => "processing",
            PassState::Materializing => "materializing",
            PassState::Done => "done",
            PassState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters for one successful pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Matched source files.
    pub files: usize,
    /// Files whose cached outputs were reused.
    pub hits: usize,
    /// Files that were transformed.
    pub misses: usize,
    /// Files placed into the destination directory.
    pub outputs: usize,
}

/// One processed source file.
struct Processed {
    rel_path: PathBuf,
    entry: CacheEntry,
    hit: bool,
}

/// Incremental file transformation over a source tree.
///
/// Each [`build`](Filter::build) produces a fresh destination directory
/// holding the outputs of every matched source file. Outputs are cached in a
/// cache-side directory owned by the filter, and a file is only transformed
/// again when its [`Signature`] changes.
///
/// Both directories are removed by [`cleanup`](Filter::cleanup) or when the
/// filter is dropped.
pub struct Filter<S, T> {
    /// Provides the source directory for each pass.
    source: S,
    /// Caller-supplied transformation.
    transform: T,
    /// Filter options.
    options: FilterOptions,
    /// Compiled include/exclude patterns.
    finder: FileFinder,
    /// Cache store; locked for lookups, and for commits on the blocking pool.
    cache: Arc<Mutex<CacheStore>>,
    /// Destination directory of the last successful pass.
    dest: Option<TempDir>,
    /// Current pass state.
    state: PassState,
    /// Stats of the last successful pass.
    stats: Option<PassStats>,
}

impl<S, T> Filter<S, T>
where
    S: TreeSource,
    T: Transform,
{
    /// Creates a filter over `source`, validating `options` and allocating
    /// an empty cache-side directory.
    pub fn new(source: S, transform: T, options: FilterOptions) -> Result<Self, FilterError> {
        options.validate()?;
        let finder = FileFinder::new(&options.files, &options.exclude)?;

        let cache = match &options.work_dir {
            Some(dir) => CacheStore::new_in(dir)?,
            None => CacheStore::new()?,
        };

        Ok(Self {
            source,
            transform,
            options,
            finder,
            cache: Arc::new(Mutex::new(cache)),
            dest: None,
            state: PassState::Idle,
            stats: None,
        })
    }

    /// Runs one pass and returns the destination directory.
    ///
    /// The previous destination directory is removed first. If any file
    /// fails, the whole pass fails and no destination directory is kept.
    pub async fn build(&mut self) -> Result<&Path, FilterError> {
        self.dest = None;
        self.stats = None;

        match self.run_pass().await {
            Ok((dest, stats)) => {
                info!(
                    "Pass complete: {} file(s), {} cached, {} transformed, {} output(s)",
                    stats.files, stats.hits, stats.misses, stats.outputs
                );
                self.state = PassState::Done;
                self.stats = Some(stats);
                Ok(self.dest.insert(dest).path())
            }
            Err(e) => {
                warn!("Pass failed while {}: {}", self.state, e);
                self.state = PassState::Failed;
                Err(e)
            }
        }
    }

    async fn run_pass(&mut self) -> Result<(TempDir, PassStats), FilterError> {
        let dest = self.make_dest_dir()?;

        self.state = PassState::Enumerating;
        let src_dir = self.source.read_tree().await?;
        let metadata = tokio::fs::metadata(&src_dir)
            .await
            .map_err(|e| FilterError::io(&src_dir, e))?;
        if !metadata.is_dir() {
            return Err(FilterError::io(
                &src_dir,
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "source is not a directory"),
            ));
        }

        let finder = self.finder.clone();
        let walk_dir = src_dir.clone();
        let files = tokio::task::spawn_blocking(move || finder.discover_files(&walk_dir))
            .await
            .map_err(|e| FilterError::Internal(format!("Discovery task failed: {}", e)))??;

        self.state = PassState::Processing;
        let cache_root = self.cache.lock().root().to_path_buf();
        let mut processed: Vec<Processed> = stream::iter(files)
            .map(|rel_path| self.process_file(rel_path, &src_dir, &cache_root))
            .buffer_unordered(self.options.concurrency)
            .try_collect()
            .await?;
        processed.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        self.reject_collisions(&processed).await?;

        self.state = PassState::Materializing;
        let mode = self.options.materialize;
        stream::iter(&processed)
            .map(|file| materialize(&cache_root, dest.path(), &file.entry, mode))
            .buffer_unordered(self.options.concurrency)
            .try_collect::<()>()
            .await?;

        let hits = processed.iter().filter(|file| file.hit).count();
        let stats = PassStats {
            files: processed.len(),
            hits,
            misses: processed.len() - hits,
            outputs: processed.iter().map(|file| file.entry.outputs.len()).sum(),
        };

        Ok((dest, stats))
    }

    async fn process_file(
        &self,
        rel_path: PathBuf,
        src_dir: &Path,
        cache_root: &Path,
    ) -> Result<Processed, FilterError> {
        let abs_path = src_dir.join(&rel_path);
        let metadata = tokio::fs::metadata(&abs_path)
            .await
            .map_err(|e| FilterError::io(&abs_path, e))?;
        let signature =
            Signature::from_metadata(&metadata).map_err(|e| FilterError::io(&abs_path, e))?;

        let cached = self
            .cache
            .lock()
            .lookup(&rel_path)
            .filter(|entry| entry.is_valid(&signature))
            .cloned();

        if let Some(entry) = cached {
            if let Some(missing) = find_missing_output(cache_root, &entry).await {
                return Err(FilterError::CacheConsistency {
                    key: rel_path,
                    missing,
                });
            }
            debug!("Using cached output for {}", rel_path.display());
            return Ok(Processed {
                rel_path,
                entry,
                hit: true,
            });
        }

        debug!("Transforming {}", rel_path.display());
        let staged = invoke(
            &self.transform,
            &self.options,
            src_dir,
            &rel_path,
            cache_root,
        )
        .await?;
        let entry = self.commit(rel_path.clone(), signature, staged).await?;

        Ok(Processed {
            rel_path,
            entry,
            hit: false,
        })
    }

    /// Moves staged outputs into the cache on the blocking pool.
    async fn commit(
        &self,
        rel_path: PathBuf,
        signature: Signature,
        staged: StagedOutputs,
    ) -> Result<CacheEntry, FilterError> {
        let cache = Arc::clone(&self.cache);
        let entry = tokio::task::spawn_blocking(move || {
            cache.lock().commit(rel_path, signature, staged)
        })
        .await
        .map_err(|e| FilterError::Internal(format!("Commit task failed: {}", e)))??;
        Ok(entry)
    }

    /// Fails if two source files produce the same output. Both entries are
    /// invalidated, since their shared cache file holds only one of them.
    async fn reject_collisions(&self, processed: &[Processed]) -> Result<(), FilterError> {
        let Some((output, first, second)) = find_collision(processed) else {
            return Ok(());
        };

        let cache = Arc::clone(&self.cache);
        let keys = [first.clone(), second.clone()];
        tokio::task::spawn_blocking(move || {
            let mut cache = cache.lock();
            for key in &keys {
                cache.invalidate(key);
            }
        })
        .await
        .map_err(|e| FilterError::Internal(format!("Invalidation task failed: {}", e)))?;

        Err(FilterError::OutputCollision {
            output,
            first,
            second,
        })
    }

    fn make_dest_dir(&self) -> Result<TempDir, FilterError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(DEST_DIR_PREFIX);
        match &self.options.work_dir {
            Some(dir) => builder
                .tempdir_in(dir)
                .map_err(|e| FilterError::io(dir, e)),
            None => builder
                .tempdir()
                .map_err(|e| FilterError::io(std::env::temp_dir(), e)),
        }
    }
}

/// First output claimed by two files, with the files in pass order.
fn find_collision(processed: &[Processed]) -> Option<(PathBuf, PathBuf, PathBuf)> {
    let mut owners: HashMap<&Path, &Path> = HashMap::new();
    for file in processed {
        for output in &file.entry.outputs {
            if let Some(first) = owners.insert(output.as_path(), file.rel_path.as_path()) {
                return Some((
                    output.clone(),
                    first.to_path_buf(),
                    file.rel_path.clone(),
                ));
            }
        }
    }
    None
}

/// Returns the first output of `entry` that is not a regular file under
/// `cache_root`.
async fn find_missing_output(cache_root: &Path, entry: &CacheEntry) -> Option<PathBuf> {
    for output in &entry.outputs {
        let present = tokio::fs::metadata(cache_root.join(output))
            .await
            .is_ok_and(|metadata| metadata.is_file());
        if !present {
            return Some(output.clone());
        }
    }
    None
}

impl<S, T> Filter<S, T> {
    /// Destination directory of the last successful pass.
    pub fn destination(&self) -> Option<&Path> {
        self.dest.as_ref().map(TempDir::path)
    }

    /// Current pass state.
    pub fn state(&self) -> PassState {
        self.state
    }

    /// Stats of the last successful pass.
    pub fn last_stats(&self) -> Option<PassStats> {
        self.stats
    }

    /// Filter options.
    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// The cache-side directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.lock().root().to_path_buf()
    }

    /// Number of cached source files.
    pub fn cached_files(&self) -> usize {
        self.cache.lock().len()
    }

    /// Discards all cached outputs and the destination directory, so the
    /// next pass transforms every file again.
    pub fn reset(&mut self) -> Result<(), FilterError> {
        self.dest = None;
        self.stats = None;
        self.state = PassState::Idle;
        self.cache.lock().reset()?;
        Ok(())
    }

    /// Removes the destination and cache-side directories.
    pub fn cleanup(self) -> Result<(), FilterError> {
        if let Some(dest) = self.dest {
            let path = dest.path().to_path_buf();
            dest.close().map_err(|e| FilterError::io(&path, e))?;
        }
        match Arc::try_unwrap(self.cache) {
            Ok(cache) => cache.into_inner().close()?,
            // A commit from an aborted pass still holds the store; the
            // directory goes away when that task drops it.
            Err(_) => debug!("Cache store still in use, deferring removal"),
        }
        Ok(())
    }
}
