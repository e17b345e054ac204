//! Glob-based discovery of the files a pass transforms.

use crate::error::FilterError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Matches source-relative paths against include and exclude patterns.
///
/// `*` does not cross directory separators; `**` does.
#[derive(Debug, Clone)]
pub struct FileFinder {
    include_globs: GlobSet,
    exclude_globs: Option<GlobSet>,
}

impl FileFinder {
    /// Compiles include and exclude patterns. At least one include pattern
    /// is required.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, FilterError> {
        let include_globs = Self::build_globset(include)?
            .ok_or_else(|| FilterError::config("At least one include pattern is required"))?;
        let exclude_globs = Self::build_globset(exclude)?;

        Ok(Self {
            include_globs,
            exclude_globs,
        })
    }

    fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, FilterError> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| FilterError::config(format!("Invalid glob pattern: {}", e)))?;
            builder.add(glob);
        }

        let globset = builder
            .build()
            .map_err(|e| FilterError::config(format!("Failed to build globset: {}", e)))?;

        Ok(Some(globset))
    }

    /// Checks if a source-relative path is selected.
    pub fn is_match(&self, rel_path: &Path) -> bool {
        if self
            .exclude_globs
            .as_ref()
            .is_some_and(|excludes| excludes.is_match(rel_path))
        {
            return false;
        }

        self.include_globs.is_match(rel_path)
    }

    /// Walks `base_dir` and returns the selected files as sorted,
    /// deduplicated paths relative to `base_dir`.
    ///
    /// Symlinks are followed. Any walk error fails discovery.
    pub fn discover_files(&self, base_dir: &Path) -> Result<Vec<PathBuf>, FilterError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(base_dir).follow_links(true) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(base_dir).to_path_buf();
                FilterError::io(path, e.into())
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(rel_path) = entry.path().strip_prefix(base_dir) else {
                continue;
            };

            if self.is_match(rel_path) {
                files.push(rel_path.to_path_buf());
            }
        }

        files.sort();
        files.dedup();

        debug!(
            "Discovered {} file(s) under {}",
            files.len(),
            base_dir.display()
        );
        Ok(files)
    }
}
