//! Filter options.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::FilterError;

/// Renames a single output, given the source-relative path.
pub type RenameFn = Arc<dyn Fn(&Path) -> PathBuf + Send + Sync>;

/// How source files are read before being handed to the transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Read as UTF-8 text; invalid UTF-8 fails the pass.
    #[default]
    #[serde(alias = "utf-8")]
    Utf8,
    /// Read raw bytes.
    Binary,
}

/// How cached outputs are placed into the destination directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterializeMode {
    /// Hard link, falling back to a copy when linking fails.
    #[default]
    Link,
    /// Always copy.
    Copy,
}

/// Options for a [`Filter`](crate::Filter).
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FilterOptions {
    /// Glob patterns selecting the files to transform, relative to the
    /// source directory.
    #[serde(default = "default_files")]
    pub files: Vec<String>,

    /// Glob patterns for files to skip even when matched by `files`.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Encoding used to read source files.
    #[serde(default)]
    pub encoding: Encoding,

    /// Replaces the extension of single-output results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_extension: Option<String>,

    /// Renames single-output results. Takes priority over `target_extension`.
    #[serde(skip)]
    pub change_file_name: Option<RenameFn>,

    /// How outputs are placed into the destination directory.
    #[serde(default)]
    pub materialize: MaterializeMode,

    /// Maximum number of files processed at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Parent directory for the cache and destination directories. Defaults
    /// to the system temp directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
}

fn default_files() -> Vec<String> {
    vec!["**".to_string()]
}

fn default_concurrency() -> usize {
    32
}

impl FilterOptions {
    /// Creates options with every default applied.
    pub fn new() -> Self {
        Self {
            files: default_files(),
            exclude: Vec::new(),
            encoding: Encoding::default(),
            target_extension: None,
            change_file_name: None,
            materialize: MaterializeMode::default(),
            concurrency: default_concurrency(),
            work_dir: None,
        }
    }

    /// Loads options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FilterError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FilterError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::from_json(&content)
    }

    /// Parses options from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, FilterError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| FilterError::config(format!("Invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Sets the glob patterns selecting files.
    pub fn with_files<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the glob patterns excluding files.
    pub fn with_exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the encoding used to read source files.
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Sets the extension given to single-output results.
    pub fn with_target_extension(mut self, extension: impl Into<String>) -> Self {
        self.target_extension = Some(extension.into());
        self
    }

    /// Sets the rename function for single-output results.
    pub fn with_change_file_name<F>(mut self, rename: F) -> Self
    where
        F: Fn(&Path) -> PathBuf + Send + Sync + 'static,
    {
        self.change_file_name = Some(Arc::new(rename));
        self
    }

    /// Sets how outputs are placed into the destination directory.
    pub fn with_materialize(mut self, mode: MaterializeMode) -> Self {
        self.materialize = mode;
        self
    }

    /// Sets the maximum number of files processed at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sets the parent directory for temporary directories.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Checks option values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.files.is_empty() {
            return Err(FilterError::config("`files` must contain at least one pattern"));
        }

        if self.concurrency == 0 {
            return Err(FilterError::config("`concurrency` must be at least 1"));
        }

        if let Some(ext) = &self.target_extension {
            let ext = ext.trim_start_matches('.');
            if ext.is_empty() || ext.contains(['/', '\\']) {
                return Err(FilterError::config(format!(
                    "Invalid target extension: {:?}",
                    ext
                )));
            }
        }

        Ok(())
    }
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FilterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterOptions")
            .field("files", &self.files)
            .field("exclude", &self.exclude)
            .field("encoding", &self.encoding)
            .field("target_extension", &self.target_extension)
            .field(
                "change_file_name",
                &self.change_file_name.as_ref().map(|_| ".."),
            )
            .field("materialize", &self.materialize)
            .field("concurrency", &self.concurrency)
            .field("work_dir", &self.work_dir)
            .finish()
    }
}
