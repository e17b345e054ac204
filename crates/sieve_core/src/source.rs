//! Upstream tree providers.

use std::future::{self, Future};
use std::path::PathBuf;

use crate::FilterError;

/// Supplies the source directory for a build pass.
///
/// [`Filter::build`](crate::Filter::build) calls `read_tree` once per pass
/// and treats the returned directory as read-only until the pass ends.
pub trait TreeSource {
    /// Returns the directory to read source files from.
    fn read_tree(&self) -> impl Future<Output = Result<PathBuf, FilterError>>;
}

/// A fixed directory on disk.
impl TreeSource for PathBuf {
    fn read_tree(&self) -> impl Future<Output = Result<PathBuf, FilterError>> {
        future::ready(Ok(self.clone()))
    }
}
