//! Cache entry types.

use std::path::PathBuf;

use crate::Signature;

/// A cache entry for a single source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Signature of the source file when its outputs were produced.
    pub signature: Signature,

    /// Output paths, relative to the cache-side directory, in the order the
    /// transform produced them.
    pub outputs: Vec<PathBuf>,
}

impl CacheEntry {
    /// Creates a new cache entry.
    pub fn new(signature: Signature, outputs: Vec<PathBuf>) -> Self {
        Self { signature, outputs }
    }

    /// Checks if this cache entry is still valid for the given signature.
    pub fn is_valid(&self, signature: &Signature) -> bool {
        self.signature == *signature
    }
}
