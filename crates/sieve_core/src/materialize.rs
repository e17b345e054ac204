//! Places cached outputs into the destination directory.

use std::path::Path;

use sieve_cache::CacheEntry;
use tracing::debug;

use crate::{FilterError, MaterializeMode};

/// Links or copies every output of `entry` from `cache_root` into
/// `dest_root`, creating parent directories as needed.
pub(crate) async fn materialize(
    cache_root: &Path,
    dest_root: &Path,
    entry: &CacheEntry,
    mode: MaterializeMode,
) -> Result<(), FilterError> {
    for output in &entry.outputs {
        let src = cache_root.join(output);
        let dest = dest_root.join(output);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FilterError::io(parent, e))?;
        }

        place(&src, &dest, mode).await?;
    }

    Ok(())
}

async fn place(src: &Path, dest: &Path, mode: MaterializeMode) -> Result<(), FilterError> {
    if mode == MaterializeMode::Link {
        match tokio::fs::hard_link(src, dest).await {
            Ok(()) => return Ok(()),
            Err(e) => debug!(
                "Hard link {} -> {} failed ({}), copying instead",
                src.display(),
                dest.display(),
                e
            ),
        }
    }

    // `copy` follows symlinks, so the destination always gets file contents.
    tokio::fs::copy(src, dest)
        .await
        .map(|_| ())
        .map_err(|e| FilterError::io(src, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_cache::Signature;
    use std::fs;
    use std::path::PathBuf;

    fn entry(outputs: &[&str]) -> CacheEntry {
        CacheEntry::new(
            Signature::from_parts(1, 1),
            outputs.iter().map(PathBuf::from).collect(),
        )
    }

    #[tokio::test]
    async fn test_materialize_creates_parent_directories() {
        let cache = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::create_dir_all(cache.path().join("a/b")).unwrap();
        fs::write(cache.path().join("a/b/out.txt"), "nested").unwrap();
        fs::write(cache.path().join("top.txt"), "top").unwrap();

        materialize(
            cache.path(),
            dest.path(),
            &entry(&["a/b/out.txt", "top.txt"]),
            MaterializeMode::Link,
        )
        .await
        .unwrap();

        assert_eq!(
            fs::read_to_string(dest.path().join("a/b/out.txt")).unwrap(),
            "nested"
        );
        assert_eq!(fs::read_to_string(dest.path().join("top.txt")).unwrap(), "top");
    }

    #[tokio::test]
    async fn test_copy_mode_produces_independent_file() {
        let cache = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(cache.path().join("out.txt"), "original").unwrap();

        materialize(
            cache.path(),
            dest.path(),
            &entry(&["out.txt"]),
            MaterializeMode::Copy,
        )
        .await
        .unwrap();
        fs::write(dest.path().join("out.txt"), "edited").unwrap();

        assert_eq!(
            fs::read_to_string(cache.path().join("out.txt")).unwrap(),
            "original"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_mode_shares_inode() {
        use std::os::unix::fs::MetadataExt;

        let cache = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        fs::write(cache.path().join("out.txt"), "data").unwrap();

        materialize(
            cache.path(),
            dest.path(),
            &entry(&["out.txt"]),
            MaterializeMode::Link,
        )
        .await
        .unwrap();

        let cached = fs::metadata(cache.path().join("out.txt")).unwrap();
        let placed = fs::metadata(dest.path().join("out.txt")).unwrap();
        assert_eq!(cached.ino(), placed.ino());
    }

    #[tokio::test]
    async fn test_missing_cache_file_is_io_error() {
        let cache = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        let result = materialize(
            cache.path(),
            dest.path(),
            &entry(&["missing.txt"]),
            MaterializeMode::Link,
        )
        .await;

        assert!(matches!(result, Err(FilterError::Io { .. })));
    }
}
