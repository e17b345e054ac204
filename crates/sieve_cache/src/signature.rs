//! Change detection based on file metadata.
//!
//! A [`Signature`] encodes a file's modification time and size. It never
//! looks at file contents, so it is cheap to compute for every file on every
//! pass. Two edits that land in the same timestamp tick and leave the size
//! unchanged produce equal signatures and are treated as "unchanged"; this is
//! an accepted approximation of the metadata-based scheme.

use std::fmt;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::UNIX_EPOCH;

use crate::CacheError;

/// Opaque change-detection token for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature(String);

impl Signature {
    /// Computes the signature of the file at `path`.
    ///
    /// Symlinks are followed, so the signature describes the file the link
    /// points at.
    pub fn of(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|e| CacheError::io(path, e))?;
        Self::from_metadata(&metadata).map_err(|e| CacheError::io(path, e))
    }

    /// Computes a signature from already fetched metadata.
    ///
    /// Modification times before the Unix epoch are encoded as negative
    /// offsets.
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, std::io::Error> {
        let modified = metadata.modified()?;
        let nanos = match modified.duration_since(UNIX_EPOCH) {
            Ok(after) => to_signed(after.as_nanos()),
            Err(before) => -to_signed(before.duration().as_nanos()),
        };
        Ok(Self::from_parts(nanos, metadata.len()))
    }

    /// Builds a signature from a modification time (signed nanoseconds
    /// relative to the Unix epoch) and a size in bytes.
    pub fn from_parts(mtime_nanos: i128, size: u64) -> Self {
        Self(format!("{mtime_nanos}-{size}"))
    }

    /// Returns the encoded signature.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// A `SystemTime` offset never comes close to `i128::MAX` nanoseconds.
fn to_signed(nanos: u128) -> i128 {
    i128::try_from(nanos).unwrap_or(i128::MAX)
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_signature_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.js");
        fs::write(&path, "console.log(1)").unwrap();

        let first = Signature::of(&path).unwrap();
        let second = Signature::of(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_signature_changes_with_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.js");
        fs::write(&path, "a").unwrap();
        let before = Signature::of(&path).unwrap();

        fs::write(&path, "a longer body").unwrap();
        let after = Signature::of(&path).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_signature_changes_with_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.js");
        fs::write(&path, "same").unwrap();

        let file = File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
            .unwrap();
        let before = Signature::of(&path).unwrap();

        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000))
            .unwrap();
        let after = Signature::of(&path).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_signature_ignores_content_when_metadata_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.js");
        let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(42);

        fs::write(&path, "aaaa").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();
        let before = Signature::of(&path).unwrap();

        fs::write(&path, "bbbb").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(stamp)
            .unwrap();
        let after = Signature::of(&path).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_signature_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Signature::of(dir.path().join("gone.js")).unwrap_err();
        assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    }

    #[rstest]
    #[case::plain(12, 3, "12-3")]
    #[case::empty_file(1_700_000_000_000_000_000, 0, "1700000000000000000-0")]
    #[case::epoch(0, 5, "0-5")]
    #[case::before_epoch(-12, 3, "-12-3")]
    fn test_from_parts_encoding(#[case] mtime: i128, #[case] size: u64, #[case] expected: &str) {
        assert_eq!(Signature::from_parts(mtime, size).as_str(), expected);
    }

    #[rstest]
    #[case::digits_shifted((12, 3), (1, 23))]
    #[case::sign_flipped((-12, 3), (12, 3))]
    #[case::size_differs((7, 1), (7, 2))]
    fn test_from_parts_distinct(#[case] left: (i128, u64), #[case] right: (i128, u64)) {
        assert_ne!(
            Signature::from_parts(left.0, left.1),
            Signature::from_parts(right.0, right.1)
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_signature_distinguishes_pre_epoch_mtimes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.txt");
        fs::write(&path, "same").unwrap();
        let file = File::options().write(true).open(&path).unwrap();

        file.set_modified(SystemTime::UNIX_EPOCH - Duration::from_secs(1_000))
            .unwrap();
        let first = Signature::of(&path).unwrap();

        file.set_modified(SystemTime::UNIX_EPOCH - Duration::from_secs(2_000))
            .unwrap();
        let second = Signature::of(&path).unwrap();

        assert_ne!(first, second);
        assert_eq!(first.as_str(), "-1000000000000-4");
    }
}
