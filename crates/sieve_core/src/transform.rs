//! The transform contract and the values flowing through it.

use std::future::{self, Future};
use std::path::{Path, PathBuf};

/// Error type returned by transforms. It is surfaced unchanged as the source
/// of [`FilterError::Transform`](crate::FilterError::Transform).
pub type TransformError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// File content read from the source tree or produced by a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Content {
    /// Returns the content as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(text) => text.as_bytes(),
            Content::Bytes(bytes) => bytes,
        }
    }

    /// Returns the content as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            Content::Bytes(_) => None,
        }
    }

    /// Consumes the content and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(text) => text.into_bytes(),
            Content::Bytes(bytes) => bytes,
        }
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if there is no content.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Content::Bytes(bytes)
    }
}

impl From<&[u8]> for Content {
    fn from(bytes: &[u8]) -> Self {
        Content::Bytes(bytes.to_vec())
    }
}

/// One output file of a fan-out result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Path relative to the output tree.
    pub path: PathBuf,
    /// File content.
    pub content: Content,
}

impl OutputFile {
    /// Creates an output file.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<Content>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Result of transforming one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutput {
    /// New content for a single output, named after the source file using
    /// `changeFileName`, then `targetExtension`, then the unchanged path.
    Single(Content),
    /// Zero or more outputs with explicit paths.
    Multi(Vec<OutputFile>),
}

impl TransformOutput {
    /// A result producing no output files.
    pub fn none() -> Self {
        TransformOutput::Multi(Vec::new())
    }

    /// A fan-out result.
    pub fn multi(files: impl IntoIterator<Item = OutputFile>) -> Self {
        TransformOutput::Multi(files.into_iter().collect())
    }
}

impl From<Content> for TransformOutput {
    fn from(content: Content) -> Self {
        TransformOutput::Single(content)
    }
}

impl From<String> for TransformOutput {
    fn from(text: String) -> Self {
        TransformOutput::Single(Content::Text(text))
    }
}

impl From<&str> for TransformOutput {
    fn from(text: &str) -> Self {
        TransformOutput::Single(Content::from(text))
    }
}

impl From<Vec<OutputFile>> for TransformOutput {
    fn from(files: Vec<OutputFile>) -> Self {
        TransformOutput::Multi(files)
    }
}

/// A per-file transformation.
///
/// This is the one capability a [`Filter`](crate::Filter) needs from its
/// caller. There is no default behavior, so a transform that does not
/// implement it is rejected at compile time:
///
/// ```compile_fail
/// use sieve_core::Transform;
///
/// struct Nothing;
/// impl Transform for Nothing {}
/// ```
///
/// Implementations may finish immediately or await other work; the filter
/// awaits the returned future before committing the result.
pub trait Transform {
    /// Transforms the `content` of the file at `rel_path` (relative to
    /// `src_dir`).
    fn transform(
        &self,
        content: Content,
        rel_path: &Path,
        src_dir: &Path,
    ) -> impl Future<Output = Result<TransformOutput, TransformError>>;
}

/// A [`Transform`] backed by a synchronous closure. See [`transform_fn`].
#[derive(Debug, Clone)]
pub struct FnTransform<F> {
    f: F,
}

/// Wraps a synchronous closure as a [`Transform`].
///
/// ```
/// use sieve_core::{TransformOutput, transform_fn};
///
/// let filtered = transform_fn(|_content, _rel_path, _src_dir| Ok(TransformOutput::from("FILTERED")));
/// # let _ = filtered;
/// ```
pub fn transform_fn<F>(f: F) -> FnTransform<F>
where
    F: Fn(Content, &Path, &Path) -> Result<TransformOutput, TransformError>,
{
    FnTransform { f }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(Content, &Path, &Path) -> Result<TransformOutput, TransformError>,
{
    fn transform(
        &self,
        content: Content,
        rel_path: &Path,
        src_dir: &Path,
    ) -> impl Future<Output = Result<TransformOutput, TransformError>> {
        future::ready((self.f)(content, rel_path, src_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_text_and_bytes() {
        let text = Content::from("hello");
        let bytes = Content::from(vec![0xff, 0x00]);

        assert_eq!(text.as_text(), Some("hello"));
        assert_eq!(text.as_bytes(), b"hello");
        assert_eq!(bytes.as_text(), None);
        assert_eq!(bytes.len(), 2);
        assert!(Content::from("").is_empty());
    }

    #[test]
    fn test_transform_output_conversions() {
        assert_eq!(
            TransformOutput::from("FILTERED"),
            TransformOutput::Single(Content::Text("FILTERED".to_string()))
        );
        assert_eq!(TransformOutput::none(), TransformOutput::Multi(vec![]));
        assert_eq!(
            TransformOutput::multi([OutputFile::new("a.js", "A")]),
            TransformOutput::Multi(vec![OutputFile {
                path: PathBuf::from("a.js"),
                content: Content::Text("A".to_string()),
            }])
        );
    }

    #[tokio::test]
    async fn test_transform_fn_passes_arguments() {
        let t = transform_fn(|content, rel_path, src_dir| {
            Ok(TransformOutput::from(format!(
                "{}|{}|{}",
                content.as_text().unwrap_or_default(),
                rel_path.display(),
                src_dir.display()
            )))
        });

        let output = t
            .transform(Content::from("body"), Path::new("a.js"), Path::new("/src"))
            .await
            .unwrap();

        assert_eq!(output, TransformOutput::from("body|a.js|/src"));
    }

    #[tokio::test]
    async fn test_transform_fn_error() {
        let t = transform_fn(|_, _, _| Err("boom".into()));
        let err = t
            .transform(Content::from(""), Path::new("a.js"), Path::new("/src"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
