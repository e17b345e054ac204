//! Shell command transform.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use sieve_core::{Content, Transform, TransformError, TransformOutput};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Environment variable holding the source-relative path of the file being
/// transformed.
pub const REL_PATH_ENV: &str = "SIEVE_REL_PATH";

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to write to command stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("Command exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("Command output is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Runs a shell command per file through `sh -c`.
///
/// The file content is written to the command's stdin and its stdout becomes
/// the new content. The command runs in the source directory.
#[derive(Debug, Clone)]
pub struct CommandTransform {
    command: String,
    binary: bool,
}

impl CommandTransform {
    pub fn new(command: impl Into<String>, binary: bool) -> Self {
        Self {
            command: command.into(),
            binary,
        }
    }

    async fn run(
        &self,
        input: Vec<u8>,
        rel_path: &Path,
        src_dir: &Path,
    ) -> Result<Vec<u8>, ExecError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(src_dir)
            .env(REL_PATH_ENV, rel_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecError::Spawn)?;

        let stdin = child.stdin.take();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&input).await {
                // Commands are free to ignore their input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            }
        };

        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.map_err(ExecError::Spawn)?;

        if !output.status.success() {
            return Err(ExecError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written.map_err(ExecError::Stdin)?;

        Ok(output.stdout)
    }
}

impl Transform for CommandTransform {
    async fn transform(
        &self,
        content: Content,
        rel_path: &Path,
        src_dir: &Path,
    ) -> Result<TransformOutput, TransformError> {
        let stdout = self.run(content.into_bytes(), rel_path, src_dir).await?;

        let content = if self.binary {
            Content::Bytes(stdout)
        } else {
            Content::Text(String::from_utf8(stdout).map_err(ExecError::from)?)
        };

        Ok(TransformOutput::Single(content))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn run_text(
        command: &str,
        input: &str,
        rel_path: &str,
    ) -> Result<String, TransformError> {
        let dir = tempfile::tempdir().unwrap();
        let transform = CommandTransform::new(command, false);
        let output = transform
            .transform(Content::from(input), Path::new(rel_path), dir.path())
            .await?;

        match output {
            TransformOutput::Single(Content::Text(text)) => Ok(text),
            other => panic!("Expected text output, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stdout_becomes_content() {
        let text = run_text("tr a-z A-Z", "hello\n", "a.txt").await.unwrap();
        assert_eq!(text, "HELLO\n");
    }

    #[tokio::test]
    async fn test_rel_path_is_exported() {
        let text = run_text("printf %s \"$SIEVE_REL_PATH\"", "", "dir/a.txt")
            .await
            .unwrap();
        assert_eq!(text, "dir/a.txt");
    }

    #[tokio::test]
    async fn test_command_ignoring_stdin() {
        let input = "x".repeat(1 << 20);
        let text = run_text("echo done", &input, "a.txt").await.unwrap();
        assert_eq!(text, "done\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let err = run_text("echo oops >&2; exit 3", "", "a.txt")
            .await
            .unwrap_err();

        let exec = err.downcast_ref::<ExecError>().unwrap();
        match exec {
            ExecError::Failed { status, stderr } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("Expected command failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_output_in_text_mode() {
        let err = run_text("printf '\\377'", "", "a.txt").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExecError>(),
            Some(ExecError::InvalidUtf8(_))
        ));
    }

    #[tokio::test]
    async fn test_binary_mode_returns_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let transform = CommandTransform::new("cat", true);
        let output = transform
            .transform(
                Content::Bytes(vec![0, 255, 1]),
                Path::new("blob.bin"),
                dir.path(),
            )
            .await
            .unwrap();

        match output {
            TransformOutput::Single(Content::Bytes(bytes)) => assert_eq!(bytes, vec![0, 255, 1]),
            other => panic!("Expected byte output, got {:?}", other),
        }
    }
}
