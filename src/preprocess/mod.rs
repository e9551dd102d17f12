//! Conversion of binary uploads (PDF) into Markdown ready for indexing.
//!
//! [`CommandPreprocessor`] shells out to a MinerU-compatible converter invoked as
//! `<program> -p <input> -o <output_dir>`, then locates the `<stem>.md` it produced somewhere
//! below the output directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use walkdir::WalkDir;

/// Errors raised while converting a document.
#[derive(Debug, Error)]
pub enum PreprocessError {
    /// Output directory could not be created.
    #[error("Failed to prepare output directory {path}: {source}")]
    OutputDir {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Converter process could not be started.
    #[error("Failed to start converter '{program}': {source}")]
    Spawn {
        /// Program that was invoked.
        program: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// Converter exited unsuccessfully.
    #[error("Converter exited with code {code}: {stderr}")]
    Failed {
        /// Exit code, or -1 when killed by a signal.
        code: i32,
        /// Trimmed standard error output.
        stderr: String,
    },
    /// Converter did not finish in time and was killed.
    #[error("Converter timed out after {0:?}")]
    Timeout(Duration),
    /// Converter succeeded but no Markdown output was found.
    #[error("No Markdown output found for {0}")]
    MissingOutput(PathBuf),
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessOutput {
    /// Markdown file produced for the input.
    pub output_path: PathBuf,
}

/// Document-to-Markdown converter.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    /// Convert `input` into Markdown written below `output_dir`.
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PreprocessOutput, PreprocessError>;
}

/// Runs an external converter program with a hard timeout.
#[derive(Debug, Clone)]
pub struct CommandPreprocessor {
    program: String,
    timeout: Duration,
}

impl CommandPreprocessor {
    /// Converter invoking `program`, killed after `timeout`.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Preprocessor for CommandPreprocessor {
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PreprocessOutput, PreprocessError> {
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| PreprocessError::OutputDir {
                path: output_dir.to_path_buf(),
                source,
            })?;

        tracing::info!(
            program = %self.program,
            input = %input.display(),
            output_dir = %output_dir.display(),
            "Starting document conversion"
        );

        let child = Command::new(&self.program)
            .arg("-p")
            .arg(input)
            .arg("-o")
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PreprocessError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| PreprocessError::Spawn {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => return Err(PreprocessError::Timeout(self.timeout)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(program = %self.program, stderr = %stderr, "Converter failed");
            return Err(PreprocessError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let stem = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let output_path = find_markdown(output_dir, &stem)
            .ok_or_else(|| PreprocessError::MissingOutput(input.to_path_buf()))?;
        tracing::info!(output = %output_path.display(), "Document conversion finished");
        Ok(PreprocessOutput { output_path })
    }
}

/// Newest `<stem>.md` below `dir`, if any.
fn find_markdown(dir: &Path, stem: &str) -> Option<PathBuf> {
    let target = format!("{stem}.md");
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == target.as_str())
        .max_by_key(|entry| entry.metadata().ok().and_then(|meta| meta.modified().ok()))
        .map(|entry| entry.into_path())
}
