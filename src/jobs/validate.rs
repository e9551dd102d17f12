//! Synchronous checks applied to uploads before any job exists.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Label applied when the caller omits one.
pub const DEFAULT_LABEL: &str = "general";

const REJECTED_EXTENSIONS: [&str; 5] = [".docx", ".txt", ".doc", ".pptx", ".ppt"];

/// Upload rejected before a job was created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No file name was supplied with the upload.
    #[error("No file selected")]
    MissingFilename,
    /// The extension is explicitly refused.
    #[error("Unsupported file type: {0}. Only PDF and Markdown files are accepted")]
    RejectedFileType(String),
    /// The extension is outside the supported set.
    #[error("Unsupported file type: {0}. Supported: .pdf, .md")]
    UnknownFileType(String),
    /// The label contains characters outside `[A-Za-z0-9._-]` or is a dot segment.
    #[error("Invalid label '{0}'. Use letters, digits, '.', '_' or '-'")]
    InvalidLabel(String),
}

/// Document types accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FileType {
    /// PDF, converted to Markdown before indexing.
    #[serde(rename = ".pdf")]
    Pdf,
    /// Markdown, indexed as-is.
    #[serde(rename = ".md")]
    Markdown,
}

impl FileType {
    /// Detect the type from a file name's extension, case-insensitively.
    pub fn from_filename(filename: &str) -> Result<Self, ValidationError> {
        let extension = extension_of(filename);
        match extension.as_str() {
            ".pdf" => Ok(Self::Pdf),
            ".md" => Ok(Self::Markdown),
            ext if REJECTED_EXTENSIONS.contains(&ext) => {
                Err(ValidationError::RejectedFileType(extension))
            }
            _ => Err(ValidationError::UnknownFileType(extension)),
        }
    }

    /// Whether documents of this type go through the preprocessor.
    pub fn needs_preprocessing(self) -> bool {
        matches!(self, Self::Pdf)
    }

    /// Extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Markdown => ".md",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Trim the label, apply the default when empty, and enforce the safe charset.
pub fn normalize_label(label: Option<&str>) -> Result<String, ValidationError> {
    let trimmed = label.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(DEFAULT_LABEL.to_string());
    }
    let safe = trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !safe || trimmed == "." || trimmed == ".." {
        return Err(ValidationError::InvalidLabel(trimmed.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Directory parts are dropped, whitespace becomes `_`, and anything outside `[A-Za-z0-9._-]`
/// is removed. When nothing usable survives, a generated name carrying the original extension is
/// returned instead.
pub fn sanitize_filename(filename: &str, file_type: FileType) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches(['.', '_']).to_string();

    if FileType::from_filename(&cleaned).ok() == Some(file_type)
        && cleaned.len() > file_type.extension().len()
    {
        cleaned
    } else {
        format!("upload-{}{}", Uuid::new_v4().simple(), file_type.extension())
    }
}
