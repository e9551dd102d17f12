//! Filesystem loading of processed Markdown documents.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use super::{Document, DocumentLoader, DocumentMetadata, IndexError};
use crate::jobs::validate::DEFAULT_LABEL;
use crate::qdrant::compute_content_hash;

/// Loads every `.md` file below a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownLoader;

#[async_trait]
impl DocumentLoader for MarkdownLoader {
    async fn load_documents(&self, directory: &Path) -> Result<Vec<Document>, IndexError> {
        let directory = directory.to_path_buf();
        tokio::task::spawn_blocking(move || load_tree(&directory))
            .await
            .map_err(|err| IndexError::Task(err.to_string()))?
    }
}

fn load_tree(root: &Path) -> Result<Vec<Document>, IndexError> {
    if !root.exists() {
        tracing::debug!(root = %root.display(), "Processed documents root missing; nothing to load");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| IndexError::Io {
            path: err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            source: err.into(),
        })?;
        if !entry.file_type().is_file() || !is_markdown(entry.path()) {
            continue;
        }
        match read_document(entry.path(), root) {
            Ok(document) => documents.push(document),
            Err(IndexError::Io { path, source })
                if source.kind() == std::io::ErrorKind::InvalidData =>
            {
                tracing::warn!(file = %path.display(), error = %source, "Skipping file that is not valid UTF-8");
            }
            Err(error) => return Err(error),
        }
    }

    tracing::debug!(root = %root.display(), documents = documents.len(), "Loaded processed documents");
    Ok(documents)
}

/// Read one file as a document whose relative path is taken against `root`.
pub(crate) fn read_document(path: &Path, root: &Path) -> Result<Document, IndexError> {
    if !path.is_file() {
        return Err(IndexError::MissingInput(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| IndexError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let relative_path = path
        .strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));

    Ok(Document {
        text,
        metadata: DocumentMetadata {
            file_path: path.to_path_buf(),
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            relative_path,
            label: None,
            doc_hash: None,
        },
    })
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Fill `label` and `doc_hash` on each document.
///
/// The label is the first component of the path relative to `root`; files directly under the
/// root get the default label. Labels and hashes already present are kept.
pub fn enrich_metadata(mut documents: Vec<Document>, root: &Path) -> Vec<Document> {
    for document in &mut documents {
        let metadata = &mut document.metadata;
        if metadata.label.is_none() {
            let relative = metadata
                .file_path
                .strip_prefix(root)
                .unwrap_or(&metadata.relative_path);
            metadata.label = Some(label_for(relative));
        }
        if metadata.doc_hash.is_none() {
            metadata.doc_hash = Some(compute_content_hash(&document.text));
        }
    }
    documents
}

/// Label of a root-relative path: its first directory, or the default label at root level.
pub(crate) fn label_for(relative: &Path) -> String {
    let mut components = relative
        .components()
        .filter(|component| matches!(component, Component::Normal(_)));
    match (components.next(), components.next()) {
        (Some(first), Some(_)) => first.as_os_str().to_string_lossy().into_owned(),
        _ => DEFAULT_LABEL.to_string(),
    }
}
