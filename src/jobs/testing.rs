//! Scripted collaborators for pipeline tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::index::{
    BuildOutcome, BuildRequest, Document, DocumentLoader, DocumentMetadata, IndexError, IndexMode,
    IndexStats, Indexer, UpdateSummary,
};
use crate::preprocess::{PreprocessError, PreprocessOutput, Preprocessor};

/// How a fake collaborator behaves when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Succeed,
    Fail,
    Panic,
}

pub(crate) struct FakePreprocessor {
    pub(crate) behavior: Behavior,
    pub(crate) calls: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakePreprocessor {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Preprocessor for FakePreprocessor {
    async fn convert(
        &self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PreprocessOutput, PreprocessError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((input.to_path_buf(), output_dir.to_path_buf()));
        match self.behavior {
            Behavior::Succeed => {
                let stem = input.file_stem().unwrap_or_default().to_string_lossy();
                Ok(PreprocessOutput {
                    output_path: output_dir.join(format!("{stem}.md")),
                })
            }
            Behavior::Fail => Err(PreprocessError::Failed {
                code: 2,
                stderr: "unreadable PDF".into(),
            }),
            Behavior::Panic => panic!("converter crashed"),
        }
    }
}

pub(crate) struct FakeLoader {
    pub(crate) behavior: Behavior,
    pub(crate) documents: Vec<Document>,
}

impl FakeLoader {
    pub(crate) fn with_documents(count: usize) -> Self {
        Self {
            behavior: Behavior::Succeed,
            documents: (0..count).map(|n| document(&format!("doc {n}"))).collect(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            behavior: Behavior::Fail,
            documents: Vec::new(),
        }
    }
}

#[async_trait]
impl DocumentLoader for FakeLoader {
    async fn load_documents(&self, directory: &Path) -> Result<Vec<Document>, IndexError> {
        match self.behavior {
            Behavior::Succeed => Ok(self.documents.clone()),
            Behavior::Fail => Err(IndexError::MissingInput(directory.to_path_buf())),
            Behavior::Panic => panic!("loader crashed"),
        }
    }
}

pub(crate) struct FakeIndexer {
    pub(crate) behavior: Behavior,
    pub(crate) builds: Mutex<Vec<BuildRequest>>,
    pub(crate) updated: Mutex<Vec<Document>>,
}

impl FakeIndexer {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            builds: Mutex::new(Vec::new()),
            updated: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Indexer for FakeIndexer {
    async fn build(&self, request: BuildRequest) -> Result<BuildOutcome, IndexError> {
        let files = request.files.len();
        self.builds.lock().expect("builds lock").push(request);
        match self.behavior {
            Behavior::Succeed => Ok(BuildOutcome {
                documents_processed: files,
                total_document_count: files + 10,
                mode: IndexMode::Incremental,
            }),
            Behavior::Fail => Err(IndexError::Task("vector store offline".into())),
            Behavior::Panic => panic!("indexer crashed"),
        }
    }

    async fn update(&self, documents: Vec<Document>) -> Result<UpdateSummary, IndexError> {
        let checked = documents.len();
        self.updated.lock().expect("updated lock").extend(documents);
        match self.behavior {
            Behavior::Succeed => Ok(UpdateSummary {
                success: true,
                mode: IndexMode::Incremental,
                documents_checked: checked,
                documents_added: checked,
                message: format!("Added {checked} new documents to the index"),
            }),
            Behavior::Fail => Err(IndexError::Task("vector store offline".into())),
            Behavior::Panic => panic!("indexer crashed"),
        }
    }
    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let points = self.updated.lock().expect("updated lock").len() as u64;
        match self.behavior {
            Behavior::Succeed => Ok(IndexStats {
                collection: "fake".into(),
                exists: true,
                status: Some("green".into()),
                points_count: points,
                indexed_vectors_count: points,
                vector_size: 4,
            }),
            Behavior::Fail => Err(IndexError::Task("vector store offline".into())),
            Behavior::Panic => panic!("indexer crashed"),
        }
    }
}

pub(crate) fn document(text: &str) -> Document {
    Document {
        text: text.into(),
        metadata: DocumentMetadata {
            file_path: PathBuf::from("/processed/general").join(format!("{text}.md")),
            file_name: format!("{text}.md"),
            relative_path: PathBuf::from("general").join(format!("{text}.md")),
            ..Default::default()
        },
    }
}
