//! Ingestion error types

use thiserror::Error;
use tripwise_common::errors::AppError;

#[derive(Error, Debug)]
pub enum IngestionError {
    /// The file could not be read as a document, or held no text
    #[error("Extraction failed for {path}: {message}")]
    Extraction { path: String, message: String },

    /// Embedding or vector store failure; aborts the run
    #[error(transparent)]
    Service(#[from] AppError),

    #[error("Corpus directory not found: {0}")]
    CorpusNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestionError {
    pub fn extraction(path: &std::path::Path, message: impl Into<String>) -> Self {
        IngestionError::Extraction {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Defects confined to a single document; the run continues without it.
    pub fn is_document_defect(&self) -> bool {
        matches!(
            self,
            IngestionError::Extraction { .. } | IngestionError::Service(AppError::InvalidInput { .. })
        )
    }
}
