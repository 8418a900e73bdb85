//! Corpus ingestion
//!
//! Turns a directory of documents into vector store records, one record per
//! document keyed by its file name. A collection that already holds documents
//! is reused as-is unless a rebuild is forced.

use crate::errors::IngestionError;
use crate::pdf;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tripwise_common::config::CorpusConfig;
use tripwise_common::metrics;
use tripwise_common::models::Document;
use tripwise_common::{Embedder, VectorStore};

const APP_NAME: &str = "Trip Assistor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Documents were embedded and stored during this run
    Created,
    /// The collection already held documents; nothing was embedded
    Reused,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedDocument {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub status: CollectionStatus,
    pub indexed: Vec<String>,
    pub skipped: Vec<SkippedDocument>,
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl IngestReport {
    /// Greeting shown to the user once the corpus is ready
    pub fn user_notice(&self) -> String {
        let mut notice = match self.status {
            CollectionStatus::Created => format!("Welcome to {}", APP_NAME),
            CollectionStatus::Reused => format!("Welcome back to {}", APP_NAME),
        };
        if !self.skipped.is_empty() {
            notice.push_str(&format!(
                ". {} document(s) could not be indexed",
                self.skipped.len()
            ));
        }
        notice
    }
}

pub struct CorpusIngestor {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    extensions: Vec<String>,
    force: bool,
}

impl CorpusIngestor {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            extensions: vec!["pdf".to_string()],
            force: false,
        }
    }

    pub fn from_config(
        config: &CorpusConfig,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self::new(embedder, store).with_extensions(config.extensions.clone())
    }

    /// Recognized extensions, compared case-insensitively
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Re-embed every document even if the collection is populated
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Build the collection from `corpus_dir`, or reuse it if already built.
    pub async fn ingest(&self, corpus_dir: &Path) -> Result<IngestReport, IngestionError> {
        let start = Instant::now();
        let collection = self.store.collection().to_string();

        self.store.ensure_collection().await?;

        let existing = self.store.count().await?;
        if existing > 0 && !self.force {
            info!(collection = %collection, documents = existing, "Collection already populated, reusing");
            return Ok(IngestReport {
                collection,
                status: CollectionStatus::Reused,
                indexed: Vec::new(),
                skipped: Vec::new(),
                elapsed: start.elapsed(),
            });
        }

        let files = self.scan(corpus_dir).await?;
        info!(
            collection = %collection,
            corpus_dir = %corpus_dir.display(),
            files = files.len(),
            "Building collection"
        );

        let mut indexed = Vec::new();
        let mut skipped = Vec::new();

        for path in files {
            let id = document_id(&path);
            match self.index_file(&id, &path).await {
                Ok(()) => {
                    debug!(document_id = %id, "Indexed document");
                    indexed.push(id);
                }
                Err(e) if e.is_document_defect() => {
                    warn!(path = %path.display(), reason = %e, "Skipping document");
                    skipped.push(SkippedDocument {
                        id,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let elapsed = start.elapsed();
        metrics::record_ingestion(elapsed.as_secs_f64(), indexed.len(), skipped.len(), &collection);
        info!(
            collection = %collection,
            indexed = indexed.len(),
            skipped = skipped.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Collection built"
        );

        Ok(IngestReport {
            collection,
            status: CollectionStatus::Created,
            indexed,
            skipped,
            elapsed,
        })
    }

    async fn index_file(&self, id: &str, path: &Path) -> Result<(), IngestionError> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
            .await
            .map_err(|e| IngestionError::extraction(path, format!("Extraction task failed: {}", e)))??;

        let embedding = self.embedder.embed(&text).await?;
        self.store.upsert(&Document::new(id, text, embedding)).await?;
        Ok(())
    }

    /// Recognized files directly inside `dir`, sorted by name
    async fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>, IngestionError> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestionError::CorpusNotFound(dir.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            // Follows symlinks
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable directory entry, ignoring");
                    continue;
                }
            }
            if self.is_recognized(&path) {
                files.push(path);
            } else {
                debug!(path = %path.display(), "Ignoring unrecognized file");
            }
        }

        files.sort();
        Ok(files)
    }

    fn is_recognized(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|known| known.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

/// Record id: the file name including extension
fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
