//! File-backed vector store
//!
//! Keeps the collection in memory and writes a JSON snapshot to
//! `{data_dir}/{collection}.json` after every upsert. The snapshot records
//! the metric and dimension the collection was created with; reopening with
//! different values is refused.

use super::{check_dimension, rank, DistanceMetric, VectorStore};
use crate::errors::{AppError, Result};
use crate::models::{Document, RetrievalResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    collection: String,
    metric: DistanceMetric,
    dimension: usize,
    documents: BTreeMap<String, Document>,
}

#[derive(Debug)]
struct State {
    created: bool,
    documents: BTreeMap<String, Document>,
}

#[derive(Debug)]
pub struct FileVectorStore {
    collection: String,
    metric: DistanceMetric,
    dimension: usize,
    path: PathBuf,
    state: RwLock<State>,
}

impl FileVectorStore {
    /// Open the collection snapshot, if one exists.
    ///
    /// Nothing is written until the collection is ensured or a document is
    /// upserted.
    pub async fn open(
        data_dir: &Path,
        collection: &str,
        metric: DistanceMetric,
        dimension: usize,
    ) -> Result<Self> {
        let path = data_dir.join(format!("{}.json", collection));

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| {
                    AppError::vector_store(format!(
                        "Corrupt collection snapshot {}: {}",
                        path.display(),
                        e
                    ))
                })?;

                if snapshot.metric != metric || snapshot.dimension != dimension {
                    return Err(AppError::Configuration {
                        message: format!(
                            "Collection '{}' was created with metric {} and dimension {}, \
                             cannot reopen with metric {} and dimension {}",
                            collection,
                            snapshot.metric.as_str(),
                            snapshot.dimension,
                            metric.as_str(),
                            dimension
                        ),
                    });
                }

                tracing::info!(
                    collection = %collection,
                    documents = snapshot.documents.len(),
                    "Loaded collection snapshot"
                );

                State {
                    created: true,
                    documents: snapshot.documents,
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => State {
                created: false,
                documents: BTreeMap::new(),
            },
            Err(e) => {
                return Err(AppError::vector_store(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            collection: collection.to_string(),
            metric,
            dimension,
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the snapshot next to the target, then rename over it.
    async fn persist(&self, documents: &BTreeMap<String, Document>) -> Result<()> {
        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            collection: &'a str,
            metric: DistanceMetric,
            dimension: usize,
            documents: &'a BTreeMap<String, Document>,
        }

        let bytes = serde_json::to_vec(&SnapshotRef {
            collection: &self.collection,
            metric: self.metric,
            dimension: self.dimension,
            documents,
        })?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::vector_store(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| AppError::vector_store(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| AppError::vector_store(format!("Failed to replace {}: {}", self.path.display(), e)))?;

        Ok(())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.created {
            self.persist(&state.documents).await?;
            state.created = true;
            tracing::info!(collection = %self.collection, path = %self.path.display(), "Created collection");
        }
        Ok(())
    }

    async fn upsert(&self, document: &Document) -> Result<()> {
        check_dimension(self.dimension, &document.embedding)?;

        let mut state = self.state.write().await;
        let previous = state.documents.insert(document.id.clone(), document.clone());

        if let Err(e) = self.persist(&state.documents).await {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => {
                    state.documents.insert(old.id.clone(), old);
                }
                None => {
                    state.documents.remove(&document.id);
                }
            }
            return Err(e);
        }

        state.created = true;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        check_dimension(self.dimension, embedding)?;

        let state = self.state.read().await;
        Ok(rank(state.documents.values(), embedding, k, self.metric))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.documents.len())
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
