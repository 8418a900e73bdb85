//! In-memory vector store
//!
//! Records live in a `HashMap` behind a `tokio::sync::RwLock`, so queries run
//! concurrently while upserts take the write side.

use super::{check_dimension, rank, DistanceMetric, VectorStore};
use crate::errors::Result;
use crate::models::{Document, RetrievalResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug)]
pub struct InMemoryVectorStore {
    collection: String,
    metric: DistanceMetric,
    dimension: usize,
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryVectorStore {
    pub fn new(collection: &str, metric: DistanceMetric, dimension: usize) -> Self {
        Self {
            collection: collection.to_string(),
            metric,
            dimension,
            documents: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, document: &Document) -> Result<()> {
        check_dimension(self.dimension, &document.embedding)?;

        let mut documents = self.documents.write().await;
        if documents.insert(document.id.clone(), document.clone()).is_some() {
            tracing::debug!(document_id = %document.id, "Overwrote existing document");
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        check_dimension(self.dimension, embedding)?;

        let documents = self.documents.read().await;
        Ok(rank(documents.values(), embedding, k, self.metric))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}
