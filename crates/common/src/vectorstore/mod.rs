//! Vector store abstraction
//!
//! A store is bound to one collection. It upserts whole-document records and
//! answers k-nearest-neighbour queries ordered by ascending distance.
//!
//! Backends:
//! - `memory`: process-local, for tests and throwaway runs
//! - `file`: JSON snapshot on disk, survives restarts
//! - `postgres`: pgvector tables with an HNSW index

mod file;
mod memory;
mod postgres;

pub use self::file::FileVectorStore;
pub use self::memory::InMemoryVectorStore;
pub use self::postgres::PgVectorStore;

use crate::config::{AppConfig, VectorStoreBackend};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::models::{Document, RetrievalResult, RetrievedDocument};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dissimilarity between two embeddings; smaller means more similar.
///
/// Fixed when a collection is created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in `[0, 2]`
    #[default]
    Cosine,
    /// Euclidean distance
    L2,
    /// `1 - dot(a, b)`
    #[serde(rename = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::InnerProduct => "ip",
        }
    }

    /// Distance between two equal-length vectors
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a * norm_b)
            }
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            DistanceMetric::InnerProduct => {
                1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>()
            }
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" => Ok(DistanceMetric::InnerProduct),
            other => Err(AppError::Configuration {
                message: format!("Unknown distance metric: {}", other),
            }),
        }
    }
}

/// Storage backend for whole-document embeddings
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if absent, else reuse it.
    async fn ensure_collection(&self) -> Result<()>;

    /// Insert a document, overwriting any record with the same id.
    async fn upsert(&self, document: &Document) -> Result<()>;

    /// Up to `k` nearest documents, ascending by distance.
    ///
    /// An empty or never-created collection yields an empty result.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult>;

    /// Number of stored documents (0 for a never-created collection)
    async fn count(&self) -> Result<usize>;

    /// Collection name
    fn collection(&self) -> &str;

    /// Distance metric the collection was created with
    fn metric(&self) -> DistanceMetric;
}

/// Reject vectors whose length differs from the collection's.
pub(crate) fn check_dimension(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(AppError::invalid_input(format!(
            "embedding has dimension {}, collection expects {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}

/// Exhaustive k-nearest search over in-process records.
pub(crate) fn rank<'a, I>(documents: I, query: &[f32], k: usize, metric: DistanceMetric) -> RetrievalResult
where
    I: IntoIterator<Item = &'a Document>,
{
    if k == 0 {
        return RetrievalResult::empty();
    }

    let mut scored: Vec<RetrievedDocument> = documents
        .into_iter()
        .map(|doc| RetrievedDocument {
            id: doc.id.clone(),
            text: doc.text.clone(),
            distance: metric.distance(&doc.embedding, query),
        })
        .collect();

    // Ties broken by id so results are stable across runs
    scored.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(k);
    RetrievalResult::new(scored)
}

/// Build the configured vector store
pub async fn create_vector_store(config: &AppConfig, dimension: usize) -> Result<Arc<dyn VectorStore>> {
    let vs = &config.vector_store;

    let store: Arc<dyn VectorStore> = match vs.backend {
        VectorStoreBackend::Memory => Arc::new(InMemoryVectorStore::new(&vs.collection, vs.metric, dimension)),
        VectorStoreBackend::File => Arc::new(
            FileVectorStore::open(&vs.data_dir, &vs.collection, vs.metric, dimension).await?,
        ),
        VectorStoreBackend::Pgvector => {
            let pool = DbPool::new(&config.database).await?;
            Arc::new(PgVectorStore::new(
                pool,
                &vs.collection,
                vs.metric,
                dimension,
                vs.hnsw_m,
                vs.hnsw_ef_construction,
            )?)
        }
    };

    tracing::info!(
        backend = ?vs.backend,
        collection = %vs.collection,
        metric = vs.metric.as_str(),
        dimension = dimension,
        "Vector store initialized"
    );

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_distance() {
        let metric = DistanceMetric::Cosine;
        assert!(metric.distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((metric.distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((metric.distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(metric.distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_l2_and_inner_product() {
        assert!((DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert!(DistanceMetric::InnerProduct.distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
    }

    #[test]
    fn test_metric_parsing() {
        assert_eq!("cosine".parse::<DistanceMetric>().unwrap(), DistanceMetric::Cosine);
        assert_eq!("IP".parse::<DistanceMetric>().unwrap(), DistanceMetric::InnerProduct);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let docs = vec![
            Document::new("far", "far", vec![0.0, 1.0]),
            Document::new("near", "near", vec![1.0, 0.0]),
            Document::new("mid", "mid", vec![1.0, 1.0]),
        ];
        let result = rank(&docs, &[1.0, 0.0], 2, DistanceMetric::Cosine);
        let ids: Vec<_> = result.documents().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert!(rank(&docs, &[1.0, 0.0], 0, DistanceMetric::Cosine).is_empty());
    }
}
