//! Postgres vector store (pgvector)
//!
//! Each collection gets its own `vector(D)` table with an HNSW index built for
//! the collection's metric. A registry table remembers the metric and
//! dimension so a collection cannot be reopened with different settings.
//!
//! DDL runs through sea-orm; rows go through the sqlx pool so embeddings bind
//! as `pgvector::Vector`.

use super::{check_dimension, DistanceMetric, VectorStore};
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::models::{Document, RetrievalResult, RetrievedDocument};
use async_trait::async_trait;
use pgvector::Vector;
use sea_orm::ConnectionTrait;

const REGISTRY_TABLE: &str = "tripwise_collections";

pub struct PgVectorStore {
    pool: DbPool,
    collection: String,
    table: String,
    metric: DistanceMetric,
    dimension: usize,
    hnsw_m: u32,
    hnsw_ef_construction: u32,
}

impl PgVectorStore {
    pub fn new(
        pool: DbPool,
        collection: &str,
        metric: DistanceMetric,
        dimension: usize,
        hnsw_m: u32,
        hnsw_ef_construction: u32,
    ) -> Result<Self> {
        Ok(Self {
            pool,
            collection: collection.to_string(),
            table: table_name(collection)?,
            metric,
            dimension,
            hnsw_m,
            hnsw_ef_construction,
        })
    }

    async fn table_exists(&self) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(self.pool.pg_pool())
            .await
            .map_err(store_err)?;
        Ok(exists)
    }

    /// Compare the registered metric and dimension with ours.
    async fn check_registration(&self) -> Result<bool> {
        let row: Option<(String, i32)> = sqlx::query_as(&format!(
            "SELECT metric, dimension FROM {} WHERE name = $1",
            REGISTRY_TABLE
        ))
        .bind(&self.collection)
        .fetch_optional(self.pool.pg_pool())
        .await
        .map_err(store_err)?;

        match row {
            None => Ok(false),
            Some((metric, dimension)) => {
                if metric != self.metric.as_str() || dimension as usize != self.dimension {
                    return Err(AppError::Configuration {
                        message: format!(
                            "Collection '{}' was created with metric {} and dimension {}, \
                             cannot reopen with metric {} and dimension {}",
                            self.collection,
                            metric,
                            dimension,
                            self.metric.as_str(),
                            self.dimension
                        ),
                    });
                }
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn ensure_collection(&self) -> Result<()> {
        let conn = self.pool.connection();

        conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector")
            .await
            .map_err(store_err)?;
        conn.execute_unprepared(&registry_ddl()).await.map_err(store_err)?;

        if self.check_registration().await? {
            tracing::debug!(collection = %self.collection, "Reusing collection");
            return Ok(());
        }

        for statement in collection_ddl(
            &self.table,
            self.dimension,
            self.metric,
            self.hnsw_m,
            self.hnsw_ef_construction,
        ) {
            conn.execute_unprepared(&statement).await.map_err(store_err)?;
        }

        sqlx::query(&format!(
            "INSERT INTO {} (name, metric, dimension) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
            REGISTRY_TABLE
        ))
        .bind(&self.collection)
        .bind(self.metric.as_str())
        .bind(self.dimension as i32)
        .execute(self.pool.pg_pool())
        .await
        .map_err(store_err)?;

        tracing::info!(
            collection = %self.collection,
            table = %self.table,
            metric = self.metric.as_str(),
            "Created collection"
        );
        Ok(())
    }

    async fn upsert(&self, document: &Document) -> Result<()> {
        check_dimension(self.dimension, &document.embedding)?;

        sqlx::query(&upsert_sql(&self.table))
            .bind(&document.id)
            .bind(&document.text)
            .bind(Vector::from(document.embedding.clone()))
            .execute(self.pool.pg_pool())
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<RetrievalResult> {
        check_dimension(self.dimension, embedding)?;

        if k == 0 || !self.table_exists().await? {
            return Ok(RetrievalResult::empty());
        }

        let rows: Vec<(String, String, f32)> = sqlx::query_as(&query_sql(&self.table, self.metric))
            .bind(Vector::from(embedding.to_vec()))
            .bind(k as i64)
            .fetch_all(self.pool.pg_pool())
            .await
            .map_err(store_err)?;

        Ok(RetrievalResult::new(
            rows.into_iter()
                .map(|(id, text, distance)| RetrievedDocument { id, text, distance })
                .collect(),
        ))
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(self.pool.pg_pool())
            .await
            .map_err(store_err)?;
        Ok(count as usize)
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

fn store_err<E: std::fmt::Display>(e: E) -> AppError {
    AppError::vector_store(e.to_string())
}

/// Table holding a collection's documents.
///
/// Collection names become part of an identifier, so only ASCII letters,
/// digits and underscores are accepted.
fn table_name(collection: &str) -> Result<String> {
    let valid = !collection.is_empty()
        && collection.len() <= 48
        && collection.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(AppError::Configuration {
            message: format!("Invalid collection name for pgvector backend: '{}'", collection),
        });
    }
    Ok(format!("tripwise_docs_{}", collection.to_ascii_lowercase()))
}

fn opclass(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "vector_cosine_ops",
        DistanceMetric::L2 => "vector_l2_ops",
        DistanceMetric::InnerProduct => "vector_ip_ops",
    }
}

/// SQL expression for the distance to `$1`, matching `DistanceMetric::distance`.
fn distance_expr(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "embedding <=> $1",
        DistanceMetric::L2 => "embedding <-> $1",
        // <#> is the negated inner product
        DistanceMetric::InnerProduct => "1 + (embedding <#> $1)",
    }
}

fn order_expr(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "embedding <=> $1",
        DistanceMetric::L2 => "embedding <-> $1",
        DistanceMetric::InnerProduct => "embedding <#> $1",
    }
}

fn registry_ddl() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            name TEXT PRIMARY KEY, \
            metric TEXT NOT NULL, \
            dimension INTEGER NOT NULL, \
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
        REGISTRY_TABLE
    )
}

fn collection_ddl(
    table: &str,
    dimension: usize,
    metric: DistanceMetric,
    m: u32,
    ef_construction: u32,
) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
                id TEXT PRIMARY KEY, \
                content TEXT NOT NULL, \
                embedding vector({}) NOT NULL, \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW())",
            table, dimension
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {}_hnsw ON {} USING hnsw (embedding {}) \
             WITH (m = {}, ef_construction = {})",
            table,
            table,
            opclass(metric),
            m,
            ef_construction
        ),
    ]
}

fn upsert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (id, content, embedding) VALUES ($1, $2, $3) \
         ON CONFLICT (id) DO UPDATE SET content = EXCLUDED.content, \
         embedding = EXCLUDED.embedding, updated_at = NOW()",
        table
    )
}

fn query_sql(table: &str, metric: DistanceMetric) -> String {
    format!(
        "SELECT id, content, ({})::real AS distance FROM {} ORDER BY {}, id LIMIT $2",
        distance_expr(metric),
        table,
        order_expr(metric)
    )
}
