//! Configuration management for Tripwise services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Every section has defaults, so an empty environment yields a runnable
//! offline setup (mock providers, file store under `data/`).

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{AppError, Result};
use crate::vectorstore::DistanceMetric;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Database configuration (pgvector backend)
    pub database: DatabaseConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Chat completion service configuration
    pub chat: ChatConfig,

    /// Vector store configuration
    pub vector_store: VectorStoreConfig,

    /// Retrieval and response assembly knobs
    pub retrieval: RetrievalConfig,

    /// Source document corpus
    pub corpus: CorpusConfig,

    /// Conversation session configuration
    pub session: SessionConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL
    pub url: String,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Minimum number of connections
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    pub model: String,

    /// Embedding dimension
    pub dimension: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Longest text accepted for a single embedding request
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Chat provider: openai, mock
    pub provider: String,

    /// API key for chat completion service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    pub model: String,

    /// Sampling temperature; the provider default when unset
    pub temperature: Option<f32>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Which vector store backend to use
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreBackend {
    Memory,
    File,
    Pgvector,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    /// Backend: memory, file, pgvector
    pub backend: VectorStoreBackend,

    /// Collection name
    pub collection: String,

    /// Distance metric, fixed at collection creation
    pub metric: DistanceMetric,

    /// Directory for the file backend
    pub data_dir: PathBuf,

    /// HNSW graph connectivity (pgvector)
    pub hnsw_m: u32,

    /// HNSW construction candidate list size (pgvector)
    pub hnsw_ef_construction: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of neighbours requested per question
    pub top_k: usize,

    /// Nearest-neighbour distance below which retrieved text is used
    pub relevance_threshold: f32,

    /// Response length cap in tokens
    pub max_tokens: u32,

    /// Timeout for a vector store query in seconds
    pub store_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory of source documents
    pub dir: PathBuf,

    /// Recognized document extensions (case-insensitive)
    pub extensions: Vec<String>,

    /// Build the corpus when the gateway starts
    pub ingest_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after which a session is dropped
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Expose Prometheus metrics
    pub metrics_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    pub requests_per_second: u32,

    /// Burst capacity
    pub burst: u32,

    /// Enable rate limiting
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 60 }
fn default_database_url() -> String { "postgres://localhost/tripwise".to_string() }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_provider() -> String { "mock".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_service_timeout() -> u64 { 30 }
fn default_max_input_chars() -> usize { 24_000 }
fn default_chat_model() -> String { crate::DEFAULT_CHAT_MODEL.to_string() }
fn default_collection() -> String { crate::DEFAULT_COLLECTION.to_string() }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_hnsw_m() -> u32 { 32 }
fn default_hnsw_ef_construction() -> u32 { 64 }
fn default_top_k() -> usize { 3 }
fn default_relevance_threshold() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 150 }
fn default_store_timeout() -> u64 { 10 }
fn default_corpus_dir() -> PathBuf { PathBuf::from("datafiles") }
fn default_extensions() -> Vec<String> { vec!["pdf".to_string()] }
fn default_session_ttl() -> i64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_rate_limit() -> u32 { 20 }
fn default_burst() -> u32 { 40 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_service_timeout(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_base: None,
            model: default_chat_model(),
            temperature: None,
            timeout_secs: default_service_timeout(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorStoreBackend::File,
            collection: default_collection(),
            metric: DistanceMetric::Cosine,
            data_dir: default_data_dir(),
            hnsw_m: default_hnsw_m(),
            hnsw_ef_construction: default_hnsw_ef_construction(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            relevance_threshold: default_relevance_threshold(),
            max_tokens: default_max_tokens(),
            store_timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            dir: default_corpus_dir(),
            extensions: default_extensions(),
            ingest_on_startup: true,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_session_ttl(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_enabled: true,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOP_K=5
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific config file, still honouring APP__ overrides
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject values that would make the pipeline meaningless
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            return Err(configuration("retrieval.top_k must be at least 1"));
        }
        if !(self.retrieval.relevance_threshold > 0.0) {
            return Err(configuration("retrieval.relevance_threshold must be positive"));
        }
        if self.retrieval.max_tokens == 0 {
            return Err(configuration("retrieval.max_tokens must be at least 1"));
        }
        if self.embedding.dimension == 0 {
            return Err(configuration("embedding.dimension must be at least 1"));
        }
        if self.corpus.extensions.is_empty() {
            return Err(configuration("corpus.extensions must not be empty"));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get vector store query timeout as Duration
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval.store_timeout_secs)
    }
}

fn configuration(message: &str) -> AppError {
    AppError::Configuration {
        message: message.to_string(),
    }
}
