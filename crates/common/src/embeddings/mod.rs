//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI (text-embedding-3-small, text-embedding-3-large, ada-002)
//! - Mock (deterministic vectors for offline development and tests)
//!
//! Every call is a single attempt. Nothing is cached.

use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Reject text the embedding service cannot take.
pub fn validate_input(text: &str, max_chars: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(AppError::invalid_input("cannot embed empty text"));
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(AppError::invalid_input(format!(
            "text of {} chars exceeds the embedding limit of {} chars",
            len, max_chars
        )));
    }
    Ok(())
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_input_chars: usize,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

/// Known output dimension for OpenAI embedding models
pub fn model_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-small" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        _ => None,
    }
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let dimension = model_dimension(&config.model).unwrap_or(config.dimension);
        if dimension != config.dimension {
            tracing::warn!(
                model = %config.model,
                configured = config.dimension,
                actual = dimension,
                "Configured embedding dimension does not match model, using model dimension"
            );
        }

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_input_chars: config.max_input_chars,
        })
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: text,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::EmbeddingService {
                message: if e.is_timeout() {
                    format!("Request timed out: {}", e)
                } else {
                    format!("Request failed: {}", e)
                },
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::EmbeddingService {
                message: format!("API error {}: {}", status, body),
            });
        }

        let body = response.text().await.map_err(|e| AppError::EmbeddingService {
            message: format!("Failed to read response: {}", e),
        })?;

        parse_embedding_response(&body, self.dimension)
    }
}

/// Pull the single embedding out of an embeddings API body.
pub(crate) fn parse_embedding_response(body: &str, dimension: usize) -> Result<Vec<f32>> {
    let result: OpenAIResponse =
        serde_json::from_str(body).map_err(|e| AppError::EmbeddingService {
            message: format!("Failed to parse response: {}", e),
        })?;

    let embedding = result
        .data
        .into_iter()
        .next()
        .map(|e| e.embedding)
        .ok_or_else(|| AppError::EmbeddingService {
            message: "Empty response".to_string(),
        })?;

    if embedding.len() != dimension {
        return Err(AppError::EmbeddingService {
            message: format!(
                "Expected embedding of dimension {}, got {}",
                dimension,
                embedding.len()
            ),
        });
    }

    Ok(embedding)
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        validate_input(text, self.max_input_chars)?;

        let start = Instant::now();
        let result = self.make_request(text).await;
        metrics::record_embedding(start.elapsed().as_secs_f64(), &self.model, result.is_ok());

        if let Err(ref e) = result {
            tracing::warn!(model = %self.model, error = %e, "Embedding request failed");
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for development and testing.
///
/// The vector is a pseudo-random unit vector seeded from the text, so equal
/// texts always embed identically.
pub struct MockEmbedder {
    dimension: usize,
    max_input_chars: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            max_input_chars: usize::MAX,
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        validate_input(text, self.max_input_chars)?;

        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        let mut rng = StdRng::from_seed(seed);

        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|_| rng.gen_range(-1.0f32..1.0f32))
            .collect();
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(key, config)?))
        }
        "mock" => Ok(Arc::new(
            MockEmbedder::new(config.dimension).with_max_input_chars(config.max_input_chars),
        )),
        other => Err(AppError::Configuration {
            message: format!("Unknown embedding provider: {}", other),
        }),
    }
}
