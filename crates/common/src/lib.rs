//! Tripwise Common Library
//!
//! Shared code for the Tripwise services including:
//! - Domain types (documents, retrieval results, conversation turns)
//! - Embedding and chat-completion client abstractions
//! - Vector store backends (memory, file, pgvector)
//! - The retrieval-augmented responder and session registry
//! - Error types, configuration, metrics and tracing setup

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod rag;
pub mod session;
pub mod telemetry;
pub mod vectorstore;

// Re-export commonly used types
pub use config::AppConfig;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::ChatCompleter;
pub use models::{
    ChatMessage, ConversationHistory, ConversationTurn, Document, RetrievalResult,
    RetrievedDocument, Role,
};
pub use rag::{RagReply, RagResponder, RelevanceDecision, RelevanceGate};
pub use session::{Session, SessionRegistry};
pub use vectorstore::{DistanceMetric, VectorStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension (matches the default model)
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default chat model
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

/// Default collection holding the travel FAQ corpus
pub const DEFAULT_COLLECTION: &str = "travelfaq_collection";
