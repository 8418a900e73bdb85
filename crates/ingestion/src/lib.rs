//! Tripwise ingestion
//!
//! Builds the travel FAQ collection from a directory of PDF documents:
//! - `pdf`: plain-text extraction with lopdf
//! - `ingestor`: directory scan, embedding and idempotent collection build

pub mod errors;
pub mod ingestor;
pub mod pdf;

pub use errors::IngestionError;
pub use ingestor::{CollectionStatus, CorpusIngestor, IngestReport, SkippedDocument};
