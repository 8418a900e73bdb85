//! Tripwise corpus ingestion CLI
//!
//! Embeds every PDF in the corpus directory into the configured collection
//! and prints the ingestion report as JSON.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tripwise_common::config::AppConfig;
use tripwise_common::embeddings::create_embedder;
use tripwise_common::telemetry::init_tracing;
use tripwise_common::vectorstore::create_vector_store;
use tripwise_common::VERSION;
use tripwise_ingestion::CorpusIngestor;

#[derive(Parser, Debug)]
#[command(name = "ingest", version, about = "Build the Tripwise document collection")]
struct Args {
    /// Directory holding the source documents
    #[arg(long)]
    corpus_dir: Option<PathBuf>,

    /// Collection to build or reuse
    #[arg(long)]
    collection: Option<String>,

    /// Re-embed every document even if the collection is populated
    #[arg(long)]
    force: bool,

    /// Configuration file (defaults to config/default + APP__ environment)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };
    if let Some(dir) = args.corpus_dir {
        config.corpus.dir = dir;
    }
    if let Some(collection) = args.collection {
        config.vector_store.collection = collection;
    }
    config.validate()?;

    init_tracing(&config.observability);
    info!("Starting Tripwise ingestion v{}", VERSION);

    let embedder = create_embedder(&config.embedding)?;
    let store = create_vector_store(&config, embedder.dimension()).await?;

    let ingestor = CorpusIngestor::from_config(&config.corpus, embedder, store).with_force(args.force);
    let report = ingestor.ingest(&config.corpus.dir).await?;

    info!(notice = %report.user_notice(), "Ingestion finished");
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
