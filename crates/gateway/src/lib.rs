//! Tripwise API Gateway
//!
//! HTTP surface over the retrieval-augmented responder:
//! - Conversation sessions (create, inspect, ask, delete)
//! - Corpus and health introspection
//! - Rate limiting, request ids, tracing and Prometheus metrics

pub mod handlers;
pub mod middleware;

use axum::{
    extract::Request,
    middleware::{self as axum_middleware, Next},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tripwise_common::{
    config::AppConfig,
    embeddings::create_embedder,
    llm::create_chat_completer,
    vectorstore::create_vector_store,
    Embedder, RagResponder, SessionRegistry, VectorStore,
};
use tripwise_ingestion::{CorpusIngestor, IngestionError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionRegistry>,
    pub store: Arc<dyn VectorStore>,
    pub metrics: Option<PrometheusHandle>,
    /// Greeting from the startup corpus build, if one ran
    pub corpus_notice: Option<String>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn VectorStore>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            config,
            sessions,
            store,
            metrics: None,
            corpus_notice: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn with_corpus_notice(mut self, notice: Option<String>) -> Self {
        self.corpus_notice = notice;
        self
    }
}

/// Wire up clients, the vector store and the session registry from config,
/// building the corpus first when configured to.
pub async fn build_state(config: AppConfig) -> anyhow::Result<AppState> {
    let config = Arc::new(config);

    let embedder = create_embedder(&config.embedding)?;
    let completer = create_chat_completer(&config.chat)?;
    let store = create_vector_store(&config, embedder.dimension()).await?;

    let notice = if config.corpus.ingest_on_startup {
        ingest_corpus(&config, embedder.clone(), store.clone()).await?
    } else {
        None
    };

    let responder = Arc::new(RagResponder::from_config(&config, embedder, store.clone(), completer));
    let ttl = chrono::Duration::minutes(config.session.ttl_minutes);
    let sessions = Arc::new(SessionRegistry::new(responder, ttl));

    Ok(AppState::new(config, store, sessions).with_corpus_notice(notice))
}

async fn ingest_corpus(
    config: &AppConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
) -> anyhow::Result<Option<String>> {
    let dir: &Path = &config.corpus.dir;
    let ingestor = CorpusIngestor::from_config(&config.corpus, embedder, store);

    match ingestor.ingest(dir).await {
        Ok(report) => {
            let notice = report.user_notice();
            info!(
                status = ?report.status,
                indexed = report.indexed.len(),
                skipped = report.skipped.len(),
                notice = %notice,
                "Corpus ready"
            );
            Ok(Some(notice))
        }
        Err(IngestionError::CorpusNotFound(path)) => {
            warn!(corpus_dir = %path, "Corpus directory missing, skipping startup ingestion");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Session endpoints
        .route("/sessions", post(handlers::sessions::create_session))
        .route(
            "/sessions/{id}",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route("/sessions/{id}/messages", post(handlers::sessions::ask))
        // Corpus introspection
        .route("/corpus", get(handlers::corpus::corpus_info));

    let mut app = Router::new()
        .nest("/v1", api_routes)
        .route("/metrics", get(handlers::metrics::render));

    if state.config.rate_limit.enabled {
        let rps = state.config.rate_limit.requests_per_second;
        let limiter = middleware::rate_limit::create_rate_limiter(rps, state.config.rate_limit.burst);
        app = app.layer(axum_middleware::from_fn(move |request: Request, next: Next| {
            middleware::rate_limit::rate_limit_middleware(request, next, limiter.clone(), rps)
        }));
    }

    let timeout = TimeoutLayer::new(state.config.request_timeout());

    app.layer(axum_middleware::from_fn(middleware::metrics::track_metrics))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}
