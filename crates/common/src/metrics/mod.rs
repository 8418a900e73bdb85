//! Metrics and observability utilities
//!
//! Provides Prometheus-style metrics for each pipeline stage
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Tripwise metrics
pub const METRICS_PREFIX: &str = "tripwise";

/// Buckets for request latency (in seconds); answers wait on two remote calls
pub const LATENCY_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    30.00, // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Total vector store queries, labelled by relevance decision"
    );

    describe_histogram!(
        format!("{}_retrieval_nearest_distance", METRICS_PREFIX),
        Unit::Count,
        "Distance of the nearest neighbour per query"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    // Completion metrics
    describe_counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat completion requests"
    );

    describe_histogram!(
        format!("{}_completion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat completion latency in seconds"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents embedded and stored"
    );

    describe_counter!(
        format!("{}_documents_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents skipped during ingestion"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Corpus ingestion latency in seconds"
    );

    // Session metrics
    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Live conversation sessions"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Helper to record a retrieval and its relevance decision
pub fn record_retrieval(nearest_distance: Option<f32>, context_used: bool) {
    let decision = if context_used { "context" } else { "no_context" };

    counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        "decision" => decision
    )
    .increment(1);

    if let Some(distance) = nearest_distance {
        histogram!(format!("{}_retrieval_nearest_distance", METRICS_PREFIX)).record(distance as f64);
    }
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record chat completion metrics
pub fn record_completion(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_completion_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_completion_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record ingestion metrics
pub fn record_ingestion(duration_secs: f64, indexed: usize, skipped: usize, collection: &str) {
    counter!(
        format!("{}_documents_ingested_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(indexed as u64);

    counter!(
        format!("{}_documents_skipped_total", METRICS_PREFIX),
        "collection" => collection.to_string()
    )
    .increment(skipped as u64);

    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Helper to publish the live session count
pub fn record_sessions(active: usize) {
    gauge!(format!("{}_sessions_active", METRICS_PREFIX)).set(active as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every helper must be a no-op
        let metrics = RequestMetrics::start("POST", "/v1/sessions/{id}/messages");
        metrics.finish(200);
        record_retrieval(Some(0.3), true);
        record_retrieval(None, false);
        record_embedding(0.1, "mock-embedding", true);
        record_completion(0.2, "echo", false);
        record_ingestion(1.0, 3, 1, "travelfaq_collection");
        record_sessions(2);
    }
}
