//! Corpus introspection

use axum::{extract::State, Json};
use serde::Serialize;
use tripwise_common::errors::Result;

use crate::AppState;

#[derive(Serialize)]
pub struct CorpusResponse {
    pub collection: String,
    pub metric: String,
    pub document_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

/// Collection name, metric and size
pub async fn corpus_info(State(state): State<AppState>) -> Result<Json<CorpusResponse>> {
    let document_count = state.store.count().await?;

    Ok(Json(CorpusResponse {
        collection: state.store.collection().to_string(),
        metric: state.store.metric().as_str().to_string(),
        document_count,
        notice: state.corpus_notice.clone(),
    }))
}
