use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::utils::json_body;
use crate::core::errors::ApiError;
use crate::rag::{IngestRequest, QueryOutcome, QueryRequest};
use crate::state::AppState;

pub async fn rag_chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let request = json_body(payload)?;
    let mode = request.mode;
    let namespace = request.namespace.clone().unwrap_or_default();

    let outcome = state.rag.query(request).await.map_err(|err| {
        tracing::error!(?mode, namespace = %namespace, error = %err, "RAG query failed");
        ApiError::from(err)
    })?;

    tracing::info!(
        mode = ?outcome.mode,
        docs = outcome.docs_count,
        namespace = %namespace,
        "RAG query answered"
    );
    Ok(Json(outcome))
}

pub async fn add_knowledge(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = json_body(payload)?;
    let title = request.title.clone();

    let chunks = state.rag.ingest(request).await.map_err(|err| {
        tracing::error!(title = %title, error = %err, "Knowledge ingestion failed");
        ApiError::from(err)
    })?;

    let count = chunks.len();
    let message = if count > 1 {
        format!("Knowledge added, split into {} segments", count)
    } else {
        "Knowledge added".to_string()
    };
    tracing::info!(title = %title, chunks = count, "Knowledge ingested");

    Ok(Json(json!({
        "knowledges": chunks,
        "chunks": count,
        "message": message,
    })))
}
