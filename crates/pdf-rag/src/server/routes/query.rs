//! Query endpoint

use axum::{extract::State, Json};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Stage};
use crate::server::state::AppState;
use crate::types::{QueryRequest, QueryResponse};

/// POST /api/query - answer a question with citations
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<Json<QueryResponse>, PipelineError> {
    let top_k = request
        .resolved_top_k(state.config().retrieval.top_k)
        .map_err(|e| PipelineError::new(Stage::Retrieving, None, e))?;

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let report = state
        .pipeline()
        .query(&request.question, Some(top_k), &cancel)
        .await;
    let chunks_retrieved = report.chunks_retrieved();
    let elapsed_ms = report.elapsed_ms;
    let answer = report.into_result()?;

    Ok(Json(QueryResponse::from_answer(
        &answer,
        chunks_retrieved,
        elapsed_ms,
    )))
}
