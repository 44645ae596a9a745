//! Document upload and listing endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, ExtractionError, PipelineError, Result, Stage};
use crate::pipeline::IngestionReport;
use crate::server::state::AppState;

/// Response for the document list
#[derive(Debug, Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<String>,
    pub total: usize,
}

/// POST /api/documents/:id - ingest the raw PDF in the request body
pub async fn upload_document(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    body: Bytes,
) -> std::result::Result<Json<IngestionReport>, PipelineError> {
    if body.is_empty() {
        return Err(PipelineError::new(
            Stage::Extracting,
            Some(document_id),
            Error::Extraction(ExtractionError::NotPdf),
        ));
    }
    tracing::info!(document_id = %document_id, bytes = body.len(), "Upload received");

    // dropping the handler (client went away) cancels the flow
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let pipeline = state.pipeline();
    let report = if pipeline.has_document_store() {
        pipeline
            .store_and_ingest(&document_id, body.to_vec(), &cancel)
            .await
    } else {
        pipeline
            .ingest(&document_id, &document_id, body.to_vec(), &cancel)
            .await
    };

    report.into_result().map(Json)
}

/// GET /api/documents - PDFs available in the blob store
pub async fn list_documents(State(state): State<AppState>) -> Result<Json<DocumentListResponse>> {
    let documents = state.pipeline().list_documents().await?;
    Ok(Json(DocumentListResponse {
        total: documents.len(),
        documents,
    }))
}
