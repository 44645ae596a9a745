//! API routes

pub mod documents;
pub mod query;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route("/documents", get(documents::list_documents))
        // raw PDF bytes, with the larger upload limit
        .route(
            "/documents/:id",
            post(documents::upload_document).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/query", post(query::query))
}
