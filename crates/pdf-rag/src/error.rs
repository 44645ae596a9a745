//! Error types for the PDF RAG pipeline

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Loading raw bytes from the blob store
    Fetching,
    /// PDF text extraction
    Extracting,
    /// Semantic chunking
    Chunking,
    /// Embedding chunks or queries
    Embedding,
    /// Writing to the vector index
    Indexing,
    /// Query embedding + nearest-neighbour search
    Retrieving,
    /// Answer generation
    Generating,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::Chunking => "chunking",
            Stage::Embedding => "embedding",
            Stage::Indexing => "indexing",
            Stage::Retrieving => "retrieving",
            Stage::Generating => "generating",
        };
        f.write_str(name)
    }
}

/// Classification of a failed remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceFailure {
    /// The call exceeded its timeout
    Timeout,
    /// HTTP 429 or an equivalent throttle signal
    RateLimited,
    /// Connection failure or 5xx-class response
    Unavailable,
    /// Credentials rejected
    Auth,
    /// Account quota exhausted
    Quota,
    /// The service rejected the request payload
    InvalidInput,
    /// Anything else (malformed responses, protocol errors)
    Other,
}

impl ServiceFailure {
    /// Whether a retry may succeed
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited | Self::Unavailable)
    }

    /// Classify an HTTP status returned by a remote service
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        use reqwest::StatusCode as S;
        match status {
            S::REQUEST_TIMEOUT | S::GATEWAY_TIMEOUT => Self::Timeout,
            S::TOO_MANY_REQUESTS => {
                if body.to_lowercase().contains("quota") {
                    Self::Quota
                } else {
                    Self::RateLimited
                }
            }
            S::UNAUTHORIZED | S::FORBIDDEN => Self::Auth,
            S::PAYMENT_REQUIRED => Self::Quota,
            s if s.is_server_error() => Self::Unavailable,
            s if s.is_client_error() => Self::InvalidInput,
            _ => Self::Other,
        }
    }

    /// Classify a transport-level reqwest error
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_body() {
            Self::Unavailable
        } else if err.is_builder() {
            Self::InvalidInput
        } else if let Some(status) = err.status() {
            Self::from_status(status, "")
        } else {
            // Includes `is_request()` failures that are neither timeouts nor
            // connect errors; retrying sends the same request again.
            Self::Other
        }
    }
}

/// Reasons a PDF could not be opened
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Bytes do not start with a PDF header
    #[error("input is not a PDF document")]
    NotPdf,

    /// PDF structure could not be parsed
    #[error("malformed PDF: {0}")]
    Malformed(String),

    /// Encrypted and the configured password did not open it
    #[error("PDF is encrypted and could not be decrypted with the supplied password")]
    Encrypted,
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// PDF text extraction failed
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Degenerate chunking input or parameters
    #[error("Chunking failed: {0}")]
    Chunking(String),

    /// Embedding service failure
    #[error("Embedding service error ({failure:?}): {message}")]
    EmbeddingService {
        failure: ServiceFailure,
        message: String,
    },

    /// Some or all records could not be written to the vector index
    #[error("Index write failed for {} chunk(s): {message}", failed_ids.len())]
    IndexWrite {
        failed_ids: Vec<String>,
        written: Vec<String>,
        message: String,
    },

    /// Vector index call failure (upsert or search)
    #[error("Vector index error ({failure:?}): {message}")]
    VectorIndex {
        failure: ServiceFailure,
        message: String,
    },

    /// Caller misuse of the query API
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Generative model failure
    #[error("Generation service error ({failure:?}): {message}")]
    GenerationService {
        failure: ServiceFailure,
        message: String,
    },

    /// Blob store failure
    #[error("Blob store error: {0}")]
    BlobStore(String),

    /// The caller cancelled the flow
    #[error("Cancelled during {0}")]
    Cancelled(Stage),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an embedding service error
    pub fn embedding(failure: ServiceFailure, message: impl Into<String>) -> Self {
        Self::EmbeddingService {
            failure,
            message: message.into(),
        }
    }

    /// Create a generation service error
    pub fn generation(failure: ServiceFailure, message: impl Into<String>) -> Self {
        Self::GenerationService {
            failure,
            message: message.into(),
        }
    }

    /// Create a vector index error
    pub fn vector_index(failure: ServiceFailure, message: impl Into<String>) -> Self {
        Self::VectorIndex {
            failure,
            message: message.into(),
        }
    }

    /// Create an index write error covering the given ids
    pub fn index_write(
        failed_ids: Vec<String>,
        written: Vec<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::IndexWrite {
            failed_ids,
            written,
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the retry policy may try the call again
    pub fn is_transient(&self) -> bool {
        match self {
            Error::EmbeddingService { failure, .. }
            | Error::GenerationService { failure, .. }
            | Error::VectorIndex { failure, .. } => failure.is_transient(),
            _ => false,
        }
    }

    /// Stage this error naturally belongs to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Extraction(_) => Some(Stage::Extracting),
            Error::Chunking(_) => Some(Stage::Chunking),
            Error::EmbeddingService { .. } => Some(Stage::Embedding),
            Error::IndexWrite { .. } => Some(Stage::Indexing),
            Error::InvalidQuery(_) => Some(Stage::Retrieving),
            Error::GenerationService { .. } => Some(Stage::Generating),
            Error::BlobStore(_) => Some(Stage::Fetching),
            Error::Cancelled(stage) => Some(*stage),
            _ => None,
        }
    }

    /// Short machine-readable error type
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Extraction(_) => "extraction_error",
            Error::Chunking(_) => "chunking_error",
            Error::EmbeddingService { .. } => "embedding_service_error",
            Error::IndexWrite { .. } => "index_write_error",
            Error::VectorIndex { .. } => "vector_index_error",
            Error::InvalidQuery(_) => "invalid_query",
            Error::GenerationService { .. } => "generation_service_error",
            Error::BlobStore(_) => "blob_store_error",
            Error::Cancelled(_) => "cancelled",
            Error::Io(_) => "io_error",
            Error::Json(_) => "json_error",
            Error::Internal(_) => "internal_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Extraction(_) | Error::Chunking(_) | Error::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::EmbeddingService { failure, .. }
            | Error::GenerationService { failure, .. }
            | Error::VectorIndex { failure, .. } => {
                if failure.is_transient() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::BAD_GATEWAY
                }
            }
            Error::IndexWrite { .. } => StatusCode::BAD_GATEWAY,
            Error::BlobStore(_) => StatusCode::NOT_FOUND,
            Error::Cancelled(_) => StatusCode::REQUEST_TIMEOUT,
            Error::Io(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error raised by the orchestrator, tagged with the failing stage
#[derive(Debug, Error)]
#[error("{} failed at {stage}: {source}", document_id.as_deref().unwrap_or("query"))]
pub struct PipelineError {
    /// Stage that failed
    pub stage: Stage,
    /// Document being ingested (None for query flows)
    pub document_id: Option<String>,
    /// Underlying error
    #[source]
    pub source: Error,
}

impl PipelineError {
    /// Wrap an error with the stage it occurred in
    pub fn new(stage: Stage, document_id: Option<String>, source: Error) -> Self {
        Self {
            stage,
            document_id,
            source,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "type": self.kind(),
                "stage": self.stage(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.source.status_code();
        let body = Json(json!({
            "error": {
                "type": self.source.kind(),
                "stage": self.stage,
                "document_id": self.document_id,
                "message": self.source.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
