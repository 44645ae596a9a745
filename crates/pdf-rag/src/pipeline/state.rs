//! Flow states and per-run reports

use serde::Serialize;

use crate::error::{Error, PipelineError, Stage};
use crate::ingestion::ChunkWarning;
use crate::types::{Answer, Document, RetrievalResult};

/// Ingestion flow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IngestionState {
    Idle,
    /// Loading bytes from the blob store (stored-document flows only)
    Fetching,
    Extracting,
    Chunking,
    Embedding,
    Indexing,
    Done,
    Failed { stage: Stage, error: String },
}

impl IngestionState {
    /// Stage a failure in this state is attributed to
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Fetching => Some(Stage::Fetching),
            Self::Extracting => Some(Stage::Extracting),
            Self::Chunking => Some(Stage::Chunking),
            Self::Embedding => Some(Stage::Embedding),
            Self::Indexing => Some(Stage::Indexing),
            Self::Failed { stage, .. } => Some(*stage),
            Self::Idle | Self::Done => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// Query flow state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueryState {
    Idle,
    Retrieving,
    Generating,
    Done,
    Failed { stage: Stage, error: String },
}

impl QueryState {
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Retrieving => Some(Stage::Retrieving),
            Self::Generating => Some(Stage::Generating),
            Self::Failed { stage, .. } => Some(*stage),
            Self::Idle | Self::Done => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed { .. })
    }
}

/// Outcome of one ingestion run
#[derive(Debug, Serialize)]
pub struct IngestionReport {
    pub document_id: String,
    /// Final state
    pub state: IngestionState,
    /// Every state entered, in order
    pub trace: Vec<IngestionState>,
    /// Document metadata, once the bytes were available
    pub document: Option<Document>,
    /// Chunk ids written to the index
    pub chunk_ids: Vec<String>,
    /// Non-fatal chunking observations
    pub warnings: Vec<ChunkWarning>,
    #[serde(skip)]
    error: Option<Error>,
}

impl IngestionReport {
    pub(crate) fn new(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            state: IngestionState::Idle,
            trace: vec![IngestionState::Idle],
            document: None,
            chunk_ids: Vec::new(),
            warnings: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn enter(&mut self, state: IngestionState) {
        tracing::info!(document_id = %self.document_id, state = ?state, "Ingestion stage");
        self.trace.push(state.clone());
        self.state = state;
    }

    /// Move to `Failed`, attributing `error` to the current stage
    pub(crate) fn fail(mut self, error: Error) -> Self {
        let stage = self
            .state
            .stage()
            .or_else(|| error.stage())
            .unwrap_or(Stage::Extracting);
        tracing::warn!(
            document_id = %self.document_id,
            %stage,
            "Ingestion failed: {}",
            error
        );
        let failed = IngestionState::Failed {
            stage,
            error: error.to_string(),
        };
        self.trace.push(failed.clone());
        self.state = failed;
        self.error = Some(error);
        self
    }

    pub fn is_done(&self) -> bool {
        self.state == IngestionState::Done
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// `Err` carrying the failing stage when the run failed
    pub fn into_result(mut self) -> std::result::Result<Self, PipelineError> {
        match (self.error.take(), self.state.clone()) {
            (Some(error), IngestionState::Failed { stage, .. }) => Err(PipelineError::new(
                stage,
                Some(self.document_id),
                error,
            )),
            (Some(error), state) => Err(PipelineError::new(
                state.stage().unwrap_or(Stage::Extracting),
                Some(self.document_id),
                error,
            )),
            (None, _) => Ok(self),
        }
    }
}

/// Outcome of one query run
#[derive(Debug, Serialize)]
pub struct QueryReport {
    pub state: QueryState,
    pub trace: Vec<QueryState>,
    /// Chunks returned by the retriever
    pub retrieval: Option<RetrievalResult>,
    pub answer: Option<Answer>,
    pub elapsed_ms: u64,
    #[serde(skip)]
    error: Option<Error>,
}

impl QueryReport {
    pub(crate) fn new() -> Self {
        Self {
            state: QueryState::Idle,
            trace: vec![QueryState::Idle],
            retrieval: None,
            answer: None,
            elapsed_ms: 0,
            error: None,
        }
    }

    pub(crate) fn enter(&mut self, state: QueryState) {
        tracing::debug!(state = ?state, "Query stage");
        self.trace.push(state.clone());
        self.state = state;
    }

    pub(crate) fn fail(mut self, error: Error) -> Self {
        let stage = self
            .state
            .stage()
            .or_else(|| error.stage())
            .unwrap_or(Stage::Retrieving);
        tracing::warn!(%stage, "Query failed: {}", error);
        let failed = QueryState::Failed {
            stage,
            error: error.to_string(),
        };
        self.trace.push(failed.clone());
        self.state = failed;
        self.error = Some(error);
        self
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Number of chunks retrieved before context truncation
    pub fn chunks_retrieved(&self) -> usize {
        self.retrieval.as_ref().map_or(0, RetrievalResult::len)
    }

    /// The answer, or the failure tagged with its stage
    pub fn into_result(mut self) -> std::result::Result<Answer, PipelineError> {
        if let Some(error) = self.error.take() {
            let stage = self.state.stage().unwrap_or(Stage::Retrieving);
            return Err(PipelineError::new(stage, None, error));
        }
        self.answer.ok_or_else(|| {
            PipelineError::new(
                Stage::Generating,
                None,
                Error::internal("query finished without an answer"),
            )
        })
    }
}
