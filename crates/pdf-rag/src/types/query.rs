//! Query types

use serde::{Deserialize, Serialize};

use super::document::Embedding;

/// A user question, embedded once retrieval starts
#[derive(Debug, Clone)]
pub struct Query {
    /// Question text
    pub text: String,
    /// Query embedding (set by the retriever)
    pub embedding: Option<Embedding>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embedding: None,
        }
    }
}

/// Query request body for the HTTP surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub question: String,

    /// Number of chunks to retrieve (server default when absent)
    ///
    /// Signed so that negative values reach validation instead of failing
    /// deserialization.
    #[serde(default)]
    pub top_k: Option<i64>,
}

impl QueryRequest {
    /// Validated `top_k`, falling back to `default_k`
    pub fn resolved_top_k(&self, default_k: usize) -> crate::Result<usize> {
        match self.top_k {
            None => Ok(default_k),
            Some(k) if k <= 0 => Err(crate::Error::InvalidQuery(format!(
                "top_k must be positive, got {}",
                k
            ))),
            Some(k) => Ok(k as usize),
        }
    }
}
