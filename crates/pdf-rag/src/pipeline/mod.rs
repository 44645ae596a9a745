//! Pipeline orchestration over the ingestion and query flows

mod orchestrator;
mod state;

pub use orchestrator::Pipeline;
pub use state::{IngestionReport, IngestionState, QueryReport, QueryState};
