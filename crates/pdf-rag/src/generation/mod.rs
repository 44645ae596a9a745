//! Grounded answer generation

mod generator;
mod prompt;

pub use generator::AnswerGenerator;
pub use prompt::PromptBuilder;
