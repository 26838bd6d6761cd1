pub mod types;
pub mod prompt;
pub mod parser;
pub mod record;
pub mod ollama;
pub mod ollama_types;
pub mod shared;

pub use types::*;
pub use prompt::*;
pub use parser::*;
pub use record::*;
pub use ollama::*;
pub use ollama_types::*;
pub use shared::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Invalid model response: {0}")]
    InvalidModelResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
