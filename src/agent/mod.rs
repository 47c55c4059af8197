//! Rule analysis through a language model
//!
//! The model is an opaque collaborator behind the `Analyzer` trait: it takes
//! a prompt and returns text. Everything around it (prompt layout, response
//! parsing, turning an analysis into a validation result) lives here.

mod gemini;
mod prompt;
mod response;
pub(crate) mod result;
mod validator;

pub use gemini::GeminiAnalyzer;
pub use result::ValidationResult;
pub use validator::{AgentContext, AgentRun, TaskValidatorAgent};

use async_trait::async_trait;
use thiserror::Error;

/// Failure talking to the model
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("model request failed: {0}")]
    Transport(String),

    #[error("model returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model returned no text")]
    EmptyResponse,
}

/// Text-in, text-out model endpoint
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AgentError>;

    /// Short label for logs
    fn name(&self) -> &str;
}
