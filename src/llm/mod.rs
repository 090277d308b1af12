//! Text-generation providers.
//!
//! Business logic (what to ask for, how to read the answer) lives in
//! `helper::generation_helpers`; this module only moves prompts to a provider
//! and brings raw text back.

pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Provider configuration error: {0}")]
    Configuration(String),
    #[error("Provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("Provider request failed: {0}")]
    Transport(String),
    #[error("Provider request timed out after {0} seconds")]
    Timeout(u64),
    #[error("Could not parse provider response: {0}")]
    Parse(String),
    #[error("Provider response rejected: {0}")]
    Validation(String),
}

/// One non-streaming chat completion.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system_prompt: String,
    /// Source material sent as a second system message when present.
    pub context: Option<String>,
    pub prompt: String,
    pub provider_index: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    /// Identifier recorded as `generated_by` on posts.
    pub provider: String,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, GenerationError>;
}
