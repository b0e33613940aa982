use std::pin::Pin;

use async_trait::async_trait;
use chat_core::GenerationParams;
use chat_prompt::PromptEntry;
use futures::Stream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("API error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

/// One increment of a streamed completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionChunk {
    /// Partial assistant text.
    Delta(String),
    /// Explicit end of the stream. Backends may instead simply end the
    /// stream; consumers must accept both.
    Done,
}

pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk>> + Send>>;

/// A streaming completion backend.
///
/// Both methods return once the response headers arrive; the body is
/// consumed through the returned stream, and dropping the stream releases
/// the connection.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Stream a completion for a structured entry list ("instruct" mode).
    async fn chat_stream(
        &self,
        entries: &[PromptEntry],
        params: &GenerationParams,
        stop: &[String],
    ) -> Result<CompletionStream>;

    /// Stream a completion for a flattened text prompt ("chat" mode).
    async fn text_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stop: &[String],
    ) -> Result<CompletionStream>;
}
