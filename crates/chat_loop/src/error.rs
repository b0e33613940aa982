use chat_core::ChatError;
use chat_llm::LLMError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TurnError {
    /// The backend rejected the request before any increment arrived.
    #[error("Backend request failed: {0}")]
    Backend(#[from] LLMError),

    /// The completion stream failed mid-flight. Nothing was committed; the
    /// text accumulated up to the failure rides along for the caller to
    /// preserve if wanted.
    #[error("Completion stream failed: {source}")]
    Stream { source: LLMError, partial: String },

    #[error(transparent)]
    Chat(#[from] ChatError),
}
