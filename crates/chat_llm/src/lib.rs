//! chat_llm - streaming completion backends.
//!
//! The conversation core never depends on a specific backend's wire fields
//! beyond "delta text"; this crate keeps the OpenAI-compatible shapes
//! behind the [`CompletionBackend`] seam.

pub mod backend;
pub mod openai;
pub mod sse;
pub mod wire;

pub use backend::{CompletionBackend, CompletionChunk, CompletionStream, LLMError, Result};
pub use openai::OpenAiBackend;
