//! OpenAI-compatible request and stream shapes.
//!
//! Covers both the chat-completions endpoint (structured entries, used for
//! "instruct" rendering) and the legacy completions endpoint (flattened
//! text, used for "chat" rendering). Request bodies carry role and content
//! only; internal fields like display names and ids never reach the wire.

use chat_core::GenerationParams;
use chat_prompt::PromptEntry;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::backend::{CompletionChunk, Result};

/// Convert rendered entries to an OpenAI-compatible `messages` array.
pub fn entries_to_wire_json(entries: &[PromptEntry]) -> Vec<Value> {
    entries
        .iter()
        .map(|entry| {
            json!({
                "role": entry.role.as_str(),
                "content": entry.content,
            })
        })
        .collect()
}

fn apply_generation_params(body: &mut Value, params: &GenerationParams, stop: &[String]) {
    body["max_tokens"] = json!(params.max_new_tokens);
    body["temperature"] = json!(params.temperature);
    body["top_p"] = json!(params.top_p);
    body["frequency_penalty"] = json!(params.frequency_penalty);
    body["presence_penalty"] = json!(params.presence_penalty);
    if !stop.is_empty() {
        body["stop"] = json!(stop);
    }
}

/// Build a streaming chat-completions request body.
pub fn build_chat_body(
    model: &str,
    entries: &[PromptEntry],
    params: &GenerationParams,
    stop: &[String],
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": entries_to_wire_json(entries),
        "stream": true,
    });
    apply_generation_params(&mut body, params, stop);
    body
}

/// Build a streaming legacy-completions request body.
pub fn build_text_body(
    model: &str,
    prompt: &str,
    params: &GenerationParams,
    stop: &[String],
) -> Value {
    let mut body = json!({
        "model": model,
        "prompt": prompt,
        "stream": true,
    });
    apply_generation_params(&mut body, params, stop);
    body
}

// --- streaming chunk parsing ---

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct ChatStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextStreamChunk {
    choices: Vec<TextStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct TextStreamChoice {
    #[serde(default)]
    text: String,
}

/// Parse one chat-completions SSE data payload.
///
/// `[DONE]` ends the stream; role-only or empty chunks parse to `None`.
pub fn parse_chat_data(data: &str) -> Result<Option<CompletionChunk>> {
    if data.trim() == "[DONE]" {
        return Ok(Some(CompletionChunk::Done));
    }
    let chunk: ChatStreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .map(CompletionChunk::Delta))
}

/// Parse one legacy-completions SSE data payload.
pub fn parse_text_data(data: &str) -> Result<Option<CompletionChunk>> {
    if data.trim() == "[DONE]" {
        return Ok(Some(CompletionChunk::Done));
    }
    let chunk: TextStreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .map(|choice| CompletionChunk::Delta(choice.text)))
}
