use async_trait::async_trait;
use chat_core::GenerationParams;
use chat_prompt::PromptEntry;
use reqwest::Client;
use serde_json::Value;

use crate::backend::{CompletionBackend, CompletionChunk, CompletionStream, LLMError, Result};
use crate::sse::completion_stream_from_sse;
use crate::wire::{build_chat_body, build_text_body, parse_chat_data, parse_text_data};

/// Client for OpenAI-compatible completion servers.
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "http://localhost:8000/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn post_stream(&self, path: &str, body: Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            return Err(LLMError::Api(format!("HTTP {}: {}", status, text)));
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn chat_stream(
        &self,
        entries: &[PromptEntry],
        params: &GenerationParams,
        stop: &[String],
    ) -> Result<CompletionStream> {
        log::debug!("requesting chat completion with {} entries", entries.len());
        let body = build_chat_body(&self.model, entries, params, stop);
        let response = self.post_stream("/chat/completions", body).await?;

        Ok(completion_stream_from_sse(response, |data| {
            if data.trim().is_empty() {
                return Ok(None);
            }
            match parse_chat_data(data)? {
                // The connection close ends the stream; the marker itself
                // is not surfaced.
                Some(CompletionChunk::Done) => Ok(None),
                other => Ok(other),
            }
        }))
    }

    async fn text_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
        stop: &[String],
    ) -> Result<CompletionStream> {
        log::debug!("requesting text completion ({} prompt chars)", prompt.len());
        let body = build_text_body(&self.model, prompt, params, stop);
        let response = self.post_stream("/completions", body).await?;

        Ok(completion_stream_from_sse(response, |data| {
            if data.trim().is_empty() {
                return Ok(None);
            }
            match parse_text_data(data)? {
                Some(CompletionChunk::Done) => Ok(None),
                other => Ok(other),
            }
        }))
    }
}
