//! Shared SSE -> [`CompletionStream`] adapter.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;

use crate::backend::{CompletionChunk, CompletionStream, LLMError, Result};

/// Convert an SSE HTTP [`Response`] into a [`CompletionStream`].
///
/// `handler` receives each SSE data payload and can either:
/// - return `Ok(Some(chunk))` to emit a chunk
/// - return `Ok(None)` to skip the event
/// - return `Err(_)` to emit a stream error
pub fn completion_stream_from_sse<H>(response: Response, mut handler: H) -> CompletionStream
where
    H: FnMut(&str) -> Result<Option<CompletionChunk>> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| {
            let event = event.map_err(|e| LLMError::Stream(e.to_string()))?;
            handler(event.data.as_str())
        })
        .filter_map(|result| async move {
            match result {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            }
        });

    Box::pin(stream)
}
