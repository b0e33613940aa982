//! Folds a completion stream into its final text.

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_llm::{CompletionChunk, CompletionStream};

use crate::error::TurnError;
use crate::events::TurnEvent;

/// What a consumed stream produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    /// Concatenation of every delta observed, in arrival order.
    pub text: String,
    /// Whether the stream was cut short by cancellation.
    pub cancelled: bool,
}

/// Consume `stream` to completion, publishing one [`TurnEvent::Delta`] per
/// increment.
///
/// The stream is owned and dropped on every exit path, so the backend
/// connection is released exactly once whether the stream ends normally,
/// is cancelled, or fails. Cancellation is not an error: the text
/// accumulated so far is returned with the `cancelled` flag set, and the
/// caller decides whether to keep it. A stream error carries the partial
/// text in [`TurnError::Stream`].
pub async fn accumulate_stream(
    mut stream: CompletionStream,
    events: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, TurnError> {
    let mut text = String::new();

    loop {
        let next = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                log::debug!("stream cancelled after {} chars", text.len());
                return Ok(StreamOutcome {
                    text,
                    cancelled: true,
                });
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(CompletionChunk::Delta(delta))) => {
                text.push_str(&delta);
                let _ = events
                    .send(TurnEvent::Delta {
                        content: delta,
                        text: text.clone(),
                    })
                    .await;
            }
            Some(Ok(CompletionChunk::Done)) | None => break,
            Some(Err(error)) => {
                let _ = events
                    .send(TurnEvent::Error {
                        message: error.to_string(),
                    })
                    .await;
                return Err(TurnError::Stream {
                    source: error,
                    partial: text,
                });
            }
        }
    }

    Ok(StreamOutcome {
        text,
        cancelled: false,
    })
}

/// Collect a stream's full text without publishing events.
pub async fn collect_text(mut stream: CompletionStream) -> Result<String, TurnError> {
    let mut text = String::new();
    while let Some(next) = stream.next().await {
        match next {
            Ok(CompletionChunk::Delta(delta)) => text.push_str(&delta),
            Ok(CompletionChunk::Done) => break,
            Err(error) => {
                return Err(TurnError::Stream {
                    source: error,
                    partial: text,
                })
            }
        }
    }
    Ok(text)
}
