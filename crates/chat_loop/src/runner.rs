//! Turn orchestration: render, stream, commit.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chat_core::{BranchId, ChatMode, Conversation, MessageId, Persona, Role};
use chat_llm::CompletionBackend;
use chat_prompt::{assemble_chat, assemble_instruct, PromptOptions};

use crate::accumulator::accumulate_stream;
use crate::error::TurnError;
use crate::events::TurnEvent;

/// Run one assistant turn on `branch`.
///
/// The branch renders according to the persona's chat type. The accumulated
/// text is committed as a new assistant message on the same branch, also
/// when the stream was cancelled (partial replies are preserved) or when it
/// produced nothing (every turn owns exactly one message, even an empty
/// one). Stream failures commit nothing and carry the partial text in the
/// error.
pub async fn run_turn(
    conversation: &mut Conversation,
    persona: &Persona,
    options: &PromptOptions,
    backend: &dyn CompletionBackend,
    branch: BranchId,
    events: &mpsc::Sender<TurnEvent>,
    cancel: &CancellationToken,
) -> Result<MessageId, TurnError> {
    let params = &persona.generation_params;

    let stream = {
        let snapshot: &Conversation = conversation;
        let messages = snapshot.branch_messages(branch)?;
        match persona.chat_type {
            ChatMode::Instruct => {
                let entries = assemble_instruct(&messages, persona, options, snapshot);
                backend.chat_stream(&entries, params, &[]).await?
            }
            ChatMode::Chat => {
                let rendered = assemble_chat(&messages, persona, options, snapshot);
                let prompt = format!("{}{}", rendered.text, rendered.speaker_prefix);
                backend.text_stream(&prompt, params, &rendered.stop).await?
            }
        }
    };

    let outcome = accumulate_stream(stream, events, cancel).await?;

    let message = conversation.post_message(branch, Role::Assistant, outcome.text.clone())?;
    log::debug!(
        "committed turn {} on branch {} ({} chars{})",
        message,
        branch,
        outcome.text.len(),
        if outcome.cancelled { ", cancelled" } else { "" }
    );
    let _ = events
        .send(TurnEvent::Complete {
            message: message.clone(),
            branch,
            text: outcome.text,
        })
        .await;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use chat_core::GenerationParams;
    use chat_llm::{CompletionChunk, CompletionStream, LLMError};
    use chat_prompt::PromptEntry;

    use super::*;

    /// Replays canned chunks and records what it was asked for.
    struct CannedBackend {
        chunks: Vec<CompletionChunk>,
        fail_after: Option<usize>,
        seen_entries: Mutex<Vec<Vec<(Role, String)>>>,
        seen_prompts: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CannedBackend {
        fn new(chunks: Vec<CompletionChunk>) -> Self {
            CannedBackend {
                chunks,
                fail_after: None,
                seen_entries: Mutex::new(Vec::new()),
                seen_prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing_after(mut self, n: usize) -> Self {
            self.fail_after = Some(n);
            self
        }

        fn build(&self) -> CompletionStream {
            let mut items: Vec<chat_llm::Result<CompletionChunk>> =
                self.chunks.iter().cloned().map(Ok).collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(LLMError::Stream("interrupted".to_string())));
            }
            Box::pin(stream::iter(items))
        }
    }

    #[async_trait]
    impl CompletionBackend for CannedBackend {
        async fn chat_stream(
            &self,
            entries: &[PromptEntry],
            _params: &GenerationParams,
            _stop: &[String],
        ) -> chat_llm::Result<CompletionStream> {
            self.seen_entries.lock().unwrap().push(
                entries
                    .iter()
                    .map(|e| (e.role, e.content.clone()))
                    .collect(),
            );
            Ok(self.build())
        }

        async fn text_stream(
            &self,
            prompt: &str,
            _params: &GenerationParams,
            stop: &[String],
        ) -> chat_llm::Result<CompletionStream> {
            self.seen_prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), stop.to_vec()));
            Ok(self.build())
        }
    }

    fn persona() -> Persona {
        Persona::new("Terse").with_instruct_prompt("Be terse.")
    }

    fn deltas(parts: &[&str]) -> Vec<CompletionChunk> {
        parts
            .iter()
            .map(|p| CompletionChunk::Delta(p.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn commits_the_accumulated_reply() {
        let mut conversation = Conversation::with_first_message("c", "2+2?");
        let backend = CannedBackend::new(deltas(&["It is", " 4."]));
        let (tx, mut rx) = mpsc::channel(8);

        let id = run_turn(
            &mut conversation,
            &persona(),
            &PromptOptions::default(),
            &backend,
            BranchId::ROOT,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .expect("turn");
        drop(tx);

        let committed = conversation.messages.get(&id).unwrap();
        assert_eq!(committed.content, "It is 4.");
        assert_eq!(committed.role, Role::Assistant);
        assert!(committed.is_on(BranchId::ROOT));

        // Delta events then the completion notice.
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events[0], TurnEvent::Delta { .. }));
        assert!(matches!(events.last(), Some(TurnEvent::Complete { .. })));
    }

    #[tokio::test]
    async fn instruct_mode_sends_structured_entries() {
        let mut conversation = Conversation::with_first_message("c", "2+2?");
        let backend = CannedBackend::new(deltas(&["4"]));
        let (tx, _rx) = mpsc::channel(8);

        run_turn(
            &mut conversation,
            &persona(),
            &PromptOptions::default(),
            &backend,
            BranchId::ROOT,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .expect("turn");

        let seen = backend.seen_entries.lock().unwrap();
        assert_eq!(
            seen[0],
            vec![
                (Role::System, "Be terse.".to_string()),
                (Role::User, "2+2?".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn chat_mode_sends_primed_prompt_and_stops() {
        let mut conversation = Conversation::with_first_message("c", "2+2?");
        let persona = persona().with_chat_type(ChatMode::Chat);
        let backend = CannedBackend::new(deltas(&["4"]));
        let (tx, _rx) = mpsc::channel(8);

        run_turn(
            &mut conversation,
            &persona,
            &PromptOptions::default(),
            &backend,
            BranchId::ROOT,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .expect("turn");

        let seen = backend.seen_prompts.lock().unwrap();
        let (prompt, stop) = &seen[0];
        assert!(prompt.ends_with("assistant:"));
        assert!(prompt.contains("user: 2+2?\n"));
        assert_eq!(stop[0], "user: ");
    }

    #[tokio::test]
    async fn empty_streams_still_commit_a_message() {
        let mut conversation = Conversation::with_first_message("c", "hello");
        let backend = CannedBackend::new(Vec::new());
        let (tx, _rx) = mpsc::channel(8);

        let id = run_turn(
            &mut conversation,
            &persona(),
            &PromptOptions::default(),
            &backend,
            BranchId::ROOT,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .expect("turn");

        assert_eq!(conversation.messages.get(&id).unwrap().content, "");
        assert_eq!(conversation.branch_messages(BranchId::ROOT).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelled_turns_still_commit_a_message() {
        let mut conversation = Conversation::with_first_message("c", "hello");
        let backend = CannedBackend::new(deltas(&["partial"]));
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let id = run_turn(
            &mut conversation,
            &persona(),
            &PromptOptions::default(),
            &backend,
            BranchId::ROOT,
            &tx,
            &cancel,
        )
        .await
        .expect("cancelled turns still commit");

        // With the token already set, nothing is consumed; the committed
        // message is the empty partial.
        assert_eq!(conversation.messages.get(&id).unwrap().content, "");
    }

    #[tokio::test]
    async fn stream_failures_commit_nothing() {
        let mut conversation = Conversation::with_first_message("c", "hello");
        let backend = CannedBackend::new(deltas(&["par", "never"])).failing_after(1);
        let (tx, _rx) = mpsc::channel(8);

        let err = run_turn(
            &mut conversation,
            &persona(),
            &PromptOptions::default(),
            &backend,
            BranchId::ROOT,
            &tx,
            &CancellationToken::new(),
        )
        .await
        .expect_err("turn should fail");

        match err {
            TurnError::Stream { partial, .. } => assert_eq!(partial, "par"),
            other => panic!("expected TurnError::Stream, got: {other:?}"),
        }
        // Only the original user message remains on the branch.
        assert_eq!(conversation.branch_messages(BranchId::ROOT).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_branch_is_a_chat_error() {
        let mut conversation = Conversation::with_first_message("c", "hello");
        let backend = CannedBackend::new(deltas(&["4"]));
        let (tx, _rx) = mpsc::channel(8);

        let err = run_turn(
            &mut conversation,
            &persona(),
            &PromptOptions::default(),
            &backend,
            BranchId(7),
            &tx,
            &CancellationToken::new(),
        )
        .await
        .expect_err("missing branch");
        assert!(matches!(err, TurnError::Chat(_)));
    }
}
