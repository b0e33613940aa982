//! Short title generation for conversations.

use chat_core::{GenerationParams, Persona, Role};
use chat_llm::CompletionBackend;
use chat_prompt::{PromptEntry, PromptOptions};

use crate::accumulator::collect_text;
use crate::error::TurnError;

const TITLE_INSTRUCTION: &str = "You are a helpful AI that generates titles for chats. \
Keep the title short and to the point. Respond only with the title. \
Do not include the chat itself in the response. \
You will receive a single message as input.";

/// Maximum tokens spent on a title.
const TITLE_MAX_TOKENS: u32 = 50;

/// Ask the backend for a one-line title describing `message`.
///
/// Uses a fixed instruction with the persona's parameters overridden for a
/// short bounded reply; generation stops at the first newline.
pub async fn describe(
    backend: &dyn CompletionBackend,
    persona: &Persona,
    options: &PromptOptions,
    message: &str,
) -> Result<String, TurnError> {
    let role = if options.system_as_user {
        Role::User
    } else {
        Role::System
    };
    let entries = vec![
        PromptEntry {
            role,
            content: TITLE_INSTRUCTION.to_string(),
            display_name: persona.names.for_role(role).to_string(),
        },
        PromptEntry {
            role: Role::User,
            content: format!("Write a title for the following chat: {message}"),
            display_name: persona.names.user.clone(),
        },
    ];

    let params = GenerationParams {
        max_new_tokens: TITLE_MAX_TOKENS,
        ..persona.generation_params.clone()
    };
    let stop = vec!["\n".to_string()];

    let stream = backend.chat_stream(&entries, &params, &stop).await?;
    let title = collect_text(stream).await?;
    Ok(title.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::stream;

    use chat_llm::{CompletionChunk, CompletionStream};

    use super::*;

    struct TitleBackend {
        seen: Mutex<Option<(Vec<(Role, String)>, GenerationParams, Vec<String>)>>,
    }

    #[async_trait]
    impl CompletionBackend for TitleBackend {
        async fn chat_stream(
            &self,
            entries: &[PromptEntry],
            params: &GenerationParams,
            stop: &[String],
        ) -> chat_llm::Result<CompletionStream> {
            *self.seen.lock().unwrap() = Some((
                entries.iter().map(|e| (e.role, e.content.clone())).collect(),
                params.clone(),
                stop.to_vec(),
            ));
            Ok(Box::pin(stream::iter(vec![
                Ok(CompletionChunk::Delta("Arithmetic ".to_string())),
                Ok(CompletionChunk::Delta("help".to_string())),
            ])))
        }

        async fn text_stream(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
            _stop: &[String],
        ) -> chat_llm::Result<CompletionStream> {
            unreachable!("describe only uses the structured interface")
        }
    }

    #[tokio::test]
    async fn describe_returns_a_trimmed_title() {
        let backend = TitleBackend {
            seen: Mutex::new(None),
        };
        let persona = Persona::new("Terse");

        let title = describe(&backend, &persona, &PromptOptions::default(), "2+2?")
            .await
            .expect("title");
        assert_eq!(title, "Arithmetic help");

        let (entries, params, stop) = backend.seen.lock().unwrap().take().unwrap();
        assert_eq!(entries[0].0, Role::System);
        assert_eq!(
            entries[1].1,
            "Write a title for the following chat: 2+2?"
        );
        assert_eq!(params.max_new_tokens, 50);
        assert_eq!(stop, vec!["\n".to_string()]);
    }

    #[tokio::test]
    async fn describe_honors_the_system_as_user_flag() {
        let backend = TitleBackend {
            seen: Mutex::new(None),
        };
        let persona = Persona::new("Terse");
        let options = PromptOptions {
            system_as_user: true,
            ..PromptOptions::default()
        };

        describe(&backend, &persona, &options, "hello")
            .await
            .expect("title");

        let (entries, _, _) = backend.seen.lock().unwrap().take().unwrap();
        assert_eq!(entries[0].0, Role::User);
    }
}
