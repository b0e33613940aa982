//! chat_prompt - deterministic prompt rendering.
//!
//! Renders a branch's message sequence plus a persona into either a
//! structured entry list ("instruct" mode) or a flattened text block
//! ("chat" mode). Rendering is pure: for a fixed message sequence, persona
//! and options the output is byte-identical across calls.

mod refs;

pub use refs::resolve_references;

use chat_core::{AttachmentResolver, ChatMode, Message, Persona, Role, RoleNames};

/// One rendered prompt entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEntry {
    pub role: Role,
    pub content: String,
    pub display_name: String,
}

impl PromptEntry {
    fn new(role: Role, content: impl Into<String>, names: &RoleNames) -> Self {
        PromptEntry {
            role,
            content: content.into(),
            display_name: names.for_role(role).to_string(),
        }
    }
}

/// How chat-mode stop sequences spell the speaker prefix.
///
/// Historical documents used both spellings; the format is fixed here per
/// caller rather than inferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopFormat {
    /// `"Name: "` with a trailing space, matching the flattened transcript.
    #[default]
    NameColonSpace,
    /// `"Name:"` without the trailing space.
    NameColon,
}

/// Caller-side rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptOptions {
    /// Address the instruct prompt as `user` instead of `system`, for
    /// backends that reject the system role.
    pub system_as_user: bool,
    pub stop_format: StopFormat,
}

/// Chat-mode output: the flattened transcript, the prefix that primes the
/// assistant as next speaker, and the stop sequences for the three display
/// names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatText {
    pub text: String,
    pub speaker_prefix: String,
    pub stop: Vec<String>,
}

/// A fully rendered prompt, ready for the completion backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedPrompt {
    Instruct(Vec<PromptEntry>),
    Chat(ChatText),
}

/// Render `messages` with `persona` in the given mode.
pub fn assemble(
    messages: &[&Message],
    persona: &Persona,
    options: &PromptOptions,
    mode: ChatMode,
    attachments: &dyn AttachmentResolver,
) -> RenderedPrompt {
    match mode {
        ChatMode::Instruct => {
            RenderedPrompt::Instruct(assemble_instruct(messages, persona, options, attachments))
        }
        ChatMode::Chat => {
            RenderedPrompt::Chat(assemble_chat(messages, persona, options, attachments))
        }
    }
}

/// Render a structured entry list for chat-completion interfaces.
pub fn assemble_instruct(
    messages: &[&Message],
    persona: &Persona,
    options: &PromptOptions,
    attachments: &dyn AttachmentResolver,
) -> Vec<PromptEntry> {
    compose_entries(messages, persona, options, attachments)
}

/// Render a flattened text block for plain completion interfaces.
///
/// The transcript writes one `"{displayName}: {content}\n"` line per entry.
/// The caller appends [`ChatText::speaker_prefix`] to the transcript before
/// the completion call to prime the assistant as the next speaker.
pub fn assemble_chat(
    messages: &[&Message],
    persona: &Persona,
    options: &PromptOptions,
    attachments: &dyn AttachmentResolver,
) -> ChatText {
    let entries = compose_entries(messages, persona, options, attachments);
    let mut text = String::new();
    for entry in &entries {
        text.push_str(&entry.display_name);
        text.push_str(": ");
        text.push_str(&entry.content);
        text.push('\n');
    }
    ChatText {
        text,
        speaker_prefix: format!("{}:", persona.names.assistant),
        stop: stop_sequences(&persona.names, options.stop_format),
    }
}

/// Stop sequences derived from the three display names.
pub fn stop_sequences(names: &RoleNames, format: StopFormat) -> Vec<String> {
    let suffix = match format {
        StopFormat::NameColonSpace => ": ",
        StopFormat::NameColon => ":",
    };
    vec![
        format!("{}{}", names.user, suffix),
        format!("{}{}", names.assistant, suffix),
        format!("{}{}", names.system, suffix),
    ]
}

/// The shared rendering pipeline: resolve references, merge turns, prepend
/// persona entries, then enforce the trailing-turn rule.
fn compose_entries(
    messages: &[&Message],
    persona: &Persona,
    options: &PromptOptions,
    attachments: &dyn AttachmentResolver,
) -> Vec<PromptEntry> {
    let names = &persona.names;
    let mut entries: Vec<PromptEntry> = Vec::with_capacity(messages.len() + 3);

    for message in messages {
        // The backend may only attend to the final message of a turn; an
        // empty user turn keeps back-to-back assistant messages visible.
        if message.role == Role::Assistant
            && entries.last().map(|e| e.role) == Some(Role::Assistant)
        {
            entries.push(PromptEntry::new(Role::User, "", names));
        }
        let content = resolve_references(&message.content, attachments).into_owned();
        entries.push(PromptEntry::new(message.role, content, names));
    }

    if !persona.greeting.is_empty() {
        entries.insert(0, PromptEntry::new(Role::Assistant, persona.greeting.clone(), names));
    }
    if !persona.instruct_prompt.is_empty() {
        let role = if options.system_as_user {
            Role::User
        } else {
            Role::System
        };
        entries.insert(0, PromptEntry::new(role, persona.instruct_prompt.clone(), names));
    }

    // The backend answers as the assistant, so the prompt must end on a
    // non-assistant turn.
    if entries.last().map(|e| e.role) == Some(Role::Assistant) {
        entries.push(PromptEntry::new(Role::User, "", names));
    }

    entries
}
