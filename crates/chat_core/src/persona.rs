//! Persona - character definitions shaping prompt rendering.

use serde::{Deserialize, Serialize};

use crate::message::Role;

/// How a persona's prompt is rendered for the backend.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Structured message list for chat-completion interfaces.
    #[default]
    Instruct,
    /// Single flattened text block for plain completion interfaces.
    Chat,
}

/// Display names for the three speaker roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleNames {
    pub system: String,
    pub assistant: String,
    pub user: String,
}

impl Default for RoleNames {
    fn default() -> Self {
        RoleNames {
            system: "system".to_string(),
            assistant: "assistant".to_string(),
            user: "user".to_string(),
        }
    }
}

impl RoleNames {
    pub fn for_role(&self, role: Role) -> &str {
        match role {
            Role::System => &self.system,
            Role::Assistant => &self.assistant,
            Role::User => &self.user,
        }
    }
}

/// Generation parameters forwarded verbatim to the completion backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        GenerationParams {
            max_new_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            frequency_penalty: 0.1,
            presence_penalty: 0.0,
        }
    }
}

/// A character: prompt text, greeting and role naming, plus the generation
/// parameters its conversations run with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub name: String,
    /// The instruction text rendered as the leading system message.
    #[serde(default)]
    pub instruct_prompt: String,
    /// Assistant opener rendered before the first stored message.
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub chat_type: ChatMode,
    #[serde(default)]
    pub names: RoleNames,
    #[serde(default)]
    pub generation_params: GenerationParams,
}

impl Persona {
    pub fn new(name: impl Into<String>) -> Self {
        Persona {
            name: name.into(),
            instruct_prompt: String::new(),
            greeting: String::new(),
            chat_type: ChatMode::default(),
            names: RoleNames::default(),
            generation_params: GenerationParams::default(),
        }
    }

    pub fn with_instruct_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.instruct_prompt = prompt.into();
        self
    }

    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    pub fn with_chat_type(mut self, mode: ChatMode) -> Self {
        self.chat_type = mode;
        self
    }

    pub fn with_names(mut self, names: RoleNames) -> Self {
        self.names = names;
        self
    }

    pub fn with_generation_params(mut self, params: GenerationParams) -> Self {
        self.generation_params = params;
        self
    }
}
