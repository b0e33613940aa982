//! Application configuration document.

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

/// `config.json` at the data root.
///
/// The capitalized field names are the document's wire spelling and must
/// stay as written; documents produced by older revisions load unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Address the instruct prompt as `user` instead of `system`.
    #[serde(rename = "isUserInstruct", default)]
    pub is_user_instruct: bool,

    #[serde(rename = "OpenAIEndpoint")]
    pub endpoint: String,

    #[serde(rename = "OpenAIKey")]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            is_user_instruct: false,
            endpoint: std::env::var("OPEN_AI_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:8000/v1".to_string()),
            api_key: std::env::var("OPEN_AI_KEY")
                .unwrap_or_else(|_| "sk-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx".to_string()),
            model: default_model(),
        }
    }
}
