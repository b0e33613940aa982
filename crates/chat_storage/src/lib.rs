//! chat_storage - JSON documents on disk.
//!
//! One data directory holds everything:
//!
//! ```text
//! chats/chat-{id}.json        conversation documents
//! chats/index.json            id -> description
//! characters/char-{id}.json   persona documents
//! characters/index.json       id -> display name
//! config.json                 application configuration
//! ```
//!
//! Documents are plain serde_json files; this layer adds paths, indexes
//! and defaults, nothing else.

mod config;

pub use config::AppConfig;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chat_core::{random_hex_id, Conversation, Persona};
use tokio::fs;

/// Length of conversation and character ids, in hex characters.
const DOCUMENT_ID_LEN: u32 = 5;

#[derive(Debug, Clone)]
pub struct ChatStorage {
    base_path: PathBuf,
}

impl ChatStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub async fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.base_path.join("chats")).await?;
        fs::create_dir_all(self.base_path.join("characters")).await
    }

    // --- conversations ---

    pub async fn save_conversation(
        &self,
        id: &str,
        conversation: &Conversation,
    ) -> std::io::Result<()> {
        let json = serde_json::to_string(conversation)?;
        fs::write(self.conversation_path(id), json).await
    }

    /// Load and structurally validate a conversation document.
    pub async fn load_conversation(&self, id: &str) -> std::io::Result<Option<Conversation>> {
        let path = self.conversation_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).await?;
        let conversation: Conversation = serde_json::from_str(&content)?;
        conversation
            .verify()
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        Ok(Some(conversation))
    }

    /// Create a conversation document and register it in the index.
    ///
    /// Returns the allocated id. When `first_message` is given the root
    /// branch is seeded with it as a user message.
    pub async fn create_conversation(
        &self,
        character: &str,
        description: &str,
        first_message: Option<&str>,
    ) -> std::io::Result<String> {
        let mut index = self.load_chat_index().await?;
        let id = loop {
            let candidate = random_hex_id(DOCUMENT_ID_LEN);
            if !index.contains_key(&candidate) && !self.conversation_path(&candidate).exists() {
                break candidate;
            }
        };

        let conversation = match first_message {
            Some(content) => Conversation::with_first_message(character, content),
            None => Conversation::new(character),
        };
        self.save_conversation(&id, &conversation).await?;

        index.insert(id.clone(), description.to_string());
        self.save_chat_index(&index).await?;

        log::info!("created conversation {} for character {}", id, character);
        Ok(id)
    }

    /// Delete a conversation document and its index entry. Returns whether
    /// the document existed.
    pub async fn delete_conversation(&self, id: &str) -> std::io::Result<bool> {
        let deleted = remove_if_present(&self.conversation_path(id)).await?;

        let mut index = self.load_chat_index().await?;
        if index.remove(id).is_some() {
            self.save_chat_index(&index).await?;
        }

        Ok(deleted)
    }

    /// The chat index: id -> description. Missing file reads as empty.
    pub async fn load_chat_index(&self) -> std::io::Result<BTreeMap<String, String>> {
        load_index(&self.chat_index_path()).await
    }

    pub async fn save_chat_index(
        &self,
        index: &BTreeMap<String, String>,
    ) -> std::io::Result<()> {
        let json = serde_json::to_string(index)?;
        fs::write(self.chat_index_path(), json).await
    }

    // --- characters ---

    pub async fn save_character(&self, id: &str, persona: &Persona) -> std::io::Result<()> {
        let json = serde_json::to_string(persona)?;
        fs::write(self.character_path(id), json).await
    }

    pub async fn load_character(&self, id: &str) -> std::io::Result<Option<Persona>> {
        let path = self.character_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Create a character document and register its display name in the
    /// index. Returns the allocated id.
    pub async fn create_character(&self, persona: &Persona) -> std::io::Result<String> {
        let mut index = self.load_character_index().await?;
        let id = loop {
            let candidate = random_hex_id(DOCUMENT_ID_LEN);
            if !index.contains_key(&candidate) && !self.character_path(&candidate).exists() {
                break candidate;
            }
        };

        self.save_character(&id, persona).await?;
        index.insert(id.clone(), persona.name.clone());
        self.save_character_index(&index).await?;

        log::info!("created character {} ({})", id, persona.name);
        Ok(id)
    }

    pub async fn delete_character(&self, id: &str) -> std::io::Result<bool> {
        let deleted = remove_if_present(&self.character_path(id)).await?;

        let mut index = self.load_character_index().await?;
        if index.remove(id).is_some() {
            self.save_character_index(&index).await?;
        }

        Ok(deleted)
    }

    /// The character index: id -> display name. Missing file reads as
    /// empty.
    pub async fn load_character_index(&self) -> std::io::Result<BTreeMap<String, String>> {
        load_index(&self.character_index_path()).await
    }

    pub async fn save_character_index(
        &self,
        index: &BTreeMap<String, String>,
    ) -> std::io::Result<()> {
        let json = serde_json::to_string(index)?;
        fs::write(self.character_index_path(), json).await
    }

    // --- config ---

    /// Load `config.json`, writing the defaults first if it is missing so
    /// the user has a file to edit.
    pub async fn load_config(&self) -> std::io::Result<AppConfig> {
        let path = self.config_path();
        if !path.exists() {
            let config = AppConfig::default();
            self.save_config(&config).await?;
            log::info!("wrote default config to {}", path.display());
            return Ok(config);
        }
        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save_config(&self, config: &AppConfig) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(config)?;
        fs::write(self.config_path(), json).await
    }

    // --- paths ---

    fn conversation_path(&self, id: &str) -> PathBuf {
        self.base_path.join("chats").join(format!("chat-{}.json", id))
    }

    fn chat_index_path(&self) -> PathBuf {
        self.base_path.join("chats").join("index.json")
    }

    fn character_path(&self, id: &str) -> PathBuf {
        self.base_path
            .join("characters")
            .join(format!("char-{}.json", id))
    }

    fn character_index_path(&self) -> PathBuf {
        self.base_path.join("characters").join("index.json")
    }

    fn config_path(&self) -> PathBuf {
        self.base_path.join("config.json")
    }
}

async fn load_index(path: &Path) -> std::io::Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

async fn remove_if_present(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::{BranchId, Role};
    use tempfile::TempDir;

    async fn temp_storage() -> (ChatStorage, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let storage = ChatStorage::new(dir.path());
        storage.init().await.expect("init");
        (storage, dir)
    }

    #[tokio::test]
    async fn conversations_round_trip() {
        let (storage, _dir) = temp_storage().await;

        let mut conversation = Conversation::with_first_message("ch1", "hello");
        conversation
            .post_message(BranchId::ROOT, Role::Assistant, "hi")
            .unwrap();

        storage
            .save_conversation("abc12", &conversation)
            .await
            .expect("save");
        let loaded = storage
            .load_conversation("abc12")
            .await
            .expect("load")
            .expect("present");

        assert_eq!(loaded.character, "ch1");
        assert_eq!(loaded.branch_messages(BranchId::ROOT).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn loading_a_missing_conversation_gives_none() {
        let (storage, _dir) = temp_storage().await;
        assert!(storage
            .load_conversation("zzzzz")
            .await
            .expect("load")
            .is_none());
    }

    #[tokio::test]
    async fn corrupt_documents_fail_to_load() {
        let (storage, dir) = temp_storage().await;

        // Branch lists a message the store does not hold.
        let bad = r#"{"character": "c", "messages": {}, "branches": [{"messages": ["deadbeef"]}]}"#;
        tokio::fs::write(dir.path().join("chats").join("chat-bad01.json"), bad)
            .await
            .expect("write");

        let err = storage.load_conversation("bad01").await.expect_err("load");
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn create_conversation_seeds_and_indexes() {
        let (storage, _dir) = temp_storage().await;

        let id = storage
            .create_conversation("ch1", "First chat", Some("hello there"))
            .await
            .expect("create");
        assert_eq!(id.len(), 5);

        let conversation = storage
            .load_conversation(&id)
            .await
            .expect("load")
            .expect("present");
        let messages = conversation.branch_messages(BranchId::ROOT).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello there");
        assert_eq!(messages[0].role, Role::User);

        let index = storage.load_chat_index().await.expect("index");
        assert_eq!(index.get(&id).map(String::as_str), Some("First chat"));
    }

    #[tokio::test]
    async fn delete_conversation_clears_document_and_index() {
        let (storage, _dir) = temp_storage().await;

        let id = storage
            .create_conversation("ch1", "bye", None)
            .await
            .expect("create");

        assert!(storage.delete_conversation(&id).await.expect("delete"));
        assert!(storage
            .load_conversation(&id)
            .await
            .expect("load")
            .is_none());
        assert!(storage.load_chat_index().await.expect("index").is_empty());

        assert!(!storage.delete_conversation(&id).await.expect("again"));
    }

    #[tokio::test]
    async fn characters_round_trip_with_index() {
        let (storage, _dir) = temp_storage().await;

        let persona = Persona::new("Ann").with_greeting("Hi!");
        let id = storage.create_character(&persona).await.expect("create");

        let loaded = storage
            .load_character(&id)
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded.name, "Ann");
        assert_eq!(loaded.greeting, "Hi!");

        let index = storage.load_character_index().await.expect("index");
        assert_eq!(index.get(&id).map(String::as_str), Some("Ann"));

        assert!(storage.delete_character(&id).await.expect("delete"));
        assert!(storage.load_character(&id).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn missing_config_is_written_with_defaults() {
        let (storage, dir) = temp_storage().await;

        let config = storage.load_config().await.expect("config");
        assert!(!config.is_user_instruct);
        assert_eq!(config.model, "gpt-3.5-turbo");
        assert!(dir.path().join("config.json").exists());

        // Second load reads the file it just wrote.
        let again = storage.load_config().await.expect("config");
        assert_eq!(again, config);
    }
}
