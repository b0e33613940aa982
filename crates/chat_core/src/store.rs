//! MessageStore - id-keyed storage for message records.

use std::collections::HashMap;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::ids::random_hex_id;
use crate::message::{Message, MessageId, Role};

/// Length of generated message ids, in hex characters.
const MESSAGE_ID_LEN: u32 = 8;

/// Holds every message record of a conversation, keyed by id.
///
/// The store has no notion of order; ordered views belong to the branch
/// tree. It serializes as a bare id-to-record map, with each record's id
/// restored from its key on load.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: HashMap<MessageId, Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.contains_key(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.get(id)
    }

    pub fn get_mut(&mut self, id: &MessageId) -> Option<&mut Message> {
        self.messages.get_mut(id)
    }

    /// Create a record with a fresh id and no branch memberships yet.
    ///
    /// Membership is established by the branch tree when the record is
    /// appended or copied into a branch.
    pub fn insert(&mut self, role: Role, content: impl Into<String>) -> MessageId {
        let id = self.allocate_id();
        self.messages
            .insert(id.clone(), Message::new(id.clone(), role, content));
        id
    }

    /// Remove and return a record. The caller is responsible for clearing
    /// it out of any branch sequences first.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        self.messages.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.values()
    }

    fn allocate_id(&self) -> MessageId {
        loop {
            let id = MessageId::from(random_hex_id(MESSAGE_ID_LEN));
            if !self.messages.contains_key(&id) {
                return id;
            }
        }
    }
}

impl Serialize for MessageStore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.messages.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let mut messages = HashMap::<MessageId, Message>::deserialize(deserializer)?;
        for (id, message) in messages.iter_mut() {
            message.id = id.clone();
        }
        Ok(MessageStore { messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_allocates_eight_hex_ids() {
        let mut store = MessageStore::new();
        let id = store.insert(Role::User, "hello");
        assert_eq!(id.as_str().len(), 8);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(store.get(&id).unwrap().content, "hello");
        assert!(store.get(&id).unwrap().branches.is_empty());
    }

    #[test]
    fn remove_returns_the_record() {
        let mut store = MessageStore::new();
        let id = store.insert(Role::Assistant, "bye");
        let removed = store.remove(&id).unwrap();
        assert_eq!(removed.content, "bye");
        assert!(!store.contains(&id));
        assert!(store.remove(&id).is_none());
    }

    #[test]
    fn ids_restored_from_map_keys_on_load() {
        let json = r#"{
            "aaaa0001": {"role": "user", "content": "hi", "branches": [0]},
            "aaaa0002": {"role": "assistant", "content": "hello", "branches": [0]}
        }"#;
        let store: MessageStore = serde_json::from_str(json).unwrap();
        assert_eq!(store.len(), 2);
        let first = store.get(&"aaaa0001".into()).unwrap();
        assert_eq!(first.id, "aaaa0001".into());
        assert_eq!(first.content, "hi");
    }
}
