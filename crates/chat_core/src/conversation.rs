//! Conversation - the aggregate owning one store and one branch tree.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::attachment::{Attachment, AttachmentResolver};
use crate::branch::{BranchId, BranchTree};
use crate::error::ChatError;
use crate::ids::random_hex_id;
use crate::message::{Message, MessageId, Role};
use crate::store::MessageStore;

/// Length of attachment source ids, in hex characters.
const ATTACHMENT_ID_LEN: u32 = 8;

/// A branching conversation bound to one persona by id.
///
/// Serializes to the on-disk document shape:
/// `{ "character": ..., "messages": {...}, "branches": [...], "files": {...} }`
/// with `files` omitted while empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Id of the persona this conversation renders with.
    pub character: String,
    pub messages: MessageStore,
    pub branches: BranchTree,
    /// Attachments, keyed `"{index}/{sourceId}"`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<String, Attachment>,
}

impl Conversation {
    /// Create an empty conversation: one root branch, no messages.
    pub fn new(character: impl Into<String>) -> Self {
        Conversation {
            character: character.into(),
            messages: MessageStore::new(),
            branches: BranchTree::new(),
            files: BTreeMap::new(),
        }
    }

    /// Create a conversation whose root branch is seeded with one user
    /// message.
    pub fn with_first_message(character: impl Into<String>, content: impl Into<String>) -> Self {
        let mut conversation = Conversation::new(character);
        // The root branch always exists, so seeding cannot fail.
        let _ = conversation.post_message(BranchId::ROOT, Role::User, content);
        conversation
    }

    /// Store a new message and append it to `branch`.
    ///
    /// On return the record's memberships are exactly `{branch}`.
    pub fn post_message(
        &mut self,
        branch: BranchId,
        role: Role,
        content: impl Into<String>,
    ) -> Result<MessageId, ChatError> {
        self.branches.branch(branch)?;
        let id = self.messages.insert(role, content);
        self.branches.append(&mut self.messages, branch, &id)?;
        Ok(id)
    }

    /// Replace a message's content wholesale. Memberships and fork points
    /// are untouched.
    pub fn replace_content(
        &mut self,
        id: &MessageId,
        content: impl Into<String>,
    ) -> Result<(), ChatError> {
        let record = self
            .messages
            .get_mut(id)
            .ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
        record.content = content.into();
        Ok(())
    }

    /// Fork `source` at message `at`; see [`BranchTree::fork`].
    pub fn fork_at(&mut self, source: BranchId, at: &MessageId) -> Result<BranchId, ChatError> {
        self.branches.fork(&mut self.messages, source, at)
    }

    /// Remove a message from the store and from every branch sequence that
    /// contains it, in one pass over its recorded memberships.
    pub fn delete_message(&mut self, id: &MessageId) -> Result<Message, ChatError> {
        let record = self
            .messages
            .remove(id)
            .ok_or_else(|| ChatError::MessageNotFound(id.clone()))?;
        for branch in &record.branches {
            self.branches.remove_from(*branch, id);
        }
        log::debug!("deleted message {} from {} branches", id, record.branches.len());
        Ok(record)
    }

    /// Messages of `branch`, in sequence order.
    pub fn branch_messages(&self, branch: BranchId) -> Result<Vec<&Message>, ChatError> {
        self.branches
            .branch(branch)?
            .messages
            .iter()
            .map(|id| {
                self.messages
                    .get(id)
                    .ok_or_else(|| ChatError::MessageNotFound(id.clone()))
            })
            .collect()
    }

    /// Attach a document and return its generated source id.
    pub fn attach(&mut self, name: impl Into<String>, content: impl Into<String>) -> String {
        let index = self
            .files
            .keys()
            .filter_map(|key| key.split_once('/')?.0.parse::<u64>().ok())
            .max()
            .map_or(0, |i| i + 1);
        let source = loop {
            let candidate = random_hex_id(ATTACHMENT_ID_LEN);
            if self.attachment_text(&candidate).is_none() {
                break candidate;
            }
        };
        self.files
            .insert(format!("{}/{}", index, source), Attachment::new(name, content));
        source
    }

    /// Remove the attachment with the given source id. References to it in
    /// message content are left as-is and stop resolving.
    pub fn detach(&mut self, source_id: &str) -> Option<Attachment> {
        let key = self
            .files
            .keys()
            .find(|key| key_source(key) == Some(source_id))?
            .clone();
        self.files.remove(&key)
    }

    /// Check the structural invariants: the branch forest terminates at
    /// the root with ordered source links, and branch sequences and record
    /// memberships mirror each other exactly.
    ///
    /// Run against freshly loaded documents; in-process mutation preserves
    /// these invariants by construction.
    pub fn verify(&self) -> Result<(), ChatError> {
        if self.branches.is_empty() {
            return Err(ChatError::InvalidState("no root branch".to_string()));
        }

        for id in self.branches.ids() {
            let branch = self.branches.branch(id)?;
            match branch.source {
                None if id != BranchId::ROOT => {
                    return Err(ChatError::InvalidState(format!(
                        "branch {} has no source",
                        id
                    )));
                }
                Some(_) if id == BranchId::ROOT => {
                    return Err(ChatError::InvalidState(
                        "root branch has a source".to_string(),
                    ));
                }
                Some(source) => {
                    if source >= id {
                        return Err(ChatError::InvalidState(format!(
                            "branch {} sources later branch {}",
                            id, source
                        )));
                    }
                    if self.branches.get(source).is_none() {
                        return Err(ChatError::BranchNotFound(source));
                    }
                }
                None => {}
            }

            let mut seen = HashSet::new();
            for message in &branch.messages {
                if !seen.insert(message) {
                    return Err(ChatError::InvalidState(format!(
                        "message {} appears twice on branch {}",
                        message, id
                    )));
                }
                let record = self
                    .messages
                    .get(message)
                    .ok_or_else(|| ChatError::MessageNotFound(message.clone()))?;
                if !record.is_on(id) {
                    return Err(ChatError::InvalidState(format!(
                        "message {} does not list branch {}",
                        message, id
                    )));
                }
            }
        }

        for record in self.messages.iter() {
            for branch in &record.branches {
                let sequence = self.branches.branch(*branch)?;
                if !sequence.messages.contains(&record.id) {
                    return Err(ChatError::InvalidState(format!(
                        "branch {} does not contain member message {}",
                        branch, record.id
                    )));
                }
            }
            for fork in &record.fork_points {
                self.branches.branch(*fork)?;
            }
        }

        Ok(())
    }
}

fn key_source(key: &str) -> Option<&str> {
    key.split_once('/').map(|(_, source)| source)
}

impl AttachmentResolver for Conversation {
    fn attachment_text(&self, source_id: &str) -> Option<&str> {
        self.files.iter().find_map(|(key, attachment)| {
            (key_source(key) == Some(source_id)).then_some(attachment.content.as_str())
        })
    }
}
