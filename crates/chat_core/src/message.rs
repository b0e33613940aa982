//! Message records and speaker roles.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::branch::BranchId;

/// Speaker role of a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique message identifier: 8 lowercase hex characters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        MessageId(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId(value.to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single message record.
///
/// A record can be shared by several branches at once: `branches` lists
/// every branch whose sequence contains it, `fork_points` every branch that
/// was forked off immediately after it. The id is not serialized with the
/// record; in the conversation document it lives as the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip)]
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub branches: BTreeSet<BranchId>,
    #[serde(default, rename = "forkPoints", skip_serializing_if = "BTreeSet::is_empty")]
    pub fork_points: BTreeSet<BranchId>,
}

impl Message {
    pub fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Message {
            id,
            role,
            content: content.into(),
            branches: BTreeSet::new(),
            fork_points: BTreeSet::new(),
        }
    }

    /// Whether this message is part of `branch`'s sequence.
    pub fn is_on(&self, branch: BranchId) -> bool {
        self.branches.contains(&branch)
    }
}
