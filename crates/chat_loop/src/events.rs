use chat_core::{BranchId, MessageId};
use serde::{Deserialize, Serialize};

/// Events published while a turn streams, for live display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// One increment: the new delta plus everything accumulated so far.
    Delta { content: String, text: String },

    /// The turn finished and its message was committed.
    Complete {
        message: MessageId,
        branch: BranchId,
        text: String,
    },

    Error { message: String },
}
