use thiserror::Error;

use crate::branch::BranchId;
use crate::message::MessageId;

/// Errors raised by conversation operations.
///
/// Every failure is a local precondition violation; no operation leaves the
/// conversation partially mutated.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Branch not found: {0}")]
    BranchNotFound(BranchId),

    #[error("Message {message} is already on branch {branch}")]
    AlreadyOnBranch {
        message: MessageId,
        branch: BranchId,
    },

    #[error("Invalid conversation state: {0}")]
    InvalidState(String),
}
