//! chat_core - the branching conversation model
//!
//! A conversation is a flat store of message records plus a forest of
//! branches over them. Messages are owned once and shared by reference:
//! forking a branch copies the id sequence, never the text.
//!
//! Modules:
//! - `message` - message records and speaker roles
//! - `store` - the id-keyed message store
//! - `branch` - the branch arena (fork, append, ancestry)
//! - `conversation` - the aggregate owning one store and one tree
//! - `persona` - character definitions and generation parameters
//! - `attachment` - attachment entries and the resolver seam

pub mod attachment;
pub mod branch;
pub mod conversation;
pub mod error;
pub mod ids;
pub mod message;
pub mod persona;
pub mod store;

pub use attachment::{Attachment, AttachmentResolver, NoAttachments};
pub use branch::{Branch, BranchId, BranchTree};
pub use conversation::Conversation;
pub use error::ChatError;
pub use ids::random_hex_id;
pub use message::{Message, MessageId, Role};
pub use persona::{ChatMode, GenerationParams, Persona, RoleNames};
pub use store::MessageStore;
