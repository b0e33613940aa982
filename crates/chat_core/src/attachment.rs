//! Attachment entries referenced from message content.

use serde::{Deserialize, Serialize};

/// A document attached to a conversation: a display name plus the
/// extracted text substituted for references to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Attachment {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Resolves attachment source ids to their current text.
///
/// Prompt rendering substitutes `![id]{caption}` references through this
/// seam. A `None` leaves the reference text untouched, so stale references
/// degrade to visible markers instead of failing the render.
pub trait AttachmentResolver {
    fn attachment_text(&self, source_id: &str) -> Option<&str>;
}

/// Resolver for contexts without attachments.
pub struct NoAttachments;

impl AttachmentResolver for NoAttachments {
    fn attachment_text(&self, _source_id: &str) -> Option<&str> {
        None
    }
}
