//! Attachment reference resolution.
//!
//! Message content may embed `![id]{caption}` references to conversation
//! attachments. Rendering substitutes the attachment text inline; a
//! reference whose id no longer resolves stays as written, so removed
//! attachments degrade to visible markers.

use std::borrow::Cow;

use chat_core::AttachmentResolver;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref REFERENCE: Regex = Regex::new(r"!\[([^\]\s]+)\]\{([^}]*)\}").unwrap();
}

/// Substitute every resolvable attachment reference in `content`.
///
/// Returns the input unchanged (and unallocated) when nothing matches.
pub fn resolve_references<'a>(
    content: &'a str,
    attachments: &dyn AttachmentResolver,
) -> Cow<'a, str> {
    REFERENCE.replace_all(content, |caps: &Captures| {
        match attachments.attachment_text(&caps[1]) {
            Some(text) => text.to_string(),
            None => caps[0].to_string(),
        }
    })
}
