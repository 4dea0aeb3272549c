//! NIP-22: Comment
//!
//! Kind 1111 comments scope themselves to a root with uppercase tags (`A`, `E`,
//! `K`, `P`) and to their direct parent with lowercase tags. A flat discussion
//! under an addressable root points both at the same coordinate.

use crate::nip01::Event;

/// Kind for comments.
pub const KIND_COMMENT: u16 = 1111;

/// Check whether an event is a comment.
pub fn is_comment(event: &Event) -> bool {
    event.kind == KIND_COMMENT
}

/// Root and parent tags for a comment on an addressable event.
pub fn create_address_comment_tags(address: &str, root_kind: u16) -> Vec<Vec<String>> {
    vec![
        vec!["A".to_string(), address.to_string()],
        vec!["K".to_string(), root_kind.to_string()],
        vec!["a".to_string(), address.to_string()],
        vec!["k".to_string(), root_kind.to_string()],
    ]
}

/// Root coordinate of a comment, falling back to the parent coordinate.
pub fn get_root_address(event: &Event) -> Option<&str> {
    event.tag_value("A").or_else(|| event.tag_value("a"))
}

/// Parent coordinate of a comment.
pub fn get_parent_address(event: &Event) -> Option<&str> {
    event.tag_value("a")
}
