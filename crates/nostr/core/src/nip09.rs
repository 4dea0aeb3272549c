//! NIP-09: Event Deletion Request
//!
//! A deletion request is a kind 5 event whose `e` tags name the event ids and
//! whose `a` tags name the addressable coordinates the author wants removed.
//! Only requests signed by the original author are honoured.

use crate::nip01::Event;

/// Kind for deletion requests.
pub const KIND_DELETION: u16 = 5;

/// Check whether an event is a deletion request.
pub fn is_deletion_request(event: &Event) -> bool {
    event.kind == KIND_DELETION
}

/// Build `e` tags for every id to delete.
pub fn create_deletion_tags<S: AsRef<str>>(event_ids: &[S]) -> Vec<Vec<String>> {
    event_ids
        .iter()
        .map(|id| vec!["e".to_string(), id.as_ref().to_string()])
        .collect()
}

/// Event ids referenced by a deletion request.
pub fn get_deleted_event_ids(event: &Event) -> Vec<String> {
    if !is_deletion_request(event) {
        return Vec::new();
    }
    event.tag_values("e").into_iter().map(String::from).collect()
}

/// Addressable coordinates referenced by a deletion request.
pub fn get_deleted_addresses(event: &Event) -> Vec<String> {
    if !is_deletion_request(event) {
        return Vec::new();
    }
    event.tag_values("a").into_iter().map(String::from).collect()
}

/// Whether `deletion` removes `target`.
///
/// The deletion must be authored by the target's author and reference either
/// the target id or the given coordinate.
pub fn should_delete_event(target: &Event, address: Option<&str>, deletion: &Event) -> bool {
    if !is_deletion_request(deletion) || deletion.pubkey != target.pubkey {
        return false;
    }
    deletion.has_tag("e", &target.id) || address.is_some_and(|a| deletion.has_tag("a", a))
}
