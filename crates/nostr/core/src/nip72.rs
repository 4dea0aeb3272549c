//! NIP-72: Moderated Communities
//!
//! A community is an addressable kind 34550 event carrying a `d` identifier, a
//! `name`, a `description` and moderators as `["p", <pubkey>, <relay>,
//! "moderator"]` tags. Posts become visible once a moderator publishes a kind
//! 4550 approval that embeds the approved event, references it with `e`, its
//! author with `p` and its kind with `k`, and scopes itself to the community with
//! an `a` tag.

use crate::nip01::Event;

/// Kind for community definitions.
pub const KIND_COMMUNITY_DEFINITION: u16 = 34550;

/// Kind for post approvals.
pub const KIND_COMMUNITY_POST_APPROVAL: u16 = 4550;

/// Marker on `p` tags naming moderators.
pub const MODERATOR_MARKER: &str = "moderator";

/// Build a moderator tag.
pub fn create_moderator_tag(pubkey: &str) -> Vec<String> {
    vec![
        "p".to_string(),
        pubkey.to_string(),
        String::new(),
        MODERATOR_MARKER.to_string(),
    ]
}

/// Moderator pubkeys listed on a community definition, without duplicates.
pub fn get_moderators(event: &Event) -> Vec<String> {
    let mut moderators: Vec<String> = Vec::new();
    for tag in &event.tags {
        if tag.len() >= 4 && tag[0] == "p" && tag[3] == MODERATOR_MARKER && !tag[1].is_empty() {
            if !moderators.contains(&tag[1]) {
                moderators.push(tag[1].clone());
            }
        }
    }
    moderators
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_moderators() {
        let event = Event {
            id: "c".to_string(),
            pubkey: "alice".to_string(),
            created_at: 1,
            kind: KIND_COMMUNITY_DEFINITION,
            tags: vec![
                vec!["d".to_string(), "x".to_string()],
                create_moderator_tag("m1"),
                vec!["p".to_string(), "not-a-mod".to_string()],
                create_moderator_tag("m2"),
                create_moderator_tag("m1"),
            ],
            content: String::new(),
            sig: String::new(),
        };

        assert_eq!(get_moderators(&event), vec!["m1", "m2"]);
    }
}
