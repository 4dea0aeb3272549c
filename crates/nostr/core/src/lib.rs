//! Nostr protocol primitives for the bus-stop discussion client.
//!
//! This crate provides:
//! - NIP-01: Basic protocol (events, templates, tag lookups, ordering, dedup)
//! - NIP-09: Event Deletion Request
//! - NIP-22: Comment
//! - NIP-25: Reactions
//! - NIP-33: Parameterized Replaceable Events (addresses)
//! - NIP-72: Moderated Communities
//!
//! Signing is deliberately absent: events are signed by an external signer and
//! this crate only models what goes in and what comes back.

pub mod nip01;
pub mod nip09;
pub mod nip22;
pub mod nip25;
pub mod nip33;
pub mod nip72;

// NIP-01: Basic protocol
pub use nip01::{
    Event, EventTemplate, KIND_METADATA, KIND_SHORT_TEXT_NOTE, KindClassification, Nip01Error,
    classify_kind, dedup_events, is_addressable_kind, is_replaceable_kind, sort_events,
    tag_value, tag_values, unix_now,
};

// NIP-09: Event Deletion Request
pub use nip09::{
    KIND_DELETION, create_deletion_tags, get_deleted_addresses, get_deleted_event_ids,
    is_deletion_request, should_delete_event,
};

// NIP-22: Comment
pub use nip22::{KIND_COMMENT, create_address_comment_tags, get_root_address, is_comment};

// NIP-25: Reactions
pub use nip25::{KIND_REACTION, REACTION_DISLIKE, REACTION_LIKE, create_reaction_tags};

// NIP-33: Parameterized Replaceable Events
pub use nip33::{
    Address, D_TAG, Nip33Error, create_a_tag, create_address, get_d_tag, get_event_address,
    parse_address,
};

// NIP-72: Moderated Communities
pub use nip72::{
    KIND_COMMUNITY_DEFINITION, KIND_COMMUNITY_POST_APPROVAL, MODERATOR_MARKER,
    create_moderator_tag, get_moderators,
};
