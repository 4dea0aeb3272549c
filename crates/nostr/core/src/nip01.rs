//! NIP-01: Basic protocol flow description.
//!
//! This module implements the core Nostr event structure and the helpers every
//! other layer leans on:
//! - Event structure (id, pubkey, created_at, kind, tags, content, sig)
//! - Event templates (what a signer receives)
//! - Tag lookups
//! - Recency ordering and id deduplication of event batches
//! - Kind classification (regular, replaceable, ephemeral, addressable)
//!
//! Signing is not part of this crate. `id` and `sig` are produced by whatever
//! signer the application plugs in; nothing here fabricates them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during NIP-01 operations.
#[derive(Debug, Error)]
pub enum Nip01Error {
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A signed Nostr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-bytes lowercase hex-encoded sha256 of the serialized event data
    pub id: String,
    /// 32-bytes lowercase hex-encoded public key of the event creator
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind (integer between 0 and 65535)
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
    /// 64-bytes lowercase hex signature
    pub sig: String,
}

impl Event {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        tag_value(&self.tags, name)
    }

    /// Every first value of tags named `name`, in tag order.
    pub fn tag_values(&self, name: &str) -> Vec<&str> {
        tag_values(&self.tags, name)
    }

    /// Whether a tag `[name, value, ...]` is present.
    pub fn has_tag(&self, name: &str, value: &str) -> bool {
        self.tags
            .iter()
            .any(|tag| tag.len() >= 2 && tag[0] == name && tag[1] == value)
    }

    /// Serialize the full event (id and sig included) to JSON.
    pub fn as_json(&self) -> Result<String, Nip01Error> {
        serde_json::to_string(self).map_err(|e| Nip01Error::Serialization(e.to_string()))
    }

    /// Parse a full event from JSON.
    pub fn from_json(json: &str) -> Result<Self, Nip01Error> {
        serde_json::from_str(json).map_err(|e| Nip01Error::InvalidEvent(e.to_string()))
    }
}

/// A template for creating events (without pubkey, id or sig).
///
/// Templates are what the signer receives. The pubkey comes from the signing
/// key, and id/sig are computed during signing.
///
/// # Examples
///
/// ```
/// use nostr::EventTemplate;
///
/// let template = EventTemplate {
///     created_at: 1_700_000_000,
///     kind: 1,
///     tags: vec![vec!["t".to_string(), "nostr".to_string()]],
///     content: "Hello Nostr!".to_string(),
/// };
/// assert_eq!(template.tags[0][0], "t");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    /// Unix timestamp in seconds
    pub created_at: u64,
    /// Event kind
    pub kind: u16,
    /// Array of arrays of strings (tags)
    pub tags: Vec<Vec<String>>,
    /// Arbitrary string content
    pub content: String,
}

impl EventTemplate {
    /// First value of the first tag named `name`.
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        tag_value(&self.tags, name)
    }

    /// Every first value of tags named `name`, in tag order.
    pub fn tag_values(&self, name: &str) -> Vec<&str> {
        tag_values(&self.tags, name)
    }
}

/// Event kind classification according to NIP-01.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindClassification {
    /// Events expected to be stored by relays
    Regular,
    /// Only latest event per pubkey+kind is stored
    Replaceable,
    /// Not expected to be stored by relays
    Ephemeral,
    /// Only latest event per pubkey+kind+d-tag is stored
    Addressable,
    /// Unknown classification
    Unknown,
}

// Standard event kinds
pub const KIND_METADATA: u16 = 0;
pub const KIND_SHORT_TEXT_NOTE: u16 = 1;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// First value of the first tag named `name`.
pub fn tag_value<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.len() >= 2 && tag[0] == name)
        .map(|tag| tag[1].as_str())
}

/// Every first value of tags named `name`, in tag order.
pub fn tag_values<'a>(tags: &'a [Vec<String>], name: &str) -> Vec<&'a str> {
    tags.iter()
        .filter(|tag| tag.len() >= 2 && tag[0] == name)
        .map(|tag| tag[1].as_str())
        .collect()
}

/// Classify an event kind according to NIP-01 rules.
pub fn classify_kind(kind: u16) -> KindClassification {
    let k = kind as u32;

    // Regular: 1000 <= n < 10000 || 4 <= n < 45 || n == 1 || n == 2
    if (1000..10000).contains(&k) || (4..45).contains(&k) || k == 1 || k == 2 {
        return KindClassification::Regular;
    }

    // Replaceable: 10000 <= n < 20000 || n == 0 || n == 3
    if (10000..20000).contains(&k) || k == 0 || k == 3 {
        return KindClassification::Replaceable;
    }

    if (20000..30000).contains(&k) {
        return KindClassification::Ephemeral;
    }

    if (30000..40000).contains(&k) {
        return KindClassification::Addressable;
    }

    KindClassification::Unknown
}

/// Check if a kind is replaceable.
pub fn is_replaceable_kind(kind: u16) -> bool {
    matches!(classify_kind(kind), KindClassification::Replaceable)
}

/// Check if a kind is addressable.
pub fn is_addressable_kind(kind: u16) -> bool {
    matches!(classify_kind(kind), KindClassification::Addressable)
}

/// Sort events in reverse-chronological order by created_at.
///
/// The sort is stable: events sharing a timestamp keep their arrival order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Drop every event whose id was already seen, keeping the first copy.
pub fn dedup_events(events: impl IntoIterator<Item = Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|event| seen.insert(event.id.clone()))
        .collect()
}
