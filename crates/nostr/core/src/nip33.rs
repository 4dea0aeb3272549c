//! NIP-33: Parameterized Replaceable Events
//!
//! **DEPRECATED:** This NIP has been renamed to "Addressable events" and moved to NIP-01.
//!
//! Addressable events have kinds in the range 30000-39999 and are uniquely
//! identified by the combination of (kind, pubkey, d tag value). For each
//! combination only the newest `created_at` instance counts; older versions are
//! superseded.
//!
//! ## Address Format
//!
//! ```text
//! <kind>:<pubkey>:<d-tag-value>
//! ```
//!
//! Other events point at an addressable event with an `a` tag:
//!
//! ```json
//! ["a", "<kind>:<pubkey>:<d-tag-value>", "<optional-relay-url>"]
//! ```
//!
//! # Usage
//!
//! ```
//! use nostr::nip33::{create_address, parse_address};
//!
//! let address = create_address(34550, "author", "bus-stop-12");
//! assert_eq!(address, "34550:author:bus-stop-12");
//!
//! let parsed = parse_address(&address).unwrap();
//! assert_eq!(parsed.kind, 34550);
//! assert_eq!(parsed.pubkey, "author");
//! assert_eq!(parsed.identifier, "bus-stop-12");
//! ```

use crate::nip01::{Event, is_addressable_kind};
use std::fmt;
use thiserror::Error;

/// Tag name for the d-identifier
pub const D_TAG: &str = "d";

/// Errors that can occur during NIP-33 operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip33Error {
    #[error("event is not addressable (kind must be 30000-39999)")]
    NotAddressable,

    #[error("missing required d tag")]
    MissingDTag,

    #[error("invalid address format: {0}")]
    InvalidAddress(String),
}

/// A parsed `<kind>:<pubkey>:<d-tag>` coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub kind: u16,
    pub pubkey: String,
    pub identifier: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.identifier)
    }
}

/// Get the d tag value from an event.
pub fn get_d_tag(event: &Event) -> Option<String> {
    event.tag_value(D_TAG).map(|s| s.to_string())
}

/// Create an address string for an addressable event.
pub fn create_address(kind: u16, pubkey: &str, d_tag: &str) -> String {
    format!("{}:{}:{}", kind, pubkey, d_tag)
}

/// Parse an address string into its components.
///
/// The d-tag part may itself contain `:`; only the first two separators split.
///
/// # Errors
///
/// Returns an error if the kind is not a number in the addressable range or the
/// pubkey part is empty.
pub fn parse_address(address: &str) -> Result<Address, Nip33Error> {
    let parts: Vec<&str> = address.splitn(3, ':').collect();

    if parts.len() != 3 {
        return Err(Nip33Error::InvalidAddress(
            "address must have format kind:pubkey:dtag".to_string(),
        ));
    }

    let kind = parts[0]
        .parse::<u16>()
        .map_err(|_| Nip33Error::InvalidAddress("invalid kind".to_string()))?;

    if !is_addressable_kind(kind) {
        return Err(Nip33Error::InvalidAddress(format!(
            "kind {} is not addressable (must be 30000-39999)",
            kind
        )));
    }

    if parts[1].is_empty() {
        return Err(Nip33Error::InvalidAddress("empty pubkey".to_string()));
    }

    Ok(Address {
        kind,
        pubkey: parts[1].to_string(),
        identifier: parts[2].to_string(),
    })
}

/// Get the address of an addressable event.
///
/// # Errors
///
/// Returns an error if the event is not addressable or is missing the d tag.
pub fn get_event_address(event: &Event) -> Result<String, Nip33Error> {
    if !is_addressable_kind(event.kind) {
        return Err(Nip33Error::NotAddressable);
    }

    let d_tag = get_d_tag(event).ok_or(Nip33Error::MissingDTag)?;

    Ok(create_address(event.kind, &event.pubkey, &d_tag))
}

/// Create an "a" tag for referencing an addressable event.
pub fn create_a_tag(address: &str, relay_url: Option<&str>) -> Vec<String> {
    let mut tag = vec!["a".to_string(), address.to_string()];

    if let Some(url) = relay_url {
        tag.push(url.to_string());
    }

    tag
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_event(kind: u16, tags: Vec<Vec<String>>) -> Event {
        Event {
            id: "0".repeat(64),
            pubkey: "3bf0c63fcb93463407af97a5e5ee64fa883d107ef9e558472c4eb9aaaefa459d".to_string(),
            created_at: 1000000,
            kind,
            tags,
            content: "test content".to_string(),
            sig: "0".repeat(128),
        }
    }

    #[test]
    fn test_get_d_tag() {
        let event = create_test_event(34550, vec![vec!["d".to_string(), "stop-1".to_string()]]);
        assert_eq!(get_d_tag(&event), Some("stop-1".to_string()));

        let event = create_test_event(34550, vec![]);
        assert_eq!(get_d_tag(&event), None);
    }

    #[test]
    fn test_parse_address_keeps_colons_in_identifier() {
        let address = parse_address("34550:abc:route:12").unwrap();
        assert_eq!(address.identifier, "route:12");
        assert_eq!(address.to_string(), "34550:abc:route:12");
    }

    #[test]
    fn test_parse_address_errors() {
        assert!(parse_address("34550:abc").is_err());
        assert!(parse_address("x:abc:d").is_err());
        assert!(parse_address("1111:abc:d").is_err());
        assert!(parse_address("34550::d").is_err());
    }

    #[test]
    fn test_get_event_address() {
        let event = create_test_event(34550, vec![vec!["d".to_string(), "stop-1".to_string()]]);
        assert_eq!(
            get_event_address(&event).unwrap(),
            format!("34550:{}:stop-1", event.pubkey)
        );

        let event = create_test_event(1, vec![]);
        assert_eq!(get_event_address(&event), Err(Nip33Error::NotAddressable));

        let event = create_test_event(34550, vec![]);
        assert_eq!(get_event_address(&event), Err(Nip33Error::MissingDTag));
    }

    #[test]
    fn test_create_a_tag() {
        let tag = create_a_tag("34550:abc:d", Some("wss://relay.example.com"));
        assert_eq!(tag, vec!["a", "34550:abc:d", "wss://relay.example.com"]);
        assert_eq!(create_a_tag("34550:abc:d", None).len(), 2);
    }
}
