//! Domain objects reconstructed from events.
//!
//! Everything here is an immutable value rebuilt from the event stream on each
//! load. Approval state on posts and scores on posts are derived, never stored.

use nostr::{Address, Event, KIND_COMMUNITY_DEFINITION, Nip33Error, create_address, parse_address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Coordinate of a discussion: `34550:<author>:<d>`.
pub fn discussion_id(author_pubkey: &str, d_tag: &str) -> String {
    create_address(KIND_COMMUNITY_DEFINITION, author_pubkey, d_tag)
}

/// Parse a discussion coordinate, rejecting addresses of other kinds.
pub fn parse_discussion_id(id: &str) -> Result<Address, Nip33Error> {
    let address = parse_address(id)?;
    if address.kind != KIND_COMMUNITY_DEFINITION {
        return Err(Nip33Error::InvalidAddress(format!(
            "kind {} is not a discussion",
            address.kind
        )));
    }
    Ok(address)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Moderator {
    pub pubkey: String,
}

/// A kind-34550 discussion definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    /// `34550:<author_pubkey>:<d_tag>`
    pub id: String,
    pub title: String,
    pub description: String,
    pub author_pubkey: String,
    pub d_tag: String,
    pub moderators: Vec<Moderator>,
    pub created_at: u64,
    pub event: Event,
}

impl Discussion {
    pub fn moderator_pubkeys(&self) -> Vec<String> {
        self.moderators.iter().map(|m| m.pubkey.clone()).collect()
    }
}

/// A post in a discussion with its derived approval state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionPost {
    pub id: String,
    pub author_pubkey: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bus_stop_tag: Option<String>,
    pub created_at: u64,
    pub approved: bool,
    /// Distinct moderators with an approval on this post, in approval order.
    pub approved_by: Vec<String>,
    /// Timestamp of the earliest approval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<u64>,
    pub event: Event,
}

/// One moderator's kind-4550 endorsement of one post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostApproval {
    pub id: String,
    pub post_id: String,
    pub post_author_pubkey: String,
    pub moderator_pubkey: String,
    pub discussion_id: String,
    pub created_at: u64,
    pub event: Event,
}

/// Returned when parsing a rating other than `+` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid rating {0:?}, expected \"+\" or \"-\"")]
pub struct InvalidRating(pub String);

/// An evaluation vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rating {
    #[serde(rename = "+")]
    Plus,
    #[serde(rename = "-")]
    Minus,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Plus => "+",
            Rating::Minus => "-",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = InvalidRating;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(Rating::Plus),
            "-" => Ok(Rating::Minus),
            other => Err(InvalidRating(other.to_string())),
        }
    }
}

/// A kind-7 evaluation of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEvaluation {
    pub id: String,
    pub post_id: String,
    pub evaluator_pubkey: String,
    pub rating: Rating,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discussion_id: Option<String>,
    pub created_at: u64,
}

/// A post joined with its evaluation counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostWithStats {
    #[serde(flatten)]
    pub post: DiscussionPost,
    /// Positive minus negative votes.
    pub score: i64,
    pub positive: usize,
    pub negative: usize,
    pub total: usize,
}

/// A kind-1 request asking the admin to open a discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionRequest {
    pub id: String,
    pub requester_pubkey: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_pubkey: Option<String>,
    pub created_at: u64,
    pub event: Event,
}

/// Kind-0 profile metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub pubkey: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    pub created_at: u64,
}

impl Profile {
    /// Display name, falling back to name.
    pub fn label(&self) -> Option<&str> {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.name.as_deref())
    }
}

/// A kind-5 deletion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRequest {
    pub id: String,
    pub author_pubkey: String,
    pub event_ids: Vec<String>,
    pub addresses: Vec<String>,
    pub reason: String,
    pub created_at: u64,
}

impl DeletionRequest {
    pub fn deletes_event(&self, event_id: &str, author_pubkey: &str) -> bool {
        self.author_pubkey == author_pubkey && self.event_ids.iter().any(|id| id == event_id)
    }

    pub fn deletes_address(&self, address: &str, author_pubkey: &str) -> bool {
        self.author_pubkey == author_pubkey && self.addresses.iter().any(|a| a == address)
    }
}
