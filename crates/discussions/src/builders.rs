//! Event templates for every discussion action.
//!
//! Builders are pure: they validate input and return an [`EventTemplate`].
//! Signing adds `pubkey`, `id` and `sig` later; nothing here touches the
//! network.

use crate::types::{InvalidRating, Rating, parse_discussion_id};
use nostr::{
    Event, EventTemplate, KIND_COMMENT, KIND_COMMUNITY_DEFINITION, KIND_COMMUNITY_POST_APPROVAL,
    KIND_DELETION, KIND_REACTION, KIND_SHORT_TEXT_NOTE, Nip33Error, create_address_comment_tags,
    create_deletion_tags, create_moderator_tag, create_reaction_tags,
};
use thiserror::Error;
use uuid::Uuid;

/// Hashtag marking a kind-1 note as a discussion request.
pub const DISCUSSION_REQUEST_TAG: &str = "discussion-request";

/// Tag carrying an evaluation's vote.
pub const RATING_TAG: &str = "rating";

/// Errors raised while building an event template.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("invalid discussion id: {0}")]
    InvalidDiscussionId(#[from] Nip33Error),

    #[error(transparent)]
    InvalidRating(#[from] InvalidRating),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, BuildError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BuildError::EmptyField(field));
    }
    Ok(trimmed)
}

fn tag(name: &str, value: &str) -> Vec<String> {
    vec![name.to_string(), value.to_string()]
}

/// Kind-34550 discussion definition.
///
/// Passing the `d_tag` of an existing discussion publishes a new version of it;
/// without one a fresh identifier is generated.
pub fn create_discussion_event(
    title: &str,
    description: &str,
    moderators: &[String],
    d_tag: Option<&str>,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    let title = required(title, "title")?;
    let d_tag = match d_tag {
        Some(d) => required(d, "d tag")?.to_string(),
        None => Uuid::new_v4().to_string(),
    };

    let mut tags = vec![
        tag("d", &d_tag),
        tag("name", title),
        tag("description", description.trim()),
    ];
    let mut seen: Vec<&str> = Vec::new();
    for moderator in moderators.iter().map(|m| m.trim()) {
        if moderator.is_empty() || seen.contains(&moderator) {
            continue;
        }
        seen.push(moderator);
        tags.push(create_moderator_tag(moderator));
    }

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_COMMUNITY_DEFINITION,
        tags,
        content: String::new(),
    })
}

/// Kind-1111 post in a discussion, optionally tagged with a bus stop.
pub fn create_post_event(
    content: &str,
    discussion_id: &str,
    bus_stop_tag: Option<&str>,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    let content = required(content, "content")?;
    parse_discussion_id(discussion_id)?;

    let mut tags = create_address_comment_tags(discussion_id, KIND_COMMUNITY_DEFINITION);
    if let Some(stop) = bus_stop_tag.map(str::trim).filter(|s| !s.is_empty()) {
        tags.push(tag("t", stop));
    }

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_COMMENT,
        tags,
        content: content.to_string(),
    })
}

/// Kind-4550 approval embedding the full approved post as JSON.
pub fn create_approval_event(
    post_event: &Event,
    discussion_id: &str,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    parse_discussion_id(discussion_id)?;

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_COMMUNITY_POST_APPROVAL,
        tags: vec![
            tag("a", discussion_id),
            tag("e", &post_event.id),
            tag("p", &post_event.pubkey),
            tag("k", &post_event.kind.to_string()),
        ],
        content: serde_json::to_string(post_event)?,
    })
}

/// Kind-7 evaluation of a post.
///
/// With `discussion_id` the evaluation is also tagged with the discussion
/// address; without it, readers find it only through the post id.
pub fn create_evaluation_event(
    target_event_id: &str,
    rating: Rating,
    discussion_id: Option<&str>,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    let target = required(target_event_id, "target event id")?;

    let mut tags = create_reaction_tags(target, None, None);
    tags.push(tag(RATING_TAG, rating.as_str()));
    if let Some(discussion_id) = discussion_id {
        parse_discussion_id(discussion_id)?;
        tags.push(tag("a", discussion_id));
    }

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_REACTION,
        tags,
        content: rating.as_str().to_string(),
    })
}

/// Same as [`create_evaluation_event`] for a rating given as text.
pub fn create_evaluation_event_str(
    target_event_id: &str,
    rating: &str,
    discussion_id: Option<&str>,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    let rating: Rating = rating.parse()?;
    create_evaluation_event(target_event_id, rating, discussion_id, now)
}

/// Kind-1 note asking the admin to open a discussion.
pub fn create_discussion_request_event(
    title: &str,
    description: &str,
    admin_pubkey: &str,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    let title = required(title, "title")?;
    let admin_pubkey = required(admin_pubkey, "admin pubkey")?;

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_SHORT_TEXT_NOTE,
        tags: vec![
            tag("p", admin_pubkey),
            tag("t", DISCUSSION_REQUEST_TAG),
            tag("subject", title),
        ],
        content: description.trim().to_string(),
    })
}

/// Kind-5 deletion of one or more events by id.
pub fn create_delete_event<S: AsRef<str>>(
    target_ids: &[S],
    reason: &str,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    if target_ids.is_empty() || target_ids.iter().any(|id| id.as_ref().trim().is_empty()) {
        return Err(BuildError::EmptyField("target ids"));
    }

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_DELETION,
        tags: create_deletion_tags(target_ids),
        content: reason.to_string(),
    })
}

/// Kind-5 deletion of a whole discussion by coordinate.
pub fn create_discussion_delete_event(
    discussion_id: &str,
    now: u64,
) -> Result<EventTemplate, BuildError> {
    parse_discussion_id(discussion_id)?;

    Ok(EventTemplate {
        created_at: now,
        kind: KIND_DELETION,
        tags: vec![tag("a", discussion_id)],
        content: String::new(),
    })
}
