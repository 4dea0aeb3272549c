//! Event decoding.
//!
//! Each parser accepts any event and returns `None` when it is not a valid
//! instance of the expected kind. Relays carry plenty of noise from other
//! clients, so malformed input is skipped rather than reported.

use crate::builders::{DISCUSSION_REQUEST_TAG, RATING_TAG};
use crate::types::{
    DeletionRequest, Discussion, DiscussionPost, DiscussionRequest, Moderator, PostApproval,
    PostEvaluation, Profile, discussion_id,
};
use nostr::{
    Event, KIND_COMMENT, KIND_COMMUNITY_DEFINITION, KIND_COMMUNITY_POST_APPROVAL, KIND_DELETION,
    KIND_METADATA, KIND_REACTION, KIND_SHORT_TEXT_NOTE, get_d_tag, get_deleted_addresses,
    get_deleted_event_ids, get_moderators, get_root_address,
};
use serde::Deserialize;

/// An event decoded into the domain variant matching its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Discussion(Discussion),
    /// A post without approval context; see [`parse_post_event`].
    Post(DiscussionPost),
    Approval(PostApproval),
    Evaluation(PostEvaluation),
    Deletion(DeletionRequest),
    DiscussionRequest(DiscussionRequest),
    Profile(Profile),
}

impl DomainEvent {
    /// Decode an event by kind. Kind 1 notes are discussion requests when
    /// tagged as such, otherwise legacy posts if they reference a discussion.
    pub fn decode(event: &Event) -> Option<Self> {
        match event.kind {
            KIND_COMMUNITY_DEFINITION => parse_discussion_event(event).map(Self::Discussion),
            KIND_COMMENT => parse_post_event(event, &[]).map(Self::Post),
            KIND_COMMUNITY_POST_APPROVAL => parse_approval_event(event).map(Self::Approval),
            KIND_REACTION => parse_evaluation_event(event).map(Self::Evaluation),
            KIND_DELETION => parse_deletion_event(event).map(Self::Deletion),
            KIND_METADATA => parse_profile_event(event).map(Self::Profile),
            KIND_SHORT_TEXT_NOTE => parse_discussion_request_event(event)
                .map(Self::DiscussionRequest)
                .or_else(|| parse_post_event(event, &[]).map(Self::Post)),
            _ => None,
        }
    }
}

/// Kind 34550 with a `d` tag.
pub fn parse_discussion_event(event: &Event) -> Option<Discussion> {
    if event.kind != KIND_COMMUNITY_DEFINITION {
        return None;
    }
    let d_tag = get_d_tag(event)?;

    Some(Discussion {
        id: discussion_id(&event.pubkey, &d_tag),
        title: event.tag_value("name").unwrap_or_default().to_string(),
        description: event
            .tag_value("description")
            .unwrap_or(&event.content)
            .to_string(),
        author_pubkey: event.pubkey.clone(),
        d_tag,
        moderators: get_moderators(event)
            .into_iter()
            .map(|pubkey| Moderator { pubkey })
            .collect(),
        created_at: event.created_at,
        event: event.clone(),
    })
}

/// Kind 1111 (or a kind 1 note referencing a discussion) with approval state
/// derived from `approvals`.
///
/// Only approvals for this post id count, and when the post names its
/// discussion, only approvals made within that discussion.
pub fn parse_post_event(event: &Event, approvals: &[PostApproval]) -> Option<DiscussionPost> {
    let discussion = get_root_address(event);
    match event.kind {
        KIND_COMMENT => {}
        KIND_SHORT_TEXT_NOTE if discussion.is_some() => {}
        _ => return None,
    }

    let mut approved_by: Vec<String> = Vec::new();
    let mut approved_at: Option<u64> = None;
    for approval in approvals.iter().filter(|a| {
        a.post_id == event.id && discussion.is_none_or(|d| a.discussion_id == d)
    }) {
        if !approved_by.contains(&approval.moderator_pubkey) {
            approved_by.push(approval.moderator_pubkey.clone());
        }
        approved_at = Some(approved_at.map_or(approval.created_at, |t| t.min(approval.created_at)));
    }

    Some(DiscussionPost {
        id: event.id.clone(),
        author_pubkey: event.pubkey.clone(),
        content: event.content.clone(),
        bus_stop_tag: event.tag_value("t").map(str::to_string),
        created_at: event.created_at,
        approved: !approved_by.is_empty(),
        approved_by,
        approved_at,
        event: event.clone(),
    })
}

/// Kind 4550 with `e` and `a` tags.
pub fn parse_approval_event(event: &Event) -> Option<PostApproval> {
    if event.kind != KIND_COMMUNITY_POST_APPROVAL {
        return None;
    }
    let post_id = event.tag_value("e")?;
    let discussion_id = event.tag_value("a")?;

    let post_author_pubkey = match event.tag_value("p") {
        Some(pubkey) => pubkey.to_string(),
        None => Event::from_json(&event.content)
            .map(|post| post.pubkey)
            .unwrap_or_default(),
    };

    Some(PostApproval {
        id: event.id.clone(),
        post_id: post_id.to_string(),
        post_author_pubkey,
        moderator_pubkey: event.pubkey.clone(),
        discussion_id: discussion_id.to_string(),
        created_at: event.created_at,
        event: event.clone(),
    })
}

/// Kind 7 with an `e` tag and a `rating` tag of `+` or `-`.
pub fn parse_evaluation_event(event: &Event) -> Option<PostEvaluation> {
    if event.kind != KIND_REACTION {
        return None;
    }
    let post_id = event.tag_value("e")?;
    let rating = event.tag_value(RATING_TAG)?.parse().ok()?;

    Some(PostEvaluation {
        id: event.id.clone(),
        post_id: post_id.to_string(),
        evaluator_pubkey: event.pubkey.clone(),
        rating,
        discussion_id: event.tag_value("a").map(str::to_string),
        created_at: event.created_at,
    })
}

/// Kind 1 tagged `t=discussion-request`.
pub fn parse_discussion_request_event(event: &Event) -> Option<DiscussionRequest> {
    if event.kind != KIND_SHORT_TEXT_NOTE || !event.has_tag("t", DISCUSSION_REQUEST_TAG) {
        return None;
    }

    let title = match event.tag_value("subject") {
        Some(subject) => subject.to_string(),
        None => event.content.lines().next().unwrap_or_default().to_string(),
    };

    Some(DiscussionRequest {
        id: event.id.clone(),
        requester_pubkey: event.pubkey.clone(),
        title,
        description: event.content.clone(),
        admin_pubkey: event.tag_value("p").map(str::to_string),
        created_at: event.created_at,
        event: event.clone(),
    })
}

#[derive(Deserialize)]
struct ProfileMetadata {
    name: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "displayName")]
    display_name_camel: Option<String>,
    about: Option<String>,
    picture: Option<String>,
}

/// Kind 0 whose content is a JSON metadata object.
pub fn parse_profile_event(event: &Event) -> Option<Profile> {
    if event.kind != KIND_METADATA {
        return None;
    }
    let metadata: ProfileMetadata = serde_json::from_str(&event.content).ok()?;

    Some(Profile {
        pubkey: event.pubkey.clone(),
        name: metadata.name,
        display_name: metadata.display_name.or(metadata.display_name_camel),
        about: metadata.about,
        picture: metadata.picture,
        created_at: event.created_at,
    })
}

/// Kind 5 naming at least one event id or address.
pub fn parse_deletion_event(event: &Event) -> Option<DeletionRequest> {
    if event.kind != KIND_DELETION {
        return None;
    }
    let event_ids = get_deleted_event_ids(event);
    let addresses = get_deleted_addresses(event);
    if event_ids.is_empty() && addresses.is_empty() {
        return None;
    }

    Some(DeletionRequest {
        id: event.id.clone(),
        author_pubkey: event.pubkey.clone(),
        event_ids,
        addresses,
        reason: event.content.clone(),
        created_at: event.created_at,
    })
}
