//! Discussion service.
//!
//! [`NostrService`] wraps a shared [`RelayPool`] with the queries and streams
//! the discussion screens need. It is built by [`create_nostr_service`] at the
//! composition root and passed explicitly to whoever needs it; cloning is
//! cheap and every clone shares the same relay connections.

use crate::aggregate::{
    build_posts, exclude_deleted_discussions, exclude_revoked_approvals, latest_discussions,
    pick_latest_discussion,
};
use crate::builders::{BuildError, DISCUSSION_REQUEST_TAG};
use crate::config::ServiceConfig;
use crate::parsers::{
    parse_approval_event, parse_deletion_event, parse_discussion_request_event, parse_profile_event,
};
use crate::signer::{Signer, SignerError};
use crate::types::{
    DeletionRequest, Discussion, DiscussionPost, DiscussionRequest, PostApproval, Profile,
    parse_discussion_id,
};
use nostr::{
    Event, EventTemplate, KIND_COMMENT, KIND_COMMUNITY_DEFINITION, KIND_COMMUNITY_POST_APPROVAL,
    KIND_DELETION, KIND_METADATA, KIND_REACTION, KIND_SHORT_TEXT_NOTE, Nip33Error,
};
use nostr_client::{
    ClientError, EventStream, Filter, RelayPool, StreamOptions, get_events_on_eose,
    stream_events_on_event,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on discussions fetched for the overview.
const DISCUSSION_LIST_LIMIT: u64 = 200;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("relay error: {0}")]
    Relay(#[from] ClientError),

    #[error("invalid discussion id: {0}")]
    InvalidDiscussionId(#[from] Nip33Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error("no relay accepted event {0}")]
    PublishRejected(String),
}

/// Build a service with its own relay pool from `config`.
///
/// # Errors
///
/// Returns an error if a relay URL is invalid.
pub fn create_nostr_service(config: ServiceConfig) -> Result<NostrService, ServiceError> {
    let pool = RelayPool::new(&config.relays, config.pool_config())?;
    Ok(NostrService::new(Arc::new(pool), config))
}

#[derive(Clone)]
pub struct NostrService {
    pool: Arc<RelayPool>,
    config: ServiceConfig,
}

impl NostrService {
    /// Service over an existing pool. `config.relays` is not consulted.
    pub fn new(pool: Arc<RelayPool>, config: ServiceConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &RelayPool {
        &self.pool
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn admin_pubkey(&self) -> Option<&str> {
        self.config.admin_pubkey.as_deref()
    }

    /// One-shot query, newest first.
    pub async fn get_events_on_eose(&self, filters: &[Filter]) -> Vec<Event> {
        get_events_on_eose(&self.pool, filters).await
    }

    /// Stream with the configured timeout.
    pub async fn stream_events_on_event(&self, filters: Vec<Filter>) -> EventStream {
        self.stream_events_with(filters, self.config.stream_options())
            .await
    }

    pub async fn stream_events_with(
        &self,
        filters: Vec<Filter>,
        options: StreamOptions,
    ) -> EventStream {
        stream_events_on_event(&self.pool, filters, options).await
    }

    /// Versions of one discussion definition. Several may arrive; reduce with
    /// [`pick_latest_discussion`].
    pub async fn stream_discussion_meta(&self, author_pubkey: &str, d_tag: &str) -> EventStream {
        let filter = Filter::new()
            .kinds(vec![KIND_COMMUNITY_DEFINITION])
            .authors(vec![author_pubkey])
            .identifiers(vec![d_tag])
            .limit(1);
        self.stream_events_on_event(vec![filter]).await
    }

    /// Every approval made in a discussion.
    pub async fn stream_approvals(&self, discussion_id: &str) -> EventStream {
        let filter = Filter::new()
            .kinds(vec![KIND_COMMUNITY_POST_APPROVAL])
            .address_refs(vec![discussion_id]);
        self.stream_events_on_event(vec![filter]).await
    }

    /// Approvals of the given posts. With no posts the stream is already
    /// complete and no subscription is opened.
    pub async fn stream_approvals_for_posts(
        &self,
        post_ids: &[String],
        discussion_id: &str,
    ) -> EventStream {
        if post_ids.is_empty() {
            debug!("No posts to fetch approvals for in {}", discussion_id);
            return EventStream::completed(Vec::new());
        }
        let filter = Filter::new()
            .kinds(vec![KIND_COMMUNITY_POST_APPROVAL])
            .address_refs(vec![discussion_id])
            .event_refs(post_ids.iter().cloned());
        self.stream_events_on_event(vec![filter]).await
    }

    /// Posts in a discussion, optionally only those tagged with a bus stop.
    pub async fn stream_posts(
        &self,
        discussion_id: &str,
        bus_stop_tag: Option<&str>,
    ) -> EventStream {
        self.stream_events_on_event(vec![posts_filter(discussion_id, bus_stop_tag)])
            .await
    }

    /// Evaluations made within a discussion. Evaluations built without a
    /// discussion id carry no `a` tag; [`Self::stream_evaluations_for_posts`]
    /// finds those.
    pub async fn stream_evaluations(&self, discussion_id: &str) -> EventStream {
        let filter = Filter::new()
            .kinds(vec![KIND_REACTION])
            .address_refs(vec![discussion_id]);
        self.stream_events_on_event(vec![filter]).await
    }

    /// Evaluations of the given posts, with or without a discussion tag. With
    /// no posts the stream is already complete.
    pub async fn stream_evaluations_for_posts(&self, post_ids: &[String]) -> EventStream {
        if post_ids.is_empty() {
            return EventStream::completed(Vec::new());
        }
        let filter = Filter::new()
            .kinds(vec![KIND_REACTION])
            .event_refs(post_ids.iter().cloned());
        self.stream_events_on_event(vec![filter]).await
    }

    /// Deletion requests authored by any of `authors`. Empty input completes
    /// immediately.
    pub async fn stream_deletions(&self, authors: &[String]) -> EventStream {
        if authors.is_empty() {
            return EventStream::completed(Vec::new());
        }
        let filter = Filter::new()
            .kinds(vec![KIND_DELETION])
            .authors(authors.iter().cloned());
        self.stream_events_on_event(vec![filter]).await
    }

    /// Latest non-deleted version of a discussion.
    pub async fn load_discussion(
        &self,
        discussion_id: &str,
    ) -> Result<Option<Discussion>, ServiceError> {
        let address = parse_discussion_id(discussion_id)?;
        let filter = Filter::new()
            .kinds(vec![KIND_COMMUNITY_DEFINITION])
            .authors(vec![address.pubkey.as_str()])
            .identifiers(vec![address.identifier.as_str()]);
        let events = self.get_events_on_eose(&[filter]).await;

        let Some(discussion) = pick_latest_discussion(&events) else {
            return Ok(None);
        };
        let deletions = self
            .load_deletions_of_addresses(&[discussion.id.clone()])
            .await;
        Ok(exclude_deleted_discussions(&[discussion], &deletions)
            .into_iter()
            .next())
    }

    /// Every discussion, latest version each, deleted ones excluded, newest first.
    pub async fn load_discussions(&self) -> Vec<Discussion> {
        let filter = Filter::new()
            .kinds(vec![KIND_COMMUNITY_DEFINITION])
            .limit(DISCUSSION_LIST_LIMIT);
        let discussions = latest_discussions(&self.get_events_on_eose(&[filter]).await);

        let ids: Vec<String> = discussions.iter().map(|d| d.id.clone()).collect();
        let deletions = self.load_deletions_of_addresses(&ids).await;
        let discussions = exclude_deleted_discussions(&discussions, &deletions);
        info!("Loaded {} discussions", discussions.len());
        discussions
    }

    /// Requests addressed to the configured admin (or all requests without one).
    pub async fn load_discussion_requests(&self) -> Vec<DiscussionRequest> {
        let mut filter = Filter::new()
            .kinds(vec![KIND_SHORT_TEXT_NOTE])
            .hashtags(vec![DISCUSSION_REQUEST_TAG]);
        if let Some(admin) = self.admin_pubkey() {
            filter = filter.pubkey_refs(vec![admin]);
        }
        self.get_events_on_eose(&[filter])
            .await
            .iter()
            .filter_map(parse_discussion_request_event)
            .collect()
    }

    /// Approvals in a discussion, minus those revoked by their moderator.
    pub async fn load_approvals(&self, discussion_id: &str) -> Vec<PostApproval> {
        let filter = Filter::new()
            .kinds(vec![KIND_COMMUNITY_POST_APPROVAL])
            .address_refs(vec![discussion_id]);
        let approvals: Vec<PostApproval> = self
            .get_events_on_eose(&[filter])
            .await
            .iter()
            .filter_map(parse_approval_event)
            .collect();

        let ids: Vec<String> = approvals.iter().map(|a| a.id.clone()).collect();
        let deletions = self.load_deletions_of_events(&ids).await;
        exclude_revoked_approvals(&approvals, &deletions)
    }

    /// Raw post events of a discussion, newest first.
    pub async fn load_post_events(&self, discussion_id: &str) -> Vec<Event> {
        self.get_events_on_eose(&[posts_filter(discussion_id, None)])
            .await
    }

    /// Posts of a discussion with their approval state.
    pub async fn load_posts(&self, discussion_id: &str) -> Vec<DiscussionPost> {
        let (events, approvals) = futures::join!(
            self.load_post_events(discussion_id),
            self.load_approvals(discussion_id)
        );
        build_posts(&events, &approvals)
    }

    /// Latest profile metadata of `pubkey`.
    pub async fn load_profile(&self, pubkey: &str) -> Option<Profile> {
        let filter = Filter::new()
            .kinds(vec![KIND_METADATA])
            .authors(vec![pubkey])
            .limit(1);
        self.get_events_on_eose(&[filter])
            .await
            .iter()
            .find_map(parse_profile_event)
    }

    async fn load_deletions_of_events(&self, ids: &[String]) -> Vec<DeletionRequest> {
        if ids.is_empty() {
            return Vec::new();
        }
        let filter = Filter::new()
            .kinds(vec![KIND_DELETION])
            .event_refs(ids.iter().cloned());
        self.get_events_on_eose(&[filter])
            .await
            .iter()
            .filter_map(parse_deletion_event)
            .collect()
    }

    async fn load_deletions_of_addresses(&self, addresses: &[String]) -> Vec<DeletionRequest> {
        if addresses.is_empty() {
            return Vec::new();
        }
        let filter = Filter::new()
            .kinds(vec![KIND_DELETION])
            .address_refs(addresses.iter().cloned());
        self.get_events_on_eose(&[filter])
            .await
            .iter()
            .filter_map(parse_deletion_event)
            .collect()
    }

    /// Publish to the write relays. True when at least one accepted.
    pub async fn publish(&self, event: &Event) -> bool {
        self.pool.publish(event).await
    }

    /// Sign `template` and publish it.
    ///
    /// # Errors
    ///
    /// Fails when the signer refuses or no relay accepts the event.
    pub async fn sign_and_publish(
        &self,
        signer: &dyn Signer,
        template: EventTemplate,
    ) -> Result<Event, ServiceError> {
        let event = signer.sign(template).await?;
        if !self.publish(&event).await {
            warn!("No relay accepted event {} (kind {})", event.id, event.kind);
            return Err(ServiceError::PublishRejected(event.id));
        }
        Ok(event)
    }
}

fn posts_filter(discussion_id: &str, bus_stop_tag: Option<&str>) -> Filter {
    let filter = Filter::new()
        .kinds(vec![KIND_COMMENT])
        .address_refs(vec![discussion_id]);
    match bus_stop_tag {
        Some(tag) => filter.hashtags(vec![tag]),
        None => filter,
    }
}
