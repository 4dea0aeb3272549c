//! Moderation of discussion posts.
//!
//! A post is pending until some moderator publishes an approval for it and
//! returns to pending once every approval on it has been deleted by its
//! author. There is no stored status; [`moderation_status`] derives it.
//!
//! [`ModerationController`] keeps the posts and approvals of one discussion
//! as an immutable snapshot. Successful actions install a new snapshot with
//! the change applied before relays have propagated it; the next refresh
//! replaces the snapshot wholesale.

use crate::aggregate::build_posts;
use crate::auth::is_moderator;
use crate::builders::{BuildError, create_approval_event, create_delete_event};
use crate::load::LoadSequence;
use crate::parsers::parse_approval_event;
use crate::service::NostrService;
use crate::signer::{Signer, SignerError};
use crate::types::{Discussion, DiscussionPost, PostApproval};
use nostr::{Event, unix_now};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Reason attached to deletion events that revoke an approval.
const REVOKE_REASON: &str = "approval revoked";

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("{0} is not a moderator of this discussion")]
    Unauthorized(String),

    #[error("post not found: {0}")]
    PostNotFound(String),

    #[error("post {0} is already approved by you")]
    AlreadyApproved(String),

    #[error("an action on post {0} is already in progress")]
    InFlight(String),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("no relay accepted event {0}")]
    PublishRejected(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationStatus {
    Pending,
    Approved,
}

pub fn moderation_status(post: &DiscussionPost) -> ModerationStatus {
    if post.approved {
        ModerationStatus::Approved
    } else {
        ModerationStatus::Pending
    }
}

/// Post events and live approvals of one discussion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationSnapshot {
    pub posts: Vec<Event>,
    pub approvals: Vec<PostApproval>,
}

impl ModerationSnapshot {
    pub fn build_posts(&self) -> Vec<DiscussionPost> {
        build_posts(&self.posts, &self.approvals)
    }

    fn with_approval(&self, approval: PostApproval) -> Self {
        let mut approvals = self.approvals.clone();
        approvals.push(approval);
        Self {
            posts: self.posts.clone(),
            approvals,
        }
    }

    fn without_approvals(&self, ids: &[String]) -> Self {
        Self {
            posts: self.posts.clone(),
            approvals: self
                .approvals
                .iter()
                .filter(|a| !ids.contains(&a.id))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Approve,
    Revoke,
}

#[derive(Debug, Default)]
struct InFlight {
    approving: HashSet<String>,
    revoking: HashSet<String>,
}

impl InFlight {
    fn set(&mut self, action: Action) -> &mut HashSet<String> {
        match action {
            Action::Approve => &mut self.approving,
            Action::Revoke => &mut self.revoking,
        }
    }
}

/// Marks a post busy for as long as it lives.
struct InFlightGuard {
    in_flight: Arc<Mutex<InFlight>>,
    action: Action,
    post_id: String,
}

impl InFlightGuard {
    fn acquire(
        in_flight: &Arc<Mutex<InFlight>>,
        action: Action,
        post_id: &str,
    ) -> Result<Self, ModerationError> {
        let mut state = in_flight.lock();
        if state.approving.contains(post_id) || state.revoking.contains(post_id) {
            return Err(ModerationError::InFlight(post_id.to_string()));
        }
        state.set(action).insert(post_id.to_string());
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            action,
            post_id: post_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.lock().set(self.action).remove(&self.post_id);
    }
}

pub struct ModerationController {
    service: NostrService,
    discussion: Discussion,
    signer: Option<Arc<dyn Signer>>,
    snapshot: Mutex<Arc<ModerationSnapshot>>,
    in_flight: Arc<Mutex<InFlight>>,
    sequence: LoadSequence,
}

impl ModerationController {
    /// Controller for `discussion`. Without a signer every action fails with
    /// [`ModerationError::NotLoggedIn`].
    pub fn new(
        service: NostrService,
        discussion: Discussion,
        signer: Option<Arc<dyn Signer>>,
    ) -> Self {
        Self {
            service,
            discussion,
            signer,
            snapshot: Mutex::new(Arc::new(ModerationSnapshot::default())),
            in_flight: Arc::new(Mutex::new(InFlight::default())),
            sequence: LoadSequence::new(),
        }
    }

    pub fn discussion(&self) -> &Discussion {
        &self.discussion
    }

    pub fn snapshot(&self) -> Arc<ModerationSnapshot> {
        Arc::clone(&self.snapshot.lock())
    }

    /// Whether the logged-in user may moderate this discussion.
    pub fn can_moderate(&self) -> bool {
        is_moderator(
            self.signer.as_ref().map(|s| s.pubkey()),
            &self.discussion.moderator_pubkeys(),
            self.service.admin_pubkey(),
        )
    }

    pub fn posts(&self) -> Vec<DiscussionPost> {
        self.snapshot().build_posts()
    }

    pub fn pending_posts(&self) -> Vec<DiscussionPost> {
        self.posts()
            .into_iter()
            .filter(|p| moderation_status(p) == ModerationStatus::Pending)
            .collect()
    }

    pub fn approved_posts(&self) -> Vec<DiscussionPost> {
        self.posts()
            .into_iter()
            .filter(|p| moderation_status(p) == ModerationStatus::Approved)
            .collect()
    }

    pub fn status(&self, post_id: &str) -> Option<ModerationStatus> {
        self.posts()
            .iter()
            .find(|p| p.id == post_id)
            .map(moderation_status)
    }

    pub fn is_approving(&self, post_id: &str) -> bool {
        self.in_flight.lock().approving.contains(post_id)
    }

    pub fn is_revoking(&self, post_id: &str) -> bool {
        self.in_flight.lock().revoking.contains(post_id)
    }

    /// Replace the snapshot with confirmed relay state.
    pub fn reconcile(&self, posts: Vec<Event>, approvals: Vec<PostApproval>) {
        *self.snapshot.lock() = Arc::new(ModerationSnapshot { posts, approvals });
    }

    /// Reload posts and approvals and reconcile. Returns `false` when a newer
    /// refresh started meanwhile and this result was dropped.
    pub async fn refresh(&self) -> bool {
        let ticket = self.sequence.begin();
        let (posts, approvals) = futures::join!(
            self.service.load_post_events(&self.discussion.id),
            self.service.load_approvals(&self.discussion.id)
        );
        if !ticket.is_current() {
            return false;
        }
        self.reconcile(posts, approvals);
        true
    }

    fn moderator_signer(&self) -> Result<&Arc<dyn Signer>, ModerationError> {
        let signer = self.signer.as_ref().ok_or(ModerationError::NotLoggedIn)?;
        if !self.can_moderate() {
            return Err(ModerationError::Unauthorized(signer.pubkey().to_string()));
        }
        Ok(signer)
    }

    /// Approve a post as the logged-in moderator.
    ///
    /// # Errors
    ///
    /// Nothing changes locally on error.
    pub async fn approve(&self, post_id: &str) -> Result<Event, ModerationError> {
        let signer = self.moderator_signer()?;
        let snapshot = self.snapshot();
        let post = snapshot
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .ok_or_else(|| ModerationError::PostNotFound(post_id.to_string()))?;
        if snapshot
            .approvals
            .iter()
            .any(|a| a.post_id == post_id && a.moderator_pubkey == signer.pubkey())
        {
            return Err(ModerationError::AlreadyApproved(post_id.to_string()));
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, Action::Approve, post_id)?;
        let template = create_approval_event(post, &self.discussion.id, unix_now())?;
        let event = signer.sign(template).await.inspect_err(|e| {
            warn!("Signing approval of {} failed: {}", post_id, e);
        })?;

        if !self.service.publish(&event).await {
            warn!("Approval {} of post {} was not accepted by any relay", event.id, post_id);
            return Err(ModerationError::PublishRejected(event.id));
        }

        if let Some(approval) = parse_approval_event(&event) {
            let mut current = self.snapshot.lock();
            *current = Arc::new(current.with_approval(approval));
        }
        info!("Approved post {} in {}", post_id, self.discussion.id);
        Ok(event)
    }

    /// Revoke the logged-in moderator's own approval of a post.
    ///
    /// Returns `Ok(None)` without signing or publishing anything when the user
    /// holds no approval on the post. Approvals by other moderators are never
    /// touched.
    pub async fn revoke(&self, post_id: &str) -> Result<Option<Event>, ModerationError> {
        let signer = self.signer.as_ref().ok_or(ModerationError::NotLoggedIn)?;
        let own: Vec<String> = self
            .snapshot()
            .approvals
            .iter()
            .filter(|a| a.post_id == post_id && a.moderator_pubkey == signer.pubkey())
            .map(|a| a.id.clone())
            .collect();
        if own.is_empty() {
            info!("{} holds no approval on {}, nothing to revoke", signer.pubkey(), post_id);
            return Ok(None);
        }

        let _guard = InFlightGuard::acquire(&self.in_flight, Action::Revoke, post_id)?;
        let template = create_delete_event(&own, REVOKE_REASON, unix_now())?;
        let event = signer.sign(template).await.inspect_err(|e| {
            warn!("Signing revocation on {} failed: {}", post_id, e);
        })?;

        if !self.service.publish(&event).await {
            warn!("Revocation {} on post {} was not accepted by any relay", event.id, post_id);
            return Err(ModerationError::PublishRejected(event.id));
        }

        {
            let mut current = self.snapshot.lock();
            *current = Arc::new(current.without_approvals(&own));
        }
        info!("Revoked {} approval(s) on post {}", own.len(), post_id);
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::parsers::parse_discussion_event;
    use crate::signer::testing::TestSigner;
    use nostr_client::{MemoryRelay, PoolConfig, RelayPool};
    use pretty_assertions::assert_eq;

    const DISCUSSION: &str = "34550:A:tag";

    fn tag(name: &str, value: &str) -> Vec<String> {
        vec![name.to_string(), value.to_string()]
    }

    fn discussion() -> Discussion {
        parse_discussion_event(&Event {
            id: "disc".to_string(),
            pubkey: "A".to_string(),
            created_at: 1,
            kind: 34550,
            tags: vec![
                tag("d", "tag"),
                vec!["p".into(), "M".into(), "".into(), "moderator".into()],
                vec!["p".into(), "M2".into(), "".into(), "moderator".into()],
            ],
            content: String::new(),
            sig: String::new(),
        })
        .unwrap()
    }

    fn post_event() -> Event {
        Event {
            id: "p1".to_string(),
            pubkey: "author1".to_string(),
            created_at: 100,
            kind: 1111,
            tags: vec![tag("A", DISCUSSION), tag("a", DISCUSSION)],
            content: "shelter is missing".to_string(),
            sig: "sig".to_string(),
        }
    }

    fn controller(
        relay: &Arc<MemoryRelay>,
        signer: Option<Arc<TestSigner>>,
    ) -> ModerationController {
        let pool =
            RelayPool::empty(PoolConfig::default()).with_transport(relay.clone(), true, true);
        let service = NostrService::new(Arc::new(pool), ServiceConfig::default().admin("admin"));
        let controller = ModerationController::new(
            service,
            discussion(),
            signer.map(|s| s as Arc<dyn Signer>),
        );
        controller.reconcile(vec![post_event()], vec![]);
        controller
    }

    #[tokio::test]
    async fn test_approve_then_revoke() {
        let relay = Arc::new(MemoryRelay::new("mem://a"));
        let signer = Arc::new(TestSigner::new("M"));
        let controller = controller(&relay, Some(signer.clone()));
        assert_eq!(controller.status("p1"), Some(ModerationStatus::Pending));

        let approval = controller.approve("p1").await.unwrap();
        assert_eq!(approval.kind, 4550);
        assert_eq!(controller.status("p1"), Some(ModerationStatus::Approved));
        assert_eq!(controller.approved_posts()[0].approved_by, vec!["M"]);
        assert!(!controller.is_approving("p1"));

        assert!(matches!(
            controller.approve("p1").await,
            Err(ModerationError::AlreadyApproved(_))
        ));

        let deletion = controller.revoke("p1").await.unwrap().unwrap();
        assert_eq!(deletion.kind, 5);
        assert_eq!(deletion.tag_values("e"), vec![approval.id.as_str()]);
        assert_eq!(controller.status("p1"), Some(ModerationStatus::Pending));
        assert_eq!(relay.published().len(), 2);
    }

    #[tokio::test]
    async fn test_revoke_without_ownership_is_noop() {
        let relay = Arc::new(MemoryRelay::new("mem://a"));
        let m1 = Arc::new(TestSigner::new("M"));
        controller(&relay, Some(m1)).approve("p1").await.unwrap();
        let approvals: Vec<PostApproval> = relay
            .published()
            .iter()
            .filter_map(parse_approval_event)
            .collect();

        let m2 = Arc::new(TestSigner::new("M2"));
        let controller = controller(&relay, Some(m2.clone()));
        controller.reconcile(vec![post_event()], approvals);

        assert_eq!(controller.revoke("p1").await.unwrap(), None);
        assert_eq!(m2.signed(), 0);
        assert_eq!(relay.published().len(), 1);
        assert_eq!(controller.status("p1"), Some(ModerationStatus::Approved));
    }

    #[tokio::test]
    async fn test_authorization() {
        let relay = Arc::new(MemoryRelay::new("mem://a"));

        assert!(matches!(
            controller(&relay, None).approve("p1").await,
            Err(ModerationError::NotLoggedIn)
        ));
        assert!(matches!(
            controller(&relay, Some(Arc::new(TestSigner::new("stranger")))).approve("p1").await,
            Err(ModerationError::Unauthorized(_))
        ));

        let admin = controller(&relay, Some(Arc::new(TestSigner::new("admin"))));
        assert!(admin.can_moderate());
        admin.approve("p1").await.unwrap();

        assert!(matches!(
            admin.approve("missing").await,
            Err(ModerationError::PostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_state_and_clears_marker() {
        let relay = Arc::new(MemoryRelay::new("mem://a"));
        relay.set_reject_publishes(true);
        let signer = Arc::new(TestSigner::new("M"));
        let controller = controller(&relay, Some(signer.clone()));

        assert!(matches!(
            controller.approve("p1").await,
            Err(ModerationError::PublishRejected(_))
        ));
        assert_eq!(controller.status("p1"), Some(ModerationStatus::Pending));
        assert!(!controller.is_approving("p1"));

        relay.set_reject_publishes(false);
        signer.refuse(true);
        assert!(matches!(
            controller.approve("p1").await,
            Err(ModerationError::Signing(SignerError::Cancelled))
        ));
        assert!(!controller.is_approving("p1"));
        assert!(controller.snapshot().approvals.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let relay = Arc::new(MemoryRelay::new("mem://a"));
        let signer = Arc::new(TestSigner::new("M"));
        let controller = controller(&relay, Some(signer));

        // The post was only known locally; relays have nothing yet.
        assert!(controller.refresh().await);
        assert!(controller.posts().is_empty());

        relay.push(post_event());
        assert!(controller.refresh().await);
        assert_eq!(controller.pending_posts().len(), 1);
    }

    #[test]
    fn test_in_flight_guard_clears_on_drop() {
        let in_flight = Arc::new(Mutex::new(InFlight::default()));
        {
            let _guard = InFlightGuard::acquire(&in_flight, Action::Approve, "p1").unwrap();
            assert!(matches!(
                InFlightGuard::acquire(&in_flight, Action::Revoke, "p1"),
                Err(ModerationError::InFlight(_))
            ));
        }
        assert!(in_flight.lock().approving.is_empty());
        assert!(InFlightGuard::acquire(&in_flight, Action::Revoke, "p1").is_ok());
    }
}
