//! Community memo for a bus stop.
//!
//! The memo is the best-scored approved post tagged with a stop. Its inputs
//! come from independent streams (posts, approvals, evaluations and the
//! moderators' deletions) that may update in any order, so the view is always
//! recomputed from the latest snapshot of each via [`update_from_events`].
//!
//! Evaluations arrive on two streams: those tagged with the discussion, and
//! those referencing one of the stop's posts. The second one is opened once
//! the posts have caught up and reopened whenever the set of posts changes.

use crate::aggregate::{
    build_posts, combine_posts_with_stats, community_memo, exclude_revoked_approvals,
    sort_posts_by_score,
};
use crate::load::{LoadSequence, LoadTicket};
use crate::parsers::{parse_approval_event, parse_deletion_event, parse_evaluation_event};
use crate::service::NostrService;
use crate::types::{DeletionRequest, Discussion, PostApproval, PostEvaluation, PostWithStats};
use nostr::{Event, dedup_events};
use nostr_client::{EventStream, StreamUpdate};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Latest event snapshots of the memo streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoInputs {
    pub posts: Vec<Event>,
    pub approvals: Vec<Event>,
    pub evaluations: Vec<Event>,
    pub deletions: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoView {
    /// Posts for the stop, best first.
    pub posts: Vec<PostWithStats>,
    /// The community memo, if any post for the stop is approved.
    pub memo: Option<PostWithStats>,
    /// Every stream has passed its catch-up boundary.
    pub complete: bool,
}

/// Recompute the memo view from scratch. Same inputs, same view.
pub fn update_from_events(inputs: &MemoInputs, bus_stop_tag: &str) -> MemoView {
    let deletions: Vec<DeletionRequest> =
        inputs.deletions.iter().filter_map(parse_deletion_event).collect();
    let approvals: Vec<PostApproval> = inputs
        .approvals
        .iter()
        .filter_map(parse_approval_event)
        .collect();
    let approvals = exclude_revoked_approvals(&approvals, &deletions);
    let evaluations: Vec<PostEvaluation> = inputs
        .evaluations
        .iter()
        .filter_map(parse_evaluation_event)
        .collect();

    let posts: Vec<_> = build_posts(&inputs.posts, &approvals)
        .into_iter()
        .filter(|p| p.bus_stop_tag.as_deref() == Some(bus_stop_tag))
        .collect();
    let posts = sort_posts_by_score(&combine_posts_with_stats(&posts, &evaluations));
    let memo = community_memo(&posts, bus_stop_tag);

    MemoView {
        posts,
        memo,
        complete: false,
    }
}

#[derive(Default)]
struct StreamCache {
    events: Vec<Event>,
    complete: bool,
}

impl StreamCache {
    fn apply(&mut self, update: StreamUpdate) {
        match update {
            StreamUpdate::Event { events, .. } => self.events = events,
            StreamUpdate::Eose { events } => {
                self.events = events;
                self.complete = true;
            }
        }
    }

    /// Like `apply`, but keeps events from an earlier stream of the same kind.
    fn merge(&mut self, update: StreamUpdate) {
        let previous = std::mem::take(&mut self.events);
        self.apply(update);
        let current = std::mem::take(&mut self.events);
        self.events = dedup_events(current.into_iter().chain(previous));
    }
}

struct MemoStreams {
    posts: EventStream,
    approvals: EventStream,
    evaluations: EventStream,
    deletions: EventStream,
    /// Evaluations by post id, once the posts caught up.
    evaluations_by_post: Option<EventStream>,
}

async fn next_update(stream: &mut Option<EventStream>) -> Option<StreamUpdate> {
    match stream {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}

/// Keeps the memo view of one stop up to date.
pub struct MemoController {
    service: NostrService,
    sequence: LoadSequence,
    view_tx: watch::Sender<MemoView>,
    active: Mutex<Option<JoinHandle<()>>>,
}

impl MemoController {
    pub fn new(service: NostrService) -> Self {
        let (view_tx, _) = watch::channel(MemoView::default());
        Self {
            service,
            sequence: LoadSequence::new(),
            view_tx,
            active: Mutex::new(None),
        }
    }

    /// Receiver of every recomputed view.
    pub fn subscribe(&self) -> watch::Receiver<MemoView> {
        self.view_tx.subscribe()
    }

    pub fn view(&self) -> MemoView {
        self.view_tx.borrow().clone()
    }

    /// Start following `bus_stop_tag` in `discussion`, replacing any earlier load.
    pub async fn load(&self, discussion: &Discussion, bus_stop_tag: &str) {
        let ticket = self.sequence.begin();
        self.stop_active();
        self.view_tx.send_replace(MemoView::default());

        let mut moderators = discussion.moderator_pubkeys();
        if let Some(admin) = self.service.admin_pubkey()
            && !moderators.iter().any(|m| m == admin)
        {
            moderators.push(admin.to_string());
        }

        let (posts, approvals, evaluations, deletions) = futures::join!(
            self.service.stream_posts(&discussion.id, Some(bus_stop_tag)),
            self.service.stream_approvals(&discussion.id),
            self.service.stream_evaluations(&discussion.id),
            self.service.stream_deletions(&moderators),
        );
        let streams = MemoStreams {
            posts,
            approvals,
            evaluations,
            deletions,
            evaluations_by_post: None,
        };

        if !ticket.is_current() {
            debug!("Memo load for {} superseded before it started", bus_stop_tag);
            return;
        }
        let task = tokio::spawn(drive(
            self.service.clone(),
            ticket,
            bus_stop_tag.to_string(),
            streams,
            self.view_tx.clone(),
        ));
        if let Some(previous) = self.active.lock().replace(task) {
            previous.abort();
        }
    }

    /// Stop following. The last view stays readable.
    pub fn cancel(&self) {
        self.sequence.invalidate();
        self.stop_active();
    }

    fn stop_active(&self) {
        if let Some(task) = self.active.lock().take() {
            task.abort();
        }
    }
}

impl Drop for MemoController {
    fn drop(&mut self) {
        self.stop_active();
    }
}

async fn drive(
    service: NostrService,
    ticket: LoadTicket,
    tag: String,
    mut streams: MemoStreams,
    view_tx: watch::Sender<MemoView>,
) {
    let mut posts = StreamCache::default();
    let mut approvals = StreamCache::default();
    let mut evaluations = StreamCache::default();
    let mut evaluations_by_post = StreamCache::default();
    let mut deletions = StreamCache::default();
    let mut evaluated_posts: Option<Vec<String>> = None;

    loop {
        tokio::select! {
            Some(update) = streams.posts.next() => posts.apply(update),
            Some(update) = streams.approvals.next() => approvals.apply(update),
            Some(update) = streams.evaluations.next() => evaluations.apply(update),
            Some(update) = next_update(&mut streams.evaluations_by_post),
                if streams.evaluations_by_post.is_some() => evaluations_by_post.merge(update),
            Some(update) = streams.deletions.next() => deletions.apply(update),
            else => break,
        }

        if !ticket.is_current() {
            break;
        }

        if posts.complete {
            let post_ids: Vec<String> = posts.events.iter().map(|e| e.id.clone()).collect();
            if evaluated_posts.as_ref() != Some(&post_ids) {
                debug!("Following evaluations of {} posts for {}", post_ids.len(), tag);
                evaluations_by_post.complete = false;
                streams.evaluations_by_post =
                    Some(service.stream_evaluations_for_posts(&post_ids).await);
                evaluated_posts = Some(post_ids);
            }
        }

        let inputs = MemoInputs {
            posts: posts.events.clone(),
            approvals: approvals.events.clone(),
            evaluations: dedup_events(
                evaluations
                    .events
                    .iter()
                    .chain(&evaluations_by_post.events)
                    .cloned(),
            ),
            deletions: deletions.events.clone(),
        };
        let mut view = update_from_events(&inputs, &tag);
        view.complete = posts.complete
            && approvals.complete
            && evaluations.complete
            && evaluations_by_post.complete
            && deletions.complete;
        view_tx.send_replace(view);
    }
    debug!("Memo streams for {} finished", tag);
}
