//! Aggregation of parsed events into views.
//!
//! All functions take their inputs by reference and return fresh values, so
//! they can be re-run on every streaming update with whatever partial data is
//! cached at that moment.

use crate::parsers::{parse_discussion_event, parse_post_event};
use crate::types::{
    DeletionRequest, Discussion, DiscussionPost, PostApproval, PostEvaluation, PostWithStats,
    Rating,
};
use nostr::{Event, KIND_COMMUNITY_DEFINITION};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Parse every post event against `approvals`, skipping invalid ones.
pub fn build_posts(post_events: &[Event], approvals: &[PostApproval]) -> Vec<DiscussionPost> {
    post_events
        .iter()
        .filter_map(|event| parse_post_event(event, approvals))
        .collect()
}

/// Keep only the latest evaluation of each evaluator on each post.
fn current_votes(evaluations: &[PostEvaluation]) -> HashMap<(&str, &str), &PostEvaluation> {
    let mut votes: HashMap<(&str, &str), &PostEvaluation> = HashMap::new();
    for evaluation in evaluations {
        let key = (evaluation.post_id.as_str(), evaluation.evaluator_pubkey.as_str());
        match votes.get(&key) {
            Some(existing) if existing.created_at >= evaluation.created_at => {}
            _ => {
                votes.insert(key, evaluation);
            }
        }
    }
    votes
}

/// Attach evaluation counts to each post.
///
/// `score` is positive minus negative votes. An evaluator's later vote on the
/// same post replaces the earlier one.
pub fn combine_posts_with_stats(
    posts: &[DiscussionPost],
    evaluations: &[PostEvaluation],
) -> Vec<PostWithStats> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for evaluation in current_votes(evaluations).into_values() {
        let entry = counts.entry(evaluation.post_id.as_str()).or_default();
        match evaluation.rating {
            Rating::Plus => entry.0 += 1,
            Rating::Minus => entry.1 += 1,
        }
    }

    posts
        .iter()
        .map(|post| {
            let (positive, negative) = counts.get(post.id.as_str()).copied().unwrap_or_default();
            PostWithStats {
                post: post.clone(),
                score: positive as i64 - negative as i64,
                positive,
                negative,
                total: positive + negative,
            }
        })
        .collect()
}

/// Sort by score descending, then by creation time descending.
pub fn sort_posts_by_score(posts: &[PostWithStats]) -> Vec<PostWithStats> {
    let mut sorted = posts.to_vec();
    sorted.sort_by_key(|p| (Reverse(p.score), Reverse(p.post.created_at)));
    sorted
}

/// The highest ranked approved post carrying `tag`.
pub fn community_memo(posts: &[PostWithStats], tag: &str) -> Option<PostWithStats> {
    sort_posts_by_score(posts)
        .into_iter()
        .find(|p| p.post.approved && p.post.bus_stop_tag.as_deref() == Some(tag))
}

/// The current vote of `pubkey` on `post_id`.
pub fn user_rating(evaluations: &[PostEvaluation], post_id: &str, pubkey: &str) -> Option<Rating> {
    current_votes(evaluations)
        .get(&(post_id, pubkey))
        .map(|evaluation| evaluation.rating)
}

/// The newest discussion event in `events`.
///
/// Callers pass versions of a single discussion; ties keep the first seen.
pub fn pick_latest_discussion(events: &[Event]) -> Option<Discussion> {
    let mut latest: Option<&Event> = None;
    for event in events.iter().filter(|e| e.kind == KIND_COMMUNITY_DEFINITION) {
        if latest.is_none_or(|l| event.created_at > l.created_at) {
            latest = Some(event);
        }
    }
    latest.and_then(parse_discussion_event)
}

/// One discussion per coordinate, the newest version winning, newest first.
pub fn latest_discussions(events: &[Event]) -> Vec<Discussion> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Discussion> = HashMap::new();
    for discussion in events.iter().filter_map(parse_discussion_event) {
        match by_id.get(&discussion.id) {
            Some(existing) if existing.created_at >= discussion.created_at => {}
            Some(_) => {
                by_id.insert(discussion.id.clone(), discussion);
            }
            None => {
                order.push(discussion.id.clone());
                by_id.insert(discussion.id.clone(), discussion);
            }
        }
    }

    let mut discussions: Vec<Discussion> =
        order.into_iter().filter_map(|id| by_id.remove(&id)).collect();
    discussions.sort_by_key(|d| Reverse(d.created_at));
    discussions
}

/// Drop approvals deleted by the moderator who made them.
pub fn exclude_revoked_approvals(
    approvals: &[PostApproval],
    deletions: &[DeletionRequest],
) -> Vec<PostApproval> {
    approvals
        .iter()
        .filter(|approval| {
            !deletions
                .iter()
                .any(|d| d.deletes_event(&approval.id, &approval.moderator_pubkey))
        })
        .cloned()
        .collect()
}

/// Drop discussions deleted by their author, by coordinate or by event id.
pub fn exclude_deleted_discussions(
    discussions: &[Discussion],
    deletions: &[DeletionRequest],
) -> Vec<Discussion> {
    discussions
        .iter()
        .filter(|discussion| {
            !deletions.iter().any(|d| {
                d.deletes_address(&discussion.id, &discussion.author_pubkey)
                    || d.deletes_event(&discussion.event.id, &discussion.author_pubkey)
            })
        })
        .cloned()
        .collect()
}
