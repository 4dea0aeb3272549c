//! Bus-stop memo driven by live streams.

mod common;

use common::{event, init_tracing, service};
use discussions::{MemoController, MemoView, parse_discussion_event};
use nostr_client::MemoryRelay;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::watch;

const DISCUSSION: &str = "34550:A:tag";

fn seeded_relay() -> Arc<MemoryRelay> {
    Arc::new(MemoryRelay::with_events(
        "mem://a",
        vec![
            event("p1", "u1", 1111, 10, &[&["a", DISCUSSION], &["t", "stop-1"]], "old memo"),
            event("p2", "u2", 1111, 20, &[&["a", DISCUSSION], &["t", "stop-1"]], "newer memo"),
            event("ap1", "M1", 4550, 30, &[&["a", DISCUSSION], &["e", "p1"]], ""),
        ],
    ))
}

fn discussion() -> discussions::Discussion {
    parse_discussion_event(&event(
        "disc",
        "A",
        34550,
        1,
        &[&["d", "tag"], &["p", "M1", "", "moderator"]],
        "",
    ))
    .unwrap()
}

async fn wait_for(
    rx: &mut watch::Receiver<MemoView>,
    done: impl Fn(&MemoView) -> bool,
) -> MemoView {
    loop {
        if done(&rx.borrow_and_update()) {
            return rx.borrow().clone();
        }
        rx.changed().await.unwrap();
    }
}

#[tokio::test]
async fn test_memo_follows_approvals_and_votes() {
    init_tracing();
    let relay = seeded_relay();
    let controller = MemoController::new(service(&[relay.clone()]));
    let mut views = controller.subscribe();

    controller.load(&discussion(), "stop-1").await;
    let view = wait_for(&mut views, |v| v.complete).await;
    assert_eq!(view.posts.len(), 2);
    assert_eq!(view.memo.unwrap().post.id, "p1");

    // A second approval plus an upvote lifts p2 above p1
    relay.push(event("ap2", "M1", 4550, 40, &[&["a", DISCUSSION], &["e", "p2"]], ""));
    let tags: &[&[&str]] = &[&["e", "p2"], &["rating", "+"], &["a", DISCUSSION]];
    relay.push(event("ev1", "u9", 7, 50, tags, "+"));
    let view = wait_for(&mut views, |v| v.memo.as_ref().is_some_and(|m| m.post.id == "p2")).await;
    assert_eq!(view.posts[0].score, 1);

    // Revoking p2's approval brings p1 back
    relay.push(event("del", "M1", 5, 60, &[&["e", "ap2"]], ""));
    let view = wait_for(&mut views, |v| v.memo.as_ref().is_some_and(|m| m.post.id == "p1")).await;
    assert!(!view.posts.iter().find(|p| p.post.id == "p2").unwrap().post.approved);
}

#[tokio::test]
async fn test_reload_cancels_previous_streams() {
    init_tracing();
    let relay = seeded_relay();
    let controller = MemoController::new(service(&[relay.clone()]));
    let mut views = controller.subscribe();

    controller.load(&discussion(), "stop-1").await;
    wait_for(&mut views, |v| v.complete).await;
    // Posts, approvals, both evaluation streams and deletions
    assert_eq!(relay.active_subscriptions(), 5);

    controller.load(&discussion(), "stop-2").await;
    let view = wait_for(&mut views, |v| v.complete).await;
    assert!(view.posts.is_empty());
    assert!(view.memo.is_none());

    for _ in 0..50 {
        if relay.active_subscriptions() == 4 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    // stop-2 has no posts, so there is nothing to follow evaluations of
    assert_eq!(relay.active_subscriptions(), 4);
    assert_eq!(relay.opened_subscriptions(), 9);

    controller.cancel();
    for _ in 0..50 {
        if relay.active_subscriptions() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(relay.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_memo_counts_votes_without_discussion_tag() {
    init_tracing();
    let relay = seeded_relay();
    relay.store(event("ap2", "M1", 4550, 30, &[&["a", DISCUSSION], &["e", "p2"]], ""));
    relay.store(event("ev1", "u9", 7, 40, &[&["e", "p2"], &["rating", "+"]], "+"));
    let controller = MemoController::new(service(&[relay.clone()]));
    let mut views = controller.subscribe();

    controller.load(&discussion(), "stop-1").await;
    let view = wait_for(&mut views, |v| v.complete).await;
    let memo = view.memo.unwrap();
    assert_eq!(memo.post.id, "p2");
    assert_eq!(memo.score, 1);

    // A live vote on p1 without a discussion tag still counts
    relay.push(event("ev2", "u8", 7, 50, &[&["e", "p1"], &["rating", "+"]], "+"));
    relay.push(event("ev3", "u7", 7, 51, &[&["e", "p1"], &["rating", "+"]], "+"));
    let view = wait_for(&mut views, |v| v.memo.as_ref().is_some_and(|m| m.post.id == "p1")).await;
    assert_eq!(view.posts[0].score, 2);
}
