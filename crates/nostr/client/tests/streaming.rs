//! Streaming retrieval against in-process relays.

use async_trait::async_trait;
use nostr::Event;
use nostr_client::{
    Filter, MemoryRelay, PoolConfig, PublishConfirmation, RelayPool, RelayTransport, StreamOptions,
    StreamUpdate, SubscriptionMessage, get_events_on_eose, stream_events_on_event,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn note(id: &str, created_at: u64, content: &str) -> Event {
    Event {
        id: id.to_string(),
        pubkey: "author".to_string(),
        created_at,
        kind: 1,
        tags: vec![],
        content: content.to_string(),
        sig: String::new(),
    }
}

fn ids(events: &[Event]) -> Vec<&str> {
    events.iter().map(|e| e.id.as_str()).collect()
}

/// A relay that never answers, like a host black-holing the connection.
struct StalledRelay {
    url: String,
}

impl StalledRelay {
    fn new(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl RelayTransport for StalledRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn subscribe(
        &self,
        _subscription_id: &str,
        _filters: &[Filter],
    ) -> nostr_client::Result<mpsc::UnboundedReceiver<SubscriptionMessage>> {
        futures::future::pending().await
    }

    async fn unsubscribe(&self, _subscription_id: &str) -> nostr_client::Result<()> {
        Ok(())
    }

    async fn publish(
        &self,
        _event: &Event,
        _timeout: Duration,
    ) -> nostr_client::Result<PublishConfirmation> {
        futures::future::pending().await
    }
}

fn pool_of(relays: &[Arc<MemoryRelay>]) -> RelayPool {
    relays.iter().fold(RelayPool::empty(PoolConfig::default()), |pool, relay| {
        pool.with_transport(relay.clone(), true, true)
    })
}

#[tokio::test]
async fn test_get_events_on_eose_sorted_and_deduplicated() {
    init_tracing();
    let a = Arc::new(MemoryRelay::with_events(
        "mem://a",
        vec![note("x", 100, "first"), note("y", 300, "")],
    ));
    let b = Arc::new(MemoryRelay::with_events(
        "mem://b",
        vec![note("x", 100, "second"), note("z", 200, "")],
    ));
    let pool = pool_of(&[a, b]);

    let events = get_events_on_eose(&pool, &[Filter::new().kinds(vec![1])]).await;

    assert_eq!(ids(&events), vec!["y", "z", "x"]);
    assert_eq!(events[2].content, "first");
}

#[tokio::test]
async fn test_stream_delivers_each_new_event_then_single_eose() {
    init_tracing();
    let relay = Arc::new(MemoryRelay::with_events(
        "mem://a",
        vec![note("a", 100, ""), note("b", 200, "")],
    ));
    let duplicate = Arc::new(MemoryRelay::with_events("mem://b", vec![note("a", 100, "")]));
    let pool = pool_of(&[relay.clone(), duplicate]);

    let mut stream =
        stream_events_on_event(&pool, vec![Filter::new().kinds(vec![1])], StreamOptions::default())
            .await;

    let mut new_ids = Vec::new();
    let eose_events = loop {
        match stream.next().await {
            Some(StreamUpdate::Event { events, new_event }) => {
                assert!(events.iter().any(|e| e.id == new_event.id));
                new_ids.push(new_event.id);
            }
            Some(StreamUpdate::Eose { events }) => break events,
            None => panic!("stream ended before EOSE"),
        }
    };

    new_ids.sort();
    assert_eq!(new_ids, vec!["a", "b"]);
    assert_eq!(ids(&eose_events), vec!["b", "a"]);

    // Live tail keeps going after the catch-up boundary
    relay.push(note("c", 300, ""));
    match stream.next().await {
        Some(StreamUpdate::Event { events, new_event }) => {
            assert_eq!(new_event.id, "c");
            assert_eq!(ids(&events), vec!["c", "b", "a"]);
        }
        other => panic!("expected live event, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_stream_timeout_forces_eose_and_closes() {
    init_tracing();
    let relay = Arc::new(MemoryRelay::with_events("mem://silent", vec![note("a", 1, "")]));
    relay.set_silent(true);
    let pool = pool_of(&[relay.clone()]);

    let started = tokio::time::Instant::now();
    let mut stream = stream_events_on_event(
        &pool,
        vec![Filter::new()],
        StreamOptions::with_timeout(Duration::from_millis(300)),
    )
    .await;

    let mut eose_count = 0;
    while let Some(update) = stream.next().await {
        if let StreamUpdate::Eose { events } = update {
            eose_count += 1;
            assert_eq!(ids(&events), vec!["a"]);
        }
    }

    assert_eq!(eose_count, 1);
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(relay.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_stream_eose_before_timeout_keeps_subscription_open() {
    init_tracing();
    let relay = Arc::new(MemoryRelay::new("mem://a"));
    let pool = pool_of(&[relay.clone()]);

    let mut stream =
        stream_events_on_event(&pool, vec![Filter::new()], StreamOptions::default()).await;
    assert_eq!(stream.next().await, Some(StreamUpdate::Eose { events: vec![] }));
    assert_eq!(relay.active_subscriptions(), 1);
}

#[tokio::test]
async fn test_cancel_closes_subscription() {
    init_tracing();
    let relay = Arc::new(MemoryRelay::new("mem://a"));
    let pool = pool_of(&[relay.clone()]);

    let stream =
        stream_events_on_event(&pool, vec![Filter::new()], StreamOptions::default()).await;
    for _ in 0..50 {
        if relay.opened_subscriptions() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(relay.opened_subscriptions(), 1);

    stream.cancel();
    stream.cancel();
    drop(stream);

    for _ in 0..50 {
        if relay.active_subscriptions() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(relay.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_collect_until_eose() {
    init_tracing();
    let relay = Arc::new(MemoryRelay::with_events(
        "mem://a",
        vec![note("a", 1, ""), note("b", 2, "")],
    ));
    let pool = pool_of(&[relay]);

    let stream =
        stream_events_on_event(&pool, vec![Filter::new()], StreamOptions::default()).await;
    assert_eq!(ids(&stream.collect_until_eose().await), vec!["b", "a"]);
}

#[tokio::test]
async fn test_stream_updates_step_by_step_and_ignores_redelivery() {
    init_tracing();
    let first = Arc::new(MemoryRelay::new("mem://a"));
    let second = Arc::new(MemoryRelay::new("mem://b"));
    let pool = pool_of(&[first.clone(), second.clone()]);

    let mut stream =
        stream_events_on_event(&pool, vec![Filter::new()], StreamOptions::default()).await;
    assert_eq!(stream.next().await, Some(StreamUpdate::Eose { events: vec![] }));

    let a = note("a", 100, "");
    let b = note("b", 200, "");
    let c = note("c", 300, "");

    first.push(a.clone());
    assert_eq!(
        stream.next().await,
        Some(StreamUpdate::Event {
            events: vec![a.clone()],
            new_event: a.clone(),
        })
    );

    second.push(b.clone());
    assert_eq!(
        stream.next().await,
        Some(StreamUpdate::Event {
            events: vec![b.clone(), a.clone()],
            new_event: b.clone(),
        })
    );

    // The second relay sends `a` too; only `c` is news
    second.push(a.clone());
    first.push(c.clone());
    assert_eq!(
        stream.next().await,
        Some(StreamUpdate::Event {
            events: vec![c.clone(), b, a],
            new_event: c,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_stalled_relay_does_not_delay_eose_past_timeout() {
    init_tracing();
    let healthy = Arc::new(MemoryRelay::with_events("mem://up", vec![note("a", 1, "")]));
    let pool = RelayPool::empty(PoolConfig::default())
        .with_transport(StalledRelay::new("mem://stalled"), true, true)
        .with_transport(healthy.clone(), true, true);

    let started = Instant::now();
    let mut stream = stream_events_on_event(
        &pool,
        vec![Filter::new()],
        StreamOptions::with_timeout(Duration::from_millis(300)),
    )
    .await;

    // The healthy relay's events are not held back by the stalled one
    match stream.next().await {
        Some(StreamUpdate::Event { new_event, .. }) => assert_eq!(new_event.id, "a"),
        other => panic!("expected an event, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_millis(300));

    match stream.next().await {
        Some(StreamUpdate::Eose { events }) => assert_eq!(ids(&events), vec!["a"]),
        other => panic!("expected EOSE, got {:?}", other),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(400), "EOSE after {:?}", elapsed);

    assert_eq!(stream.next().await, None);
    assert_eq!(healthy.active_subscriptions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout_covers_stalled_subscribe() {
    init_tracing();
    let stalled = StalledRelay::new("mem://stalled");
    let started = Instant::now();
    let events = stalled
        .query(&Filter::new(), Duration::from_millis(200))
        .await
        .unwrap();
    assert!(events.is_empty());
    assert!(started.elapsed() < Duration::from_millis(300));

    let config = PoolConfig {
        query_timeout: Duration::from_millis(200),
        ..PoolConfig::default()
    };
    let pool = RelayPool::empty(config)
        .with_transport(stalled, true, true)
        .with_transport(
            Arc::new(MemoryRelay::with_events("mem://up", vec![note("x", 1, "")])),
            true,
            true,
        );

    let started = Instant::now();
    let events = get_events_on_eose(&pool, &[Filter::new()]).await;
    assert_eq!(ids(&events), vec!["x"]);
    assert!(started.elapsed() < Duration::from_millis(300));
}
