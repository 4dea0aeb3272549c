//! Streaming retrieval
//!
//! Two ways to read from the pool:
//!
//! - [`get_events_on_eose`]: one-shot, resolves once every relay finished (or
//!   timed out) with the merged, newest-first result.
//! - [`stream_events_on_event`]: incremental. Each previously unseen event is
//!   reported together with a snapshot of everything gathered so far. The
//!   catch-up boundary is reported exactly once, either when every relay sent
//!   EOSE or when the timeout forces it. The subscription stays open afterwards
//!   so live events keep arriving until the stream is cancelled or dropped.

use crate::message::Filter;
use crate::pool::{PoolNotification, RelayPool};
use futures::Stream;
use nostr::{Event, sort_events};
use std::collections::HashSet;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Default time allowed for relays to report end of stored events.
pub const DEFAULT_STREAM_TIMEOUT: Duration = Duration::from_millis(5000);

/// Streaming options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// After this long the stream reports the catch-up boundary (if it has not
    /// already) and closes the subscription.
    pub timeout: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_STREAM_TIMEOUT,
        }
    }
}

impl StreamOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// One step of an event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// A previously unseen event arrived. `events` is the full snapshot,
    /// newest first, including `new_event`.
    Event { events: Vec<Event>, new_event: Event },
    /// Stored events are exhausted (or the timeout hit). Sent once per stream.
    Eose { events: Vec<Event> },
}

impl StreamUpdate {
    /// The snapshot carried by this update.
    pub fn events(&self) -> &[Event] {
        match self {
            StreamUpdate::Event { events, .. } | StreamUpdate::Eose { events } => events,
        }
    }

    pub fn is_eose(&self) -> bool {
        matches!(self, StreamUpdate::Eose { .. })
    }
}

/// Deduplicating, newest-first event collection.
#[derive(Debug, Clone, Default)]
pub struct EventAccumulator {
    seen: HashSet<String>,
    events: Vec<Event>,
}

impl EventAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an event. Returns `false` if its id was already present.
    ///
    /// Events sharing a timestamp keep their arrival order.
    pub fn insert(&mut self, event: Event) -> bool {
        if !self.seen.insert(event.id.clone()) {
            return false;
        }
        let pos = self
            .events
            .partition_point(|e| e.created_at >= event.created_at);
        self.events.insert(pos, event);
        true
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.clone()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

/// Cancels the stream it was taken from. Cloneable and idempotent.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl StreamHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                cancel_tx: Arc::new(cancel_tx),
            },
            cancel_rx,
        )
    }

    /// Stop delivering updates and close the underlying subscription.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }
}

/// Stream of [`StreamUpdate`]s. Dropping it cancels the subscription.
pub struct EventStream {
    updates: mpsc::UnboundedReceiver<StreamUpdate>,
    handle: StreamHandle,
}

impl EventStream {
    /// A stream that reports `events` as already complete, without touching any relay.
    pub fn completed(events: Vec<Event>) -> Self {
        let (handle, _cancel_rx) = StreamHandle::new();
        let (tx, updates) = mpsc::unbounded_channel();
        let _ = tx.send(StreamUpdate::Eose { events });
        Self { updates, handle }
    }

    /// Next update. `None` once the stream ended or was cancelled.
    pub async fn next(&mut self) -> Option<StreamUpdate> {
        if self.handle.is_cancelled() {
            return None;
        }
        self.updates.recv().await
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Cancel the stream. Calling it again does nothing.
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Wait for the catch-up boundary and return its snapshot, then cancel.
    ///
    /// If the stream ends first, the last snapshot seen is returned.
    pub async fn collect_until_eose(mut self) -> Vec<Event> {
        let mut latest = Vec::new();
        while let Some(update) = self.next().await {
            match update {
                StreamUpdate::Eose { events } => return events,
                StreamUpdate::Event { events, .. } => latest = events,
            }
        }
        latest
    }
}

impl Stream for EventStream {
    type Item = StreamUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.handle.is_cancelled() {
            return Poll::Ready(None);
        }
        self.updates.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}

/// Query every read relay and return the merged result, newest first.
pub async fn get_events_on_eose(pool: &RelayPool, filters: &[Filter]) -> Vec<Event> {
    let mut events = pool.query(filters).await;
    sort_events(&mut events);
    events
}

/// Open a subscription and stream its events incrementally.
pub async fn stream_events_on_event(
    pool: &RelayPool,
    filters: Vec<Filter>,
    options: StreamOptions,
) -> EventStream {
    let (handle, mut cancel_rx) = StreamHandle::new();
    let (updates_tx, updates) = mpsc::unbounded_channel();
    // The timeout counts from here, not from whenever the relays answer.
    let deadline = tokio::time::sleep(options.timeout);
    let mut subscription = pool.subscribe(filters);

    tokio::spawn(async move {
        tokio::pin!(deadline);

        let mut accumulator = EventAccumulator::new();
        let mut eose_sent = false;

        loop {
            tokio::select! {
                changed = cancel_rx.changed() => {
                    if changed.is_err() || *cancel_rx.borrow() {
                        debug!("Stream {} cancelled", subscription.id());
                        break;
                    }
                }
                _ = &mut deadline => {
                    if !eose_sent {
                        debug!(
                            "Stream {} timed out before EOSE with {} events",
                            subscription.id(),
                            accumulator.len()
                        );
                        let _ = updates_tx.send(StreamUpdate::Eose {
                            events: accumulator.snapshot(),
                        });
                    }
                    break;
                }
                notification = subscription.next() => match notification {
                    Some(PoolNotification::Event { event, .. }) => {
                        if accumulator.insert(event.clone()) {
                            let update = StreamUpdate::Event {
                                events: accumulator.snapshot(),
                                new_event: event,
                            };
                            if updates_tx.send(update).is_err() {
                                break;
                            }
                        }
                    }
                    Some(PoolNotification::Eose { .. }) => {}
                    Some(PoolNotification::AllEose) => {
                        if !eose_sent {
                            eose_sent = true;
                            let update = StreamUpdate::Eose {
                                events: accumulator.snapshot(),
                            };
                            if updates_tx.send(update).is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        if !eose_sent {
                            let _ = updates_tx.send(StreamUpdate::Eose {
                                events: accumulator.snapshot(),
                            });
                        }
                        break;
                    }
                }
            }
        }

        subscription.close().await;
    });

    EventStream { updates, handle }
}
