//! Relay pool for managing multiple relay connections
//!
//! The pool keeps one transport per relay URL together with its read/write
//! role. Reads (queries and subscriptions) go to the read relays, publishes to
//! the write relays. Results from several relays are merged with the first copy
//! of each event id winning.

use crate::error::Result;
use crate::message::Filter;
use crate::relay::{
    PublishConfirmation, RelayConfig, RelayConnection, RelayTransport, SubscriptionMessage,
};
use crate::subscription::{SubscriptionTracker, generate_subscription_id};
use futures::future::join_all;
use nostr::{Event, dedup_events};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Relays used when the application does not configure any.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

fn default_true() -> bool {
    true
}

/// A relay URL and the roles it plays in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEndpoint {
    pub url: String,
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default = "default_true")]
    pub write: bool,
}

impl RelayEndpoint {
    /// Relay used for both reading and writing.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            read: true,
            write: true,
        }
    }

    pub fn read_only(url: impl Into<String>) -> Self {
        Self {
            write: false,
            ..Self::new(url)
        }
    }

    pub fn write_only(url: impl Into<String>) -> Self {
        Self {
            read: false,
            ..Self::new(url)
        }
    }

    /// Endpoints for [`DEFAULT_RELAYS`].
    pub fn defaults() -> Vec<Self> {
        DEFAULT_RELAYS.iter().map(|url| Self::new(*url)).collect()
    }
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How long a one-shot query waits for a relay's EOSE
    pub query_timeout: Duration,
    /// How long a publish waits for a relay's OK
    pub publish_timeout: Duration,
    /// WebSocket connection timeout
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// What a pool subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolNotification {
    /// An event from one relay. The same event may arrive from several relays.
    Event { relay_url: String, event: Event },
    /// One relay finished sending stored events
    Eose { relay_url: String },
    /// Every subscribed relay finished sending stored events. Sent once.
    AllEose,
}

struct PoolRelay {
    transport: Arc<dyn RelayTransport>,
    read: bool,
    write: bool,
}

/// Relay pool
pub struct RelayPool {
    relays: Vec<PoolRelay>,
    config: PoolConfig,
}

impl RelayPool {
    /// Create a pool of WebSocket relays. Endpoints repeating a URL merge their roles.
    ///
    /// # Errors
    ///
    /// Returns an error if any URL is not a valid `ws://` or `wss://` URL.
    pub fn new(endpoints: &[RelayEndpoint], config: PoolConfig) -> Result<Self> {
        let mut merged: Vec<RelayEndpoint> = Vec::new();
        for endpoint in endpoints {
            match merged.iter_mut().find(|e| e.url == endpoint.url) {
                Some(existing) => {
                    existing.read |= endpoint.read;
                    existing.write |= endpoint.write;
                }
                None => merged.push(endpoint.clone()),
            }
        }

        let relay_config = RelayConfig {
            connect_timeout: config.connect_timeout,
        };
        let mut pool = Self::empty(config);
        for endpoint in merged {
            let connection = RelayConnection::with_config(&endpoint.url, relay_config.clone())?;
            pool = pool.with_transport(Arc::new(connection), endpoint.read, endpoint.write);
        }

        info!(
            "Relay pool ready: {} read, {} write",
            pool.read_urls().len(),
            pool.write_urls().len()
        );
        Ok(pool)
    }

    /// Create a pool without relays.
    pub fn empty(config: PoolConfig) -> Self {
        Self {
            relays: Vec::new(),
            config,
        }
    }

    /// Add a relay transport with the given roles. A transport whose URL is
    /// already in the pool replaces the earlier one.
    pub fn with_transport(
        mut self,
        transport: Arc<dyn RelayTransport>,
        read: bool,
        write: bool,
    ) -> Self {
        self.relays.retain(|r| r.transport.url() != transport.url());
        self.relays.push(PoolRelay {
            transport,
            read,
            write,
        });
        self
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// URLs of relays used for reading.
    pub fn read_urls(&self) -> Vec<String> {
        self.readers().iter().map(|r| r.url().to_string()).collect()
    }

    /// URLs of relays used for publishing.
    pub fn write_urls(&self) -> Vec<String> {
        self.writers().iter().map(|r| r.url().to_string()).collect()
    }

    fn readers(&self) -> Vec<Arc<dyn RelayTransport>> {
        self.relays
            .iter()
            .filter(|r| r.read)
            .map(|r| Arc::clone(&r.transport))
            .collect()
    }

    fn writers(&self) -> Vec<Arc<dyn RelayTransport>> {
        self.relays
            .iter()
            .filter(|r| r.write)
            .map(|r| Arc::clone(&r.transport))
            .collect()
    }

    /// One-shot query: every filter against every read relay, concurrently.
    ///
    /// Relay failures are logged and contribute nothing. The result holds each
    /// event id once, in arrival order (filter order, then relay order).
    pub async fn query(&self, filters: &[Filter]) -> Vec<Event> {
        let readers = self.readers();
        let timeout = self.config.query_timeout;

        let per_filter = join_all(filters.iter().map(|filter| {
            let readers = &readers;
            async move {
                join_all(readers.iter().map(|relay| async move {
                    (relay.url().to_string(), relay.query(filter, timeout).await)
                }))
                .await
            }
        }))
        .await;

        let mut batches = Vec::new();
        for (url, result) in per_filter.into_iter().flatten() {
            match result {
                Ok(events) => {
                    debug!("Query on {} returned {} events", url, events.len());
                    batches.push(events);
                }
                Err(e) => warn!("Query on {} failed: {}", url, e),
            }
        }

        dedup_events(batches.into_iter().flatten())
    }

    /// Open a subscription on every read relay.
    ///
    /// Returns at once. Each relay is attached from its own task as soon as it
    /// accepts, so a relay that is slow to connect holds up neither the others
    /// nor the caller. Relays refusing the subscription are logged and left
    /// out. With no read relays, the subscription reports
    /// [`PoolNotification::AllEose`] right away.
    ///
    /// Must be called within a Tokio runtime.
    pub fn subscribe(&self, filters: Vec<Filter>) -> PoolSubscription {
        let id = generate_subscription_id();
        let readers = self.readers();
        info!(
            "Creating subscription {} with {} filters on {} relays",
            id,
            filters.len(),
            readers.len()
        );

        // Every reader counts as pending until it attaches or fails.
        let tracker = Arc::new(Mutex::new(SubscriptionTracker::new(
            id.clone(),
            filters.clone(),
        )));
        for relay in &readers {
            tracker.lock().add_relay(relay.url());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        if tracker.lock().take_all_eose() {
            let _ = tx.send(PoolNotification::AllEose);
        }

        let filters = Arc::new(filters);
        let tasks = readers
            .iter()
            .map(|relay| {
                tokio::spawn(attach(
                    Arc::clone(relay),
                    id.clone(),
                    Arc::clone(&filters),
                    tx.clone(),
                    Arc::clone(&tracker),
                ))
            })
            .collect();

        PoolSubscription {
            id: id.clone(),
            rx,
            closer: Arc::new(SubscriptionCloser {
                id,
                relays: readers,
                tasks: Mutex::new(tasks),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Publish to every write relay, returning each relay's outcome.
    pub async fn publish_to_all(
        &self,
        event: &Event,
    ) -> Vec<(String, Result<PublishConfirmation>)> {
        let timeout = self.config.publish_timeout;
        join_all(self.writers().into_iter().map(|relay| async move {
            (relay.url().to_string(), relay.publish(event, timeout).await)
        }))
        .await
    }

    /// Publish to every write relay. Succeeds when at least one relay accepts.
    pub async fn publish(&self, event: &Event) -> bool {
        let results = self.publish_to_all(event).await;
        if results.is_empty() {
            warn!("No write relays configured, event {} not published", event.id);
            return false;
        }

        let total = results.len();
        let mut accepted = 0;
        for (url, result) in results {
            match result {
                Ok(confirmation) if confirmation.accepted => accepted += 1,
                Ok(confirmation) => {
                    warn!("Relay {} rejected {}: {}", url, event.id, confirmation.message)
                }
                Err(e) => warn!("Publish of {} to {} failed: {}", event.id, url, e),
            }
        }

        info!("Published {} to {}/{} relays", event.id, accepted, total);
        accepted > 0
    }
}

async fn attach(
    relay: Arc<dyn RelayTransport>,
    id: String,
    filters: Arc<Vec<Filter>>,
    tx: mpsc::UnboundedSender<PoolNotification>,
    tracker: Arc<Mutex<SubscriptionTracker>>,
) {
    let relay_url = relay.url().to_string();
    match relay.subscribe(&id, &filters).await {
        Ok(relay_rx) => {
            debug!("Subscription {} attached to {}", id, relay_url);
            forward(&relay_url, relay_rx, &tx, &tracker).await;
        }
        Err(e) => warn!("Failed to subscribe {} on {}: {}", id, relay_url, e),
    }

    // The relay is gone from this subscription; it must not hold up EOSE.
    let all = {
        let mut tracker = tracker.lock();
        tracker.remove_relay(&relay_url);
        tracker.take_all_eose()
    };
    if all {
        let _ = tx.send(PoolNotification::AllEose);
    }
}

async fn forward(
    relay_url: &str,
    mut relay_rx: mpsc::UnboundedReceiver<SubscriptionMessage>,
    tx: &mpsc::UnboundedSender<PoolNotification>,
    tracker: &Mutex<SubscriptionTracker>,
) {
    while let Some(msg) = relay_rx.recv().await {
        match msg {
            SubscriptionMessage::Event(event) => {
                let notification = PoolNotification::Event {
                    relay_url: relay_url.to_string(),
                    event,
                };
                if tx.send(notification).is_err() {
                    return;
                }
            }
            SubscriptionMessage::Eose => {
                let all = {
                    let mut tracker = tracker.lock();
                    tracker.mark_eose(relay_url);
                    tracker.take_all_eose()
                };
                let _ = tx.send(PoolNotification::Eose {
                    relay_url: relay_url.to_string(),
                });
                if all {
                    let _ = tx.send(PoolNotification::AllEose);
                }
            }
            SubscriptionMessage::Closed(reason) => {
                warn!("Relay {} closed subscription: {}", relay_url, reason);
                return;
            }
        }
    }
}

struct SubscriptionCloser {
    id: String,
    relays: Vec<Arc<dyn RelayTransport>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SubscriptionCloser {
    /// Returns `false` if the subscription was already closed.
    fn begin_close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        true
    }

    async fn send_close(&self) {
        for relay in &self.relays {
            if let Err(e) = relay.unsubscribe(&self.id).await {
                debug!("Failed to close {} on {}: {}", self.id, relay.url(), e);
            }
        }
        debug!("Closed subscription {}", self.id);
    }
}

/// A subscription spanning the pool's read relays.
///
/// Dropping it closes the subscription on every relay.
pub struct PoolSubscription {
    id: String,
    rx: mpsc::UnboundedReceiver<PoolNotification>,
    closer: Arc<SubscriptionCloser>,
}

impl PoolSubscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of read relays the subscription was sent to.
    pub fn relay_count(&self) -> usize {
        self.closer.relays.len()
    }

    /// Next notification. `None` once every relay stopped or after `close`.
    pub async fn next(&mut self) -> Option<PoolNotification> {
        self.rx.recv().await
    }

    /// Close the subscription on every relay. Calling it again does nothing.
    pub async fn close(&self) {
        if self.closer.begin_close() {
            self.closer.send_close().await;
        }
    }
}

impl Drop for PoolSubscription {
    fn drop(&mut self) {
        if !self.closer.begin_close() {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let closer = Arc::clone(&self.closer);
            handle.spawn(async move { closer.send_close().await });
        }
    }
}
