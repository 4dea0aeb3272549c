//! In-process relay
//!
//! `MemoryRelay` answers subscriptions from an event list held in memory and
//! pushes newly published events to matching live subscriptions. It can be
//! switched offline, made silent (never sends EOSE) or told to reject
//! publishes, which makes it the relay of choice for exercising the pool and the
//! streaming layer without a network.

use crate::error::{ClientError, Result};
use crate::message::Filter;
use crate::relay::{PublishConfirmation, RelayTransport, SubscriptionMessage};
use async_trait::async_trait;
use nostr::{Event, dedup_events, sort_events};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

struct LiveSubscription {
    filters: Vec<Filter>,
    tx: mpsc::UnboundedSender<SubscriptionMessage>,
}

#[derive(Default)]
struct MemoryState {
    events: Vec<Event>,
    subscriptions: HashMap<String, LiveSubscription>,
    offline: bool,
    silent: bool,
    reject_publishes: bool,
    opened_subscriptions: usize,
    published: Vec<Event>,
}

/// Relay backed by an in-memory event list.
pub struct MemoryRelay {
    url: String,
    state: Mutex<MemoryState>,
}

impl MemoryRelay {
    /// Create an empty relay.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Create a relay that already stores `events`.
    pub fn with_events(url: impl Into<String>, events: Vec<Event>) -> Self {
        let relay = Self::new(url);
        relay.state.lock().events = events;
        relay
    }

    /// Store an event without notifying live subscriptions.
    pub fn store(&self, event: Event) {
        let mut state = self.state.lock();
        if !state.events.iter().any(|e| e.id == event.id) {
            state.events.push(event);
        }
    }

    /// Store an event and deliver it to every matching live subscription.
    pub fn push(&self, event: Event) {
        let mut state = self.state.lock();
        Self::accept(&mut state, event);
    }

    /// Refuse every subscribe and publish call while offline.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// A silent relay delivers stored events but never sends EOSE.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Answer every publish with a negative OK.
    pub fn set_reject_publishes(&self, reject: bool) {
        self.state.lock().reject_publishes = reject;
    }

    /// Number of subscriptions opened so far.
    pub fn opened_subscriptions(&self) -> usize {
        self.state.lock().opened_subscriptions
    }

    /// Number of subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Events accepted through `publish`, in order.
    pub fn published(&self) -> Vec<Event> {
        self.state.lock().published.clone()
    }

    /// Every stored event.
    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    fn accept(state: &mut MemoryState, event: Event) {
        if state.events.iter().any(|e| e.id == event.id) {
            return;
        }
        state.subscriptions.retain(|_, sub| {
            if !sub.filters.iter().any(|f| f.matches(&event)) {
                return true;
            }
            sub.tx.send(SubscriptionMessage::Event(event.clone())).is_ok()
        });
        state.events.push(event);
    }

    fn stored_matches(events: &[Event], filters: &[Filter]) -> Vec<Event> {
        let per_filter = filters.iter().flat_map(|filter| {
            let mut matched: Vec<Event> =
                events.iter().filter(|e| filter.matches(e)).cloned().collect();
            if let Some(limit) = filter.limit {
                sort_events(&mut matched);
                matched.truncate(limit as usize);
            }
            matched
        });
        dedup_events(per_filter)
    }
}

#[async_trait]
impl RelayTransport for MemoryRelay {
    fn url(&self) -> &str {
        &self.url
    }

    async fn subscribe(
        &self,
        subscription_id: &str,
        filters: &[Filter],
    ) -> Result<mpsc::UnboundedReceiver<SubscriptionMessage>> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(ClientError::NotConnected);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for event in Self::stored_matches(&state.events, filters) {
            let _ = tx.send(SubscriptionMessage::Event(event));
        }
        if !state.silent {
            let _ = tx.send(SubscriptionMessage::Eose);
        }

        state.opened_subscriptions += 1;
        state.subscriptions.insert(
            subscription_id.to_string(),
            LiveSubscription {
                filters: filters.to_vec(),
                tx,
            },
        );
        debug!("Memory relay {} opened {}", self.url, subscription_id);
        Ok(rx)
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.state.lock().subscriptions.remove(subscription_id);
        Ok(())
    }

    async fn publish(&self, event: &Event, _timeout: Duration) -> Result<PublishConfirmation> {
        let mut state = self.state.lock();
        if state.offline {
            return Err(ClientError::NotConnected);
        }
        if state.reject_publishes {
            return Ok(PublishConfirmation {
                event_id: event.id.clone(),
                accepted: false,
                message: "blocked: publishing disabled".to_string(),
            });
        }

        state.published.push(event.clone());
        Self::accept(&mut state, event.clone());
        Ok(PublishConfirmation {
            event_id: event.id.clone(),
            accepted: true,
            message: String::new(),
        })
    }
}
