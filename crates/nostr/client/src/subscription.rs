//! Subscription bookkeeping shared by the pool.
//!
//! A pool subscription fans out to several relays. The tracker records which
//! relays accepted it and which of them have reported end of stored events, so
//! the pool can announce the catch-up boundary exactly once.

use crate::message::Filter;
use std::collections::HashSet;
use uuid::Uuid;

/// Generate a unique subscription ID.
pub fn generate_subscription_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Tracks which relays have a specific subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionTracker {
    /// Subscription ID
    pub id: String,
    /// Filters for this subscription
    pub filters: Vec<Filter>,
    /// Relays that have this subscription
    pub relays: HashSet<String>,
    /// Relays that have sent EOSE
    pub eose_relays: HashSet<String>,
    /// Whether the all-relays EOSE has been reported
    announced: bool,
}

impl SubscriptionTracker {
    /// Create a new subscription tracker.
    pub fn new(id: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self {
            id: id.into(),
            filters,
            relays: HashSet::new(),
            eose_relays: HashSet::new(),
            announced: false,
        }
    }

    /// Add a relay to this subscription.
    pub fn add_relay(&mut self, relay_url: impl Into<String>) {
        self.relays.insert(relay_url.into());
    }

    /// Remove a relay, e.g. because it closed the subscription or disconnected.
    pub fn remove_relay(&mut self, relay_url: &str) {
        self.relays.remove(relay_url);
        self.eose_relays.remove(relay_url);
    }

    /// Mark EOSE received from a relay.
    pub fn mark_eose(&mut self, relay_url: &str) {
        if self.relays.contains(relay_url) {
            self.eose_relays.insert(relay_url.to_string());
        }
    }

    /// Whether every remaining relay has sent EOSE.
    ///
    /// A subscription without relays has nothing left to wait for.
    pub fn all_eose(&self) -> bool {
        self.relays.len() == self.eose_relays.len()
    }

    /// Returns `true` the first time all relays have reached EOSE, `false` afterwards.
    pub fn take_all_eose(&mut self) -> bool {
        if self.announced || !self.all_eose() {
            return false;
        }
        self.announced = true;
        true
    }

    /// Check if a relay has this subscription.
    pub fn has_relay(&self, relay_url: &str) -> bool {
        self.relays.contains(relay_url)
    }

    /// Get the number of relays with this subscription.
    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_subscription_id() {
        let id1 = generate_subscription_id();
        let id2 = generate_subscription_id();

        assert_eq!(id1.len(), 16);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_subscription_tracker_add_remove() {
        let mut tracker = SubscriptionTracker::new("sub1", vec![Filter::new().kinds(vec![1])]);

        tracker.add_relay("wss://relay1.com");
        tracker.add_relay("wss://relay2.com");
        tracker.remove_relay("wss://relay1.com");

        assert_eq!(tracker.relay_count(), 1);
        assert!(!tracker.has_relay("wss://relay1.com"));
        assert!(tracker.has_relay("wss://relay2.com"));
        assert_eq!(tracker.filters.len(), 1);
    }

    #[test]
    fn test_subscription_tracker_eose_announced_once() {
        let mut tracker = SubscriptionTracker::new("sub1", vec![]);

        tracker.add_relay("wss://relay1.com");
        tracker.add_relay("wss://relay2.com");
        assert!(!tracker.take_all_eose());

        tracker.mark_eose("wss://relay1.com");
        assert!(!tracker.take_all_eose());

        tracker.mark_eose("wss://relay2.com");
        assert!(tracker.take_all_eose());
        assert!(!tracker.take_all_eose());
    }

    #[test]
    fn test_subscription_tracker_removed_relay_unblocks_eose() {
        let mut tracker = SubscriptionTracker::new("sub1", vec![]);

        tracker.add_relay("wss://relay1.com");
        tracker.add_relay("wss://relay2.com");
        tracker.mark_eose("wss://relay1.com");

        // relay2 drops before sending EOSE
        tracker.remove_relay("wss://relay2.com");
        assert!(tracker.take_all_eose());
    }

    #[test]
    fn test_subscription_tracker_ignores_unknown_relay_eose() {
        let mut tracker = SubscriptionTracker::new("sub1", vec![]);
        tracker.add_relay("wss://relay1.com");

        tracker.mark_eose("wss://stranger.com");
        assert!(!tracker.all_eose());
    }
}
