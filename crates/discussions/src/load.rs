//! Stale-load guard.
//!
//! Every load takes a ticket from a [`LoadSequence`]. Starting another load
//! makes earlier tickets stale, and results carried by a stale ticket are
//! dropped instead of overwriting newer state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
pub struct LoadSequence {
    current: Arc<AtomicU64>,
}

impl LoadSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a load. Every ticket handed out before this one becomes stale.
    pub fn begin(&self) -> LoadTicket {
        let sequence = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        LoadTicket {
            sequence,
            current: Arc::clone(&self.current),
        }
    }

    /// Make every outstanding ticket stale without starting a load.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct LoadTicket {
    sequence: u64,
    current: Arc<AtomicU64>,
}

impl LoadTicket {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether no newer load has started since this ticket was issued.
    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_ticket_is_current() {
        let sequence = LoadSequence::new();
        let first = sequence.begin();
        assert!(first.is_current());

        let second = sequence.begin();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.sequence() > first.sequence());

        sequence.invalidate();
        assert!(!second.is_current());
    }

    #[test]
    fn test_clones_share_the_counter() {
        let sequence = LoadSequence::new();
        let ticket = sequence.begin();
        sequence.clone().begin();
        assert!(!ticket.is_current());
        assert_eq!(sequence.current(), 2);
    }
}
