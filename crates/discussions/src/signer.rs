//! Signer boundary.
//!
//! Key material lives outside this crate. A [`Signer`] turns a template into a
//! signed event and may refuse, for example when the user cancels.

use async_trait::async_trait;
use nostr::{Event, EventTemplate};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signing cancelled by user")]
    Cancelled,

    #[error("signing key unavailable: {0}")]
    Unavailable(String),

    #[error("signing failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Signer: Send + Sync {
    /// Public key events will be signed with.
    fn pubkey(&self) -> &str;

    async fn sign(&self, template: EventTemplate) -> Result<Event, SignerError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Assigns sequential ids and a fixed pubkey; can be told to refuse.
    pub(crate) struct TestSigner {
        pubkey: String,
        counter: AtomicUsize,
        refuse: AtomicBool,
    }

    impl TestSigner {
        pub(crate) fn new(pubkey: &str) -> Self {
            Self {
                pubkey: pubkey.to_string(),
                counter: AtomicUsize::new(0),
                refuse: AtomicBool::new(false),
            }
        }

        pub(crate) fn refuse(&self, refuse: bool) {
            self.refuse.store(refuse, Ordering::SeqCst);
        }

        pub(crate) fn signed(&self) -> usize {
            self.counter.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Signer for TestSigner {
        fn pubkey(&self) -> &str {
            &self.pubkey
        }

        async fn sign(&self, template: EventTemplate) -> Result<Event, SignerError> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err(SignerError::Cancelled);
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Event {
                id: format!("{}-{}", self.pubkey, n),
                pubkey: self.pubkey.clone(),
                created_at: template.created_at,
                kind: template.kind,
                tags: template.tags,
                content: template.content,
                sig: "sig".to_string(),
            })
        }
    }
}
