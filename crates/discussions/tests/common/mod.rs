//! Shared fixtures for the integration suites.

use async_trait::async_trait;
use discussions::{NostrService, ServiceConfig, Signer, SignerError};
use nostr::{Event, EventTemplate};
use nostr_client::{MemoryRelay, PoolConfig, RelayPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
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

pub const ADMIN: &str = "admin";

/// Signs with a fixed pubkey and sequential ids.
pub struct FakeSigner {
    pubkey: String,
    signed: AtomicUsize,
}

impl FakeSigner {
    pub fn new(pubkey: &str) -> Arc<Self> {
        Arc::new(Self {
            pubkey: pubkey.to_string(),
            signed: AtomicUsize::new(0),
        })
    }

    pub fn signed(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for FakeSigner {
    fn pubkey(&self) -> &str {
        &self.pubkey
    }

    async fn sign(&self, template: EventTemplate) -> Result<Event, SignerError> {
        let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
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

/// A service over the given in-memory relays, all read and write.
pub fn service(relays: &[Arc<MemoryRelay>]) -> NostrService {
    let pool = relays
        .iter()
        .fold(RelayPool::empty(PoolConfig::default()), |pool, relay| {
            pool.with_transport(relay.clone(), true, true)
        });
    NostrService::new(Arc::new(pool), ServiceConfig::default().admin(ADMIN))
}

pub fn event(
    id: &str,
    pubkey: &str,
    kind: u16,
    created_at: u64,
    tags: &[&[&str]],
    content: &str,
) -> Event {
    Event {
        id: id.to_string(),
        pubkey: pubkey.to_string(),
        created_at,
        kind,
        tags: tags
            .iter()
            .map(|t| t.iter().map(|s| s.to_string()).collect())
            .collect(),
        content: content.to_string(),
        sig: "sig".to_string(),
    }
}
