//! Service configuration.
//!
//! Plain data handed to [`crate::create_nostr_service`]. Callers build it or
//! deserialize it from whatever source they like.

use nostr_client::{PoolConfig, RelayEndpoint, StreamOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_relays() -> Vec<RelayEndpoint> {
    RelayEndpoint::defaults()
}

fn default_stream_timeout_ms() -> u64 {
    5_000
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

fn default_publish_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Discussion service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Relays with their read/write roles
    #[serde(default = "default_relays")]
    pub relays: Vec<RelayEndpoint>,

    /// Admin public key; the admin may moderate every discussion
    #[serde(default)]
    pub admin_pubkey: Option<String>,

    /// Time allowed for relays to finish sending stored events in a stream
    #[serde(default = "default_stream_timeout_ms")]
    pub stream_timeout_ms: u64,

    /// Time a one-shot query waits for each relay
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// Time a publish waits for each relay's acknowledgement
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,

    /// WebSocket connection timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            admin_pubkey: None,
            stream_timeout_ms: default_stream_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
            publish_timeout_ms: default_publish_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn with_relays(relays: Vec<RelayEndpoint>) -> Self {
        Self {
            relays,
            ..Self::default()
        }
    }

    pub fn admin(mut self, pubkey: impl Into<String>) -> Self {
        self.admin_pubkey = Some(pubkey.into());
        self
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            query_timeout: Duration::from_millis(self.query_timeout_ms),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions::with_timeout(Duration::from_millis(self.stream_timeout_ms))
    }
}
