//! Nostr relay client.
//!
//! This crate provides:
//! - WebSocket connections to Nostr relays behind the [`RelayTransport`] trait
//! - Message parsing (NIP-01 relay protocol) and filters
//! - A relay pool with read/write roles, merged queries and fan-out publishing
//! - Streaming retrieval with a single catch-up (EOSE) boundary and a timeout
//! - An in-process [`MemoryRelay`] for running all of the above without a network
//!
//! # Example
//!
//! ```rust,no_run
//! use nostr_client::{Filter, PoolConfig, RelayEndpoint, RelayPool, StreamOptions, StreamUpdate};
//!
//! #[tokio::main]
//! async fn main() -> nostr_client::Result<()> {
//!     let pool = RelayPool::new(&RelayEndpoint::defaults(), PoolConfig::default())?;
//!
//!     let filter = Filter::new().kinds(vec![34550]).limit(10);
//!     let options = StreamOptions::default();
//!     let mut stream = nostr_client::stream_events_on_event(&pool, vec![filter], options).await;
//!
//!     while let Some(update) = stream.next().await {
//!         match update {
//!             StreamUpdate::Event { new_event, .. } => println!("event {}", new_event.id),
//!             StreamUpdate::Eose { events } => println!("caught up with {} events", events.len()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod memory;
mod message;
mod pool;
mod relay;
mod stream;
mod subscription;

pub use error::{ClientError, Result};
pub use memory::MemoryRelay;
pub use message::{ClientMessage, Filter, MessageError, RelayMessage};
pub use pool::{
    DEFAULT_RELAYS, PoolConfig, PoolNotification, PoolSubscription, RelayEndpoint, RelayPool,
};
pub use relay::{
    ConnectionState, PublishConfirmation, RelayConfig, RelayConnection, RelayTransport,
    SubscriptionMessage,
};
pub use stream::{
    DEFAULT_STREAM_TIMEOUT, EventAccumulator, EventStream, StreamHandle, StreamOptions,
    StreamUpdate, get_events_on_eose, stream_events_on_event,
};
pub use subscription::{SubscriptionTracker, generate_subscription_id};
