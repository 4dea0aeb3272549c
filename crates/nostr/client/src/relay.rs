//! Single relay connection management
//!
//! [`RelayTransport`] is the seam between the pool and one relay endpoint.
//! [`RelayConnection`] implements it over a WebSocket: it connects lazily on
//! first use, runs a writer task and a reader task, routes EVENT/EOSE/CLOSED to
//! per-subscription channels and OK to pending publish confirmations.

use crate::error::{ClientError, Result};
use crate::message::{ClientMessage, Filter, RelayMessage};
use crate::subscription::generate_subscription_id;
use async_trait::async_trait;
use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use nostr::Event;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Disconnected
    Disconnected,
    /// Currently connecting
    Connecting,
    /// Connected and ready
    Connected,
}

/// What a relay delivers for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionMessage {
    /// A matching event
    Event(Event),
    /// End of stored events
    Eose,
    /// The relay closed the subscription
    Closed(String),
}

/// Confirmation result for event publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishConfirmation {
    /// Event ID that was published
    pub event_id: String,
    /// Whether the relay accepted the event
    pub accepted: bool,
    /// Message from the relay (empty if accepted, error message if rejected)
    pub message: String,
}

/// One relay endpoint as seen by the pool.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Relay URL, used as the relay's identity inside the pool.
    fn url(&self) -> &str;

    /// Open a subscription. Messages for it arrive on the returned channel; the
    /// channel ends when the relay closes the subscription or disconnects.
    async fn subscribe(
        &self,
        subscription_id: &str,
        filters: &[Filter],
    ) -> Result<mpsc::UnboundedReceiver<SubscriptionMessage>>;

    /// Close a subscription.
    async fn unsubscribe(&self, subscription_id: &str) -> Result<()>;

    /// Send an event and wait for the relay's OK.
    async fn publish(&self, event: &Event, timeout: Duration) -> Result<PublishConfirmation>;

    /// Round-trip query: subscribe, collect stored events until EOSE, close.
    ///
    /// `timeout` covers the whole round trip, connecting included. A relay
    /// that closes the subscription or runs into the timeout yields the events
    /// gathered so far.
    async fn query(&self, filter: &Filter, timeout: Duration) -> Result<Vec<Event>> {
        let subscription_id = generate_subscription_id();

        let mut events = Vec::new();
        let finished = tokio::time::timeout(timeout, async {
            let mut rx = self
                .subscribe(&subscription_id, std::slice::from_ref(filter))
                .await?;
            while let Some(msg) = rx.recv().await {
                match msg {
                    SubscriptionMessage::Event(event) => events.push(event),
                    SubscriptionMessage::Eose => break,
                    SubscriptionMessage::Closed(reason) => {
                        warn!("Query {} closed by {}: {}", subscription_id, self.url(), reason);
                        break;
                    }
                }
            }
            Ok::<_, ClientError>(())
        })
        .await;

        match finished {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => debug!(
                "Query {} on {} timed out after {:?} with {} events",
                subscription_id,
                self.url(),
                timeout,
                events.len()
            ),
        }

        if let Err(e) = self.unsubscribe(&subscription_id).await {
            debug!("Failed to close query {} on {}: {}", subscription_id, self.url(), e);
        }

        Ok(events)
    }
}

/// Relay connection configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SubscriptionSenders = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<SubscriptionMessage>>>>;
type PendingConfirmations = Arc<Mutex<HashMap<String, oneshot::Sender<PublishConfirmation>>>>;

/// WebSocket relay connection
pub struct RelayConnection {
    /// Relay URL
    url: Url,
    /// URL as given, used as the pool key
    url_str: String,
    /// Configuration
    config: RelayConfig,
    /// Connection state
    state: Arc<RwLock<ConnectionState>>,
    /// Outgoing frames, consumed by the writer task
    outgoing: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    /// Active subscriptions (subscription_id -> sender)
    subscriptions: SubscriptionSenders,
    /// Pending event confirmations (event_id -> oneshot sender)
    pending_confirmations: PendingConfirmations,
    /// Serializes connection attempts
    connect_lock: Mutex<()>,
    /// Reader and writer task handles
    tasks: SyncMutex<Vec<JoinHandle<()>>>,
}

impl RelayConnection {
    /// Create a new relay connection (does not connect yet)
    pub fn new(url: &str) -> Result<Self> {
        Self::with_config(url, RelayConfig::default())
    }

    /// Create a new relay connection with custom config
    pub fn with_config(url: &str, config: RelayConfig) -> Result<Self> {
        let parsed = Url::parse(url)?;

        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                parsed.scheme()
            )));
        }

        Ok(Self {
            url: parsed,
            url_str: url.to_string(),
            config,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing: Arc::new(Mutex::new(None)),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            pending_confirmations: Arc::new(Mutex::new(HashMap::new())),
            connect_lock: Mutex::new(()),
            tasks: SyncMutex::new(Vec::new()),
        })
    }

    /// Get current connection state
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Check if connected
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ConnectionState::Connected
    }

    /// Connect to the relay. Does nothing when already connected.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.connect_lock.lock().await;
        if self.is_connected().await {
            return Ok(());
        }

        *self.state.write().await = ConnectionState::Connecting;
        info!("Connecting to relay: {}", self.url);

        let ws_stream = match timeout(self.config.connect_timeout, connect_async(self.url.as_str()))
            .await
        {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::WebSocket(e.to_string()));
            }
            Err(_) => {
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::Timeout(format!(
                    "Connection timeout after {:?}",
                    self.config.connect_timeout
                )));
            }
        };

        let (mut sink, stream) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let url = self.url_str.clone();

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = sink.send(frame).await {
                    warn!("WebSocket send to {} failed: {}", url, e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(Self::recv_loop(
            stream,
            self.url_str.clone(),
            out_tx.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.outgoing),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.pending_confirmations),
        ));

        *self.outgoing.lock().await = Some(out_tx);
        *self.state.write().await = ConnectionState::Connected;
        {
            let mut tasks = self.tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.push(writer);
            tasks.push(reader);
        }

        info!("Connected to relay: {}", self.url);
        Ok(())
    }

    /// Background receive loop: parse frames and route them.
    async fn recv_loop(
        mut stream: SplitStream<WsStream>,
        url: String,
        pong_tx: mpsc::UnboundedSender<Message>,
        state: Arc<RwLock<ConnectionState>>,
        outgoing: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
        subscriptions: SubscriptionSenders,
        pending_confirmations: PendingConfirmations,
    ) {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    Self::dispatch(&text, &url, &subscriptions, &pending_confirmations).await;
                }
                Ok(Message::Ping(data)) => {
                    let _ = pong_tx.send(Message::Pong(data));
                }
                Ok(Message::Close(_)) => {
                    info!("Relay {} closed connection", url);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error from {}: {}", url, e);
                    break;
                }
            }
        }

        *state.write().await = ConnectionState::Disconnected;
        outgoing.lock().await.take();
        // Dropping the senders ends every open subscription channel.
        subscriptions.lock().await.clear();
        pending_confirmations.lock().await.clear();
        info!("Disconnected from relay: {}", url);
    }

    async fn dispatch(
        text: &str,
        url: &str,
        subscriptions: &SubscriptionSenders,
        pending_confirmations: &PendingConfirmations,
    ) {
        let message = match RelayMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Ignoring unparseable message from {}: {}", url, e);
                return;
            }
        };

        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                Self::route(subscriptions, &subscription_id, SubscriptionMessage::Event(event))
                    .await;
            }
            RelayMessage::Eose { subscription_id } => {
                Self::route(subscriptions, &subscription_id, SubscriptionMessage::Eose).await;
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                warn!(
                    "Subscription {} closed by {}: {}",
                    subscription_id, url, message
                );
                if let Some(tx) = subscriptions.lock().await.remove(&subscription_id) {
                    let _ = tx.send(SubscriptionMessage::Closed(message));
                }
            }
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => {
                if let Some(tx) = pending_confirmations.lock().await.remove(&event_id) {
                    let _ = tx.send(PublishConfirmation {
                        event_id,
                        accepted: success,
                        message,
                    });
                }
            }
            RelayMessage::Notice { message } => info!("Notice from {}: {}", url, message),
            other => debug!("Unhandled message from {}: {:?}", url, other),
        }
    }

    async fn route(
        subscriptions: &SubscriptionSenders,
        subscription_id: &str,
        msg: SubscriptionMessage,
    ) {
        let mut subs = subscriptions.lock().await;
        if let Some(tx) = subs.get(subscription_id)
            && tx.send(msg).is_err()
        {
            debug!("Subscription {} receiver dropped, removing", subscription_id);
            subs.remove(subscription_id);
        }
    }

    async fn send(&self, msg: &ClientMessage) -> Result<()> {
        let json = msg.to_json()?;
        let outgoing = self.outgoing.lock().await;
        let tx = outgoing.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(Message::Text(json.into()))
            .map_err(|_| ClientError::NotConnected)
    }

    /// Disconnect from the relay
    pub async fn disconnect(&self) {
        self.outgoing.lock().await.take();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.subscriptions.lock().await.clear();
        self.pending_confirmations.lock().await.clear();
        *self.state.write().await = ConnectionState::Disconnected;
        info!("Disconnected from relay: {}", self.url);
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[async_trait]
impl RelayTransport for RelayConnection {
    fn url(&self) -> &str {
        &self.url_str
    }

    async fn subscribe(
        &self,
        subscription_id: &str,
        filters: &[Filter],
    ) -> Result<mpsc::UnboundedReceiver<SubscriptionMessage>> {
        self.connect().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .lock()
            .await
            .insert(subscription_id.to_string(), tx);

        let req = ClientMessage::Req {
            subscription_id: subscription_id.to_string(),
            filters: filters.to_vec(),
        };
        if let Err(e) = self.send(&req).await {
            self.subscriptions.lock().await.remove(subscription_id);
            return Err(e);
        }

        debug!("Subscribed {} on {}", subscription_id, self.url_str);
        Ok(rx)
    }

    async fn unsubscribe(&self, subscription_id: &str) -> Result<()> {
        self.subscriptions.lock().await.remove(subscription_id);
        if !self.is_connected().await {
            return Ok(());
        }
        self.send(&ClientMessage::Close {
            subscription_id: subscription_id.to_string(),
        })
        .await
    }

    async fn publish(
        &self,
        event: &Event,
        confirmation_timeout: Duration,
    ) -> Result<PublishConfirmation> {
        self.connect().await?;

        let (tx, rx) = oneshot::channel();
        let event_id = event.id.clone();
        self.pending_confirmations
            .lock()
            .await
            .insert(event_id.clone(), tx);

        if let Err(e) = self.send(&ClientMessage::Event(event.clone())).await {
            self.pending_confirmations.lock().await.remove(&event_id);
            return Err(e);
        }

        match timeout(confirmation_timeout, rx).await {
            Ok(Ok(confirmation)) => Ok(confirmation),
            Ok(Err(_)) => Err(ClientError::PublishFailed(
                "connection closed before confirmation".to_string(),
            )),
            Err(_) => {
                self.pending_confirmations.lock().await.remove(&event_id);
                Err(ClientError::Timeout(format!(
                    "Event confirmation timeout after {:?}",
                    confirmation_timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_urls() {
        assert!(matches!(
            RelayConnection::new("https://relay.example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            RelayConnection::new("not a url"),
            Err(ClientError::UrlParse(_))
        ));
    }

    #[tokio::test]
    async fn test_new_connection_is_disconnected() {
        let relay = RelayConnection::new("wss://relay.example.com").unwrap();
        assert_eq!(relay.state().await, ConnectionState::Disconnected);
        assert_eq!(relay.url(), "wss://relay.example.com");
        // Closing an unknown subscription while offline is harmless
        relay.unsubscribe("nothing").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_relay_fails_to_subscribe() {
        let config = RelayConfig {
            connect_timeout: Duration::from_millis(200),
        };
        let relay = RelayConnection::with_config("ws://127.0.0.1:1", config).unwrap();
        let result = relay.subscribe("sub", &[Filter::new().kinds(vec![1])]).await;
        assert!(result.is_err());
        assert_eq!(relay.state().await, ConnectionState::Disconnected);
    }
}
