//! WebSocket transport for real-time book data.
//!
//! [`WebSocketClient`] speaks a Centrifuge-style JSON protocol: one connect
//! command carrying the access token, then subscribe/unsubscribe commands
//! per channel. The subscribe reply carries the channel's full book;
//! publications carry deltas.
//!
//! The session layer is synchronous, so it never talks to the socket
//! directly. It holds a [`WsTransport`] handle whose [`Transport`] methods
//! only queue requests; the queue is drained by [`WebSocketClient::next`]
//! while it waits for frames.
//!
//! # Example
//!
//! ```rust,no_run
//! use depth_ladder::client::websocket::WebSocketClient;
//! use depth_ladder::orderbook::OrderBookProvider;
//! use depth_ladder::Config;
//!
//! # async fn example() -> depth_ladder::Result<()> {
//! let config = Config::new("token");
//! let mut ws = WebSocketClient::connect(&config).await?;
//! let provider = OrderBookProvider::new(ws.transport());
//!
//! let _sub = provider.subscribe("BTC-USD", |update| {
//!     println!("update at sequence {}", update.sequence());
//! })?;
//!
//! while let Some(event) = ws.next().await {
//!     if let Err(e) = event.and_then(|ev| provider.dispatch(ev)) {
//!         eprintln!("{}", e);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::client::transport::{ChannelEvent, Transport};
use crate::config::Config;
use crate::error::Error;
use crate::types::messages::{Command, CommandBody, Reply};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Name reported to the server in the connect command
const CLIENT_NAME: &str = "depth-ladder";

/// Subscription control request queued by a [`WsTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlRequest {
    /// Subscribe to a channel
    Subscribe(String),
    /// Unsubscribe from a channel
    Unsubscribe(String),
}

/// Cloneable, non-blocking [`Transport`] handle onto a WebSocket connection.
///
/// Requests fail with [`Error::ConnectionClosed`] once the owning client is
/// gone.
#[derive(Debug, Clone)]
pub struct WsTransport {
    requests: mpsc::UnboundedSender<ControlRequest>,
}

impl WsTransport {
    fn send(&self, request: ControlRequest) -> Result<(), Error> {
        self.requests
            .send(request)
            .map_err(|_| Error::ConnectionClosed)
    }
}

impl Transport for WsTransport {
    fn subscribe(&mut self, channel: &str) -> Result<(), Error> {
        self.send(ControlRequest::Subscribe(channel.to_string()))
    }

    fn unsubscribe(&mut self, channel: &str) -> Result<(), Error> {
        self.send(ControlRequest::Unsubscribe(channel.to_string()))
    }
}

/// WebSocket client for real-time book data
///
/// # Thread Safety
///
/// This client is NOT thread-safe. Drive it from the task that owns the
/// session layer; hand out [`WsTransport`] handles for subscription control.
///
/// # Cancellation
///
/// [`next`](Self::next) is cancel-safe: commands and pongs go through an
/// outbound queue that is only popped once a frame has been handed to the
/// socket, and whole frames are decoded synchronously. Dropping a pending
/// `next` (e.g. in `select!`) loses nothing.
#[derive(Debug)]
pub struct WebSocketClient {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    message_id: u64,
    requests_tx: mpsc::UnboundedSender<ControlRequest>,
    requests_rx: mpsc::UnboundedReceiver<ControlRequest>,
    /// Channels currently requested
    active: FxHashSet<String>,
    /// Subscribe commands awaiting their reply, by command ID
    pending: FxHashMap<u64, String>,
    /// Events decoded from a batched frame, not yet returned
    queued: VecDeque<ChannelEvent>,
    /// Frames to write, oldest first
    outgoing: VecDeque<Message>,
    /// Frames were fed to the sink but not flushed yet
    unflushed: bool,
}

impl WebSocketClient {
    /// Connect and authenticate
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the connection or
    /// the connect command fails, or the handshake exceeds the configured
    /// timeout.
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let (ws_stream, _response) = tokio::time::timeout(
            config.timeout(),
            tokio_tungstenite::connect_async(config.websocket_url()),
        )
        .await
        .map_err(|_| Error::Timeout)??;
        let (write, read) = ws_stream.split();
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        let mut client = Self {
            write,
            read,
            message_id: 1,
            requests_tx,
            requests_rx,
            active: FxHashSet::default(),
            pending: FxHashMap::default(),
            queued: VecDeque::new(),
            outgoing: VecDeque::new(),
            unflushed: false,
        };

        let connect_id = client.enqueue(CommandBody::Connect {
            token: config.token().to_string(),
            name: CLIENT_NAME.to_string(),
        })?;
        tokio::time::timeout(config.timeout(), client.await_reply(connect_id))
            .await
            .map_err(|_| Error::Timeout)??;

        info!(url = config.websocket_url(), "connected");
        Ok(client)
    }

    /// Wait for the reply to command `id`, answering pings meanwhile
    async fn await_reply(&mut self, id: u64) -> Result<(), Error> {
        loop {
            self.flush_outgoing().await?;

            let text = match self.read.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(data))) => {
                    self.outgoing.push_back(Message::Pong(data));
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                let reply: Reply = serde_json::from_str(line)?;
                if reply.is_ping() {
                    self.outgoing.push_back(Message::Text("{}".to_string()));
                    continue;
                }
                if reply.id != Some(id) {
                    continue;
                }
                return match reply.error {
                    Some(err) => Err(Error::Protocol {
                        code: err.code,
                        message: err.message,
                    }),
                    None => Ok(()),
                };
            }
        }
    }

    /// Get a transport handle for the session layer
    pub fn transport(&self) -> WsTransport {
        WsTransport {
            requests: self.requests_tx.clone(),
        }
    }

    /// Get the next command ID without incrementing
    pub fn next_message_id(&self) -> u64 {
        self.message_id
    }

    /// Channels currently requested on this connection
    pub fn active_channels(&self) -> impl Iterator<Item = &str> + '_ {
        self.active.iter().map(String::as_str)
    }

    /// Queue a command for the server
    fn enqueue(&mut self, body: CommandBody) -> Result<u64, Error> {
        let id = self.message_id;
        let json = serde_json::to_string(&Command { id, body })?;
        self.outgoing.push_back(Message::Text(json));
        self.message_id += 1;
        Ok(id)
    }

    /// Write every queued frame.
    ///
    /// A frame leaves the queue only after the sink accepted it, so a
    /// cancelled flush is resumed by the next call without duplicates.
    async fn flush_outgoing(&mut self) -> Result<(), Error> {
        while let Some(message) = self.outgoing.front() {
            self.write.feed(message.clone()).await?;
            self.outgoing.pop_front();
            self.unflushed = true;
        }
        if self.unflushed {
            self.write.flush().await?;
            self.unflushed = false;
        }
        Ok(())
    }

    /// Queue a subscribe for `channel`; its full book arrives as
    /// [`ChannelEvent::Subscribed`]
    fn queue_subscribe(&mut self, channel: &str) -> Result<u64, Error> {
        let id = self.enqueue(CommandBody::Subscribe {
            channel: channel.to_string(),
        })?;
        self.pending.insert(id, channel.to_string());
        self.active.insert(channel.to_string());
        debug!(%channel, id, "subscribe queued");
        Ok(id)
    }

    /// Queue an unsubscribe for `channel`; events for it stop being
    /// returned immediately, even if some are still in flight
    fn queue_unsubscribe(&mut self, channel: &str) -> Result<u64, Error> {
        self.active.remove(channel);
        self.pending.retain(|_, c| c != channel);
        self.queued.retain(|ev| ev.channel() != channel);
        let id = self.enqueue(CommandBody::Unsubscribe {
            channel: channel.to_string(),
        })?;
        debug!(%channel, id, "unsubscribe queued");
        Ok(id)
    }

    /// Subscribe to `channel` and send the command right away
    pub async fn subscribe(&mut self, channel: &str) -> Result<u64, Error> {
        let id = self.queue_subscribe(channel)?;
        self.flush_outgoing().await?;
        Ok(id)
    }

    /// Unsubscribe from `channel` and send the command right away
    pub async fn unsubscribe(&mut self, channel: &str) -> Result<u64, Error> {
        let id = self.queue_unsubscribe(channel)?;
        self.flush_outgoing().await?;
        Ok(id)
    }

    /// Queue the command for a transport request; it is written by the next
    /// call to [`next`](Self::next)
    pub fn request(&mut self, request: ControlRequest) -> Result<u64, Error> {
        match request {
            ControlRequest::Subscribe(channel) => self.queue_subscribe(&channel),
            ControlRequest::Unsubscribe(channel) => self.queue_unsubscribe(&channel),
        }
    }

    /// Receive the next channel event
    ///
    /// Queued transport requests are sent while waiting. Server pings are
    /// answered automatically.
    ///
    /// # Returns
    ///
    /// The next event, or `None` if the stream ended.
    pub async fn next(&mut self) -> Option<Result<ChannelEvent, Error>> {
        loop {
            if let Err(e) = self.flush_outgoing().await {
                return Some(Err(e));
            }

            if let Some(event) = self.queued.pop_front() {
                return Some(Ok(event));
            }

            tokio::select! {
                request = self.requests_rx.recv() => {
                    // the client holds a sender, so the queue never closes
                    if let Some(request) = request {
                        if let Err(e) = self.request(request) {
                            return Some(Err(e));
                        }
                    }
                }
                frame = self.read.next() => {
                    match frame {
                        None => return None,
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.decode_frame(&text) {
                                return Some(Err(e));
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.outgoing.push_back(Message::Pong(data));
                        }
                        Some(Ok(Message::Close(_))) => return Some(Err(Error::ConnectionClosed)),
                        // Binary, Pong, Frame
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Some(Err(e.into())),
                    }
                }
            }
        }
    }

    /// Decode a text frame (possibly several newline-separated replies)
    /// into queued events and owed pongs. Returns the first error, after
    /// handling every other line of the frame.
    fn decode_frame(&mut self, text: &str) -> Result<(), Error> {
        let mut first_error = None;

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let reply: Reply = match serde_json::from_str(line) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "undecodable reply");
                    first_error.get_or_insert(Error::Json(e));
                    continue;
                }
            };

            if reply.is_ping() {
                self.outgoing.push_back(Message::Text("{}".to_string()));
                continue;
            }

            if let Some(err) = reply.error {
                let channel = reply.id.and_then(|id| self.pending.remove(&id));
                warn!(code = err.code, message = %err.message, ?channel, "command failed");
                first_error.get_or_insert(Error::Protocol {
                    code: err.code,
                    message: err.message,
                });
                continue;
            }

            if let Some(subscribe) = reply.subscribe {
                let channel = reply.id.and_then(|id| self.pending.remove(&id));
                match (channel, subscribe.data) {
                    (Some(channel), Some(data)) => {
                        self.queued.push_back(ChannelEvent::Subscribed { channel, data })
                    }
                    (Some(channel), None) => {
                        debug!(%channel, "subscribe reply without initial book")
                    }
                    // superseded by an unsubscribe
                    (None, _) => {}
                }
                continue;
            }

            if let Some(push) = reply.push {
                if let Some(publication) = push.publication {
                    if self.active.contains(&push.channel) {
                        self.queued.push_back(ChannelEvent::Publication {
                            channel: push.channel,
                            data: publication.data,
                        });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close the WebSocket connection
    pub async fn close(&mut self) -> Result<(), Error> {
        self.write.close().await?;
        Ok(())
    }
}

/// Backoff between reconnection attempts.
///
/// The delay doubles from `initial_delay` up to `max_delay`. Every
/// successful reconnect replays the subscriptions, so each one costs a full
/// book per channel; `max_attempts` bounds how long a dead feed is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(15),
            max_attempts: Some(20),
        }
    }
}

impl ReconnectConfig {
    /// Default backoff: 250ms doubling to 15s, at most 20 attempts
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay before the first attempt
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Upper bound for any single delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Give up after `attempts` consecutive failures
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Retry forever
    #[must_use]
    pub fn unlimited(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Whether attempt number `attempt` (zero-based) may still be made
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Delay before attempt number `attempt` (zero-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// WebSocket client with automatic reconnection support.
///
/// This wrapper around [`WebSocketClient`] provides:
/// - Automatic reconnection with exponential backoff when the socket drops
/// - Replay of requested channels after reconnection (each replay yields a
///   fresh full book, which re-initializes the session)
/// - A [`WsTransport`] handle that stays valid across reconnections
pub struct ReconnectingWebSocket {
    /// The underlying WebSocket client
    client: Option<WebSocketClient>,
    /// Configuration for API connection
    config: Config,
    /// Reconnection configuration
    reconnect_config: ReconnectConfig,
    requests_tx: mpsc::UnboundedSender<ControlRequest>,
    requests_rx: mpsc::UnboundedReceiver<ControlRequest>,
    /// Channels to replay after reconnection
    channels: FxHashSet<String>,
    /// Current reconnection attempt
    reconnect_attempt: u32,
}

impl std::fmt::Debug for ReconnectingWebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingWebSocket")
            .field("connected", &self.client.is_some())
            .field("reconnect_attempt", &self.reconnect_attempt)
            .field("channel_count", &self.channels.len())
            .finish()
    }
}

/// Errors after which the socket is gone and a reconnect is worth trying
fn is_disconnect(error: &Error) -> bool {
    matches!(error, Error::ConnectionClosed | Error::WebSocket(_))
}

impl ReconnectingWebSocket {
    /// Connect with reconnection support
    pub async fn connect(config: Config, reconnect_config: ReconnectConfig) -> Result<Self, Error> {
        let client = WebSocketClient::connect(&config).await?;
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();

        Ok(Self {
            client: Some(client),
            config,
            reconnect_config,
            requests_tx,
            requests_rx,
            channels: FxHashSet::default(),
            reconnect_attempt: 0,
        })
    }

    /// Get a transport handle that survives reconnections
    pub fn transport(&self) -> WsTransport {
        WsTransport {
            requests: self.requests_tx.clone(),
        }
    }

    /// Check if currently connected
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Get the current reconnection attempt number
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Receive the next event, reconnecting if necessary
    pub async fn next(&mut self) -> Option<Result<ChannelEvent, Error>> {
        loop {
            let client = match self.client.as_mut() {
                Some(client) => client,
                None => {
                    if let Err(e) = self.attempt_reconnect().await {
                        return Some(Err(e));
                    }
                    continue;
                }
            };

            tokio::select! {
                request = self.requests_rx.recv() => {
                    let Some(request) = request else { continue };
                    match &request {
                        ControlRequest::Subscribe(channel) => {
                            self.channels.insert(channel.clone());
                        }
                        ControlRequest::Unsubscribe(channel) => {
                            self.channels.remove(channel);
                        }
                    }
                    if let Some(client) = self.client.as_mut() {
                        if let Err(e) = client.request(request) {
                            return Some(Err(e));
                        }
                    }
                }
                event = client.next() => {
                    match event {
                        Some(Ok(event)) => {
                            self.reconnect_attempt = 0;
                            return Some(Ok(event));
                        }
                        None => {
                            warn!("connection ended, reconnecting");
                            self.client = None;
                        }
                        Some(Err(e)) if is_disconnect(&e) => {
                            warn!(error = %e, "connection lost, reconnecting");
                            self.client = None;
                        }
                        Some(Err(e)) => return Some(Err(e)),
                    }
                }
            }
        }
    }

    /// Attempt to reconnect with exponential backoff
    async fn attempt_reconnect(&mut self) -> Result<(), Error> {
        loop {
            if !self.reconnect_config.allows_attempt(self.reconnect_attempt) {
                return Err(Error::ConnectionClosed);
            }

            let delay = self.reconnect_config.delay_for_attempt(self.reconnect_attempt);
            tokio::time::sleep(delay).await;
            self.reconnect_attempt += 1;

            let mut client = match WebSocketClient::connect(&self.config).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(attempt = self.reconnect_attempt, error = %e, "reconnect failed");
                    continue;
                }
            };

            // written by the client's next call to `next`
            for channel in &self.channels {
                client.queue_subscribe(channel)?;
            }

            info!(
                attempt = self.reconnect_attempt,
                channels = self.channels.len(),
                "reconnected"
            );
            self.client = Some(client);
            return Ok(());
        }
    }

    /// Close the WebSocket connection
    pub async fn close(&mut self) -> Result<(), Error> {
        if let Some(ref mut client) = self.client {
            client.close().await?;
        }
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let config = ReconnectConfig::new()
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(1));

        let delays: Vec<_> = (0..6).map(|n| config.delay_for_attempt(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_backoff_survives_large_attempt_numbers() {
        let config = ReconnectConfig::new()
            .with_initial_delay(Duration::from_secs(3600))
            .with_max_delay(Duration::MAX)
            .unlimited();

        assert!(config.allows_attempt(u32::MAX - 1));
        assert_eq!(
            config.delay_for_attempt(64),
            Duration::from_secs(3600).saturating_mul(u32::MAX)
        );
    }

    #[test]
    fn test_attempt_limit() {
        let config = ReconnectConfig::new().with_max_attempts(2);
        assert!(config.allows_attempt(0));
        assert!(config.allows_attempt(1));
        assert!(!config.allows_attempt(2));
        assert!(ReconnectConfig::default().allows_attempt(19));
        assert!(!ReconnectConfig::default().allows_attempt(20));
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(is_disconnect(&Error::ConnectionClosed));
        assert!(is_disconnect(&Error::WebSocket(
            tokio_tungstenite::tungstenite::Error::ConnectionClosed
        )));
        assert!(!is_disconnect(&Error::Protocol {
            code: 109,
            message: "token expired".to_string(),
        }));
    }

    #[test]
    fn test_transport_queues_requests() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport { requests: tx };

        transport.resubscribe("orderbook:BTC-USD").unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            ControlRequest::Unsubscribe("orderbook:BTC-USD".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ControlRequest::Subscribe("orderbook:BTC-USD".to_string())
        );
    }

    #[test]
    fn test_transport_fails_after_client_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut transport = WsTransport { requests: tx };
        drop(rx);

        let err = transport.subscribe("orderbook:BTC-USD").unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }
}
