//! Network side of the crate.
//!
//! This module contains:
//!
//! - [`transport`] - the [`Transport`] seam and the events it delivers
//! - [`websocket`] - WebSocket client implementing it, with reconnection

pub mod transport;
pub mod websocket;

pub use transport::{channel_for, ChannelEvent, Transport};
pub use websocket::{ReconnectConfig, ReconnectingWebSocket, WebSocketClient, WsTransport};
