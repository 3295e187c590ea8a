//! Transport seam between the session layer and the network.
//!
//! The session only needs two things from its transport: subscription
//! control for a named channel, and a stream of [`ChannelEvent`]s delivered
//! in order. [`Transport`] covers the first; whoever owns the transport
//! feeds events to [`OrderBookProvider::dispatch`].
//!
//! [`OrderBookProvider::dispatch`]: crate::orderbook::OrderBookProvider::dispatch

use crate::error::Error;
use crate::types::messages::BookMessage;

/// Channel carrying the order book of `symbol`
pub fn channel_for(symbol: &str) -> String {
    format!("orderbook:{}", symbol)
}

/// Subscription control offered by a market-data transport.
///
/// Calls are synchronous and must not block: implementations backed by an
/// async connection queue the request and perform it later.
pub trait Transport {
    /// Start delivering events for `channel`
    fn subscribe(&mut self, channel: &str) -> Result<(), Error>;

    /// Stop delivering events for `channel`
    fn unsubscribe(&mut self, channel: &str) -> Result<(), Error>;

    /// Tear down and re-establish `channel`, so the server sends a fresh
    /// full book
    fn resubscribe(&mut self, channel: &str) -> Result<(), Error> {
        self.unsubscribe(channel)?;
        self.subscribe(channel)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn subscribe(&mut self, channel: &str) -> Result<(), Error> {
        (**self).subscribe(channel)
    }

    fn unsubscribe(&mut self, channel: &str) -> Result<(), Error> {
        (**self).unsubscribe(channel)
    }

    fn resubscribe(&mut self, channel: &str) -> Result<(), Error> {
        (**self).resubscribe(channel)
    }
}

/// Event delivered by the transport for a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Subscription confirmed; carries the full book
    Subscribed {
        /// Channel name
        channel: String,
        /// Full book
        data: BookMessage,
    },
    /// Incremental update
    Publication {
        /// Channel name
        channel: String,
        /// Delta
        data: BookMessage,
    },
}

impl ChannelEvent {
    /// Channel the event belongs to
    pub fn channel(&self) -> &str {
        match self {
            ChannelEvent::Subscribed { channel, .. } | ChannelEvent::Publication { channel, .. } => {
                channel
            }
        }
    }

    /// Book payload
    pub fn data(&self) -> &BookMessage {
        match self {
            ChannelEvent::Subscribed { data, .. } | ChannelEvent::Publication { data, .. } => data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Transport for Recorder {
        fn subscribe(&mut self, channel: &str) -> Result<(), Error> {
            self.0.push(format!("sub {}", channel));
            Ok(())
        }

        fn unsubscribe(&mut self, channel: &str) -> Result<(), Error> {
            self.0.push(format!("unsub {}", channel));
            Ok(())
        }
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(channel_for("BTC-USD"), "orderbook:BTC-USD");
    }

    #[test]
    fn test_default_resubscribe_is_unsub_then_sub() {
        let mut transport = Recorder::default();
        transport.resubscribe("orderbook:ETH-USD").unwrap();
        assert_eq!(
            transport.0,
            vec!["unsub orderbook:ETH-USD", "sub orderbook:ETH-USD"]
        );
    }
}
