//! Book messages and transport frames.
//!
//! [`BookMessage`] is the logical payload the reconciler consumes, both for
//! the initial full book (carried by a subscribe reply) and for deltas
//! (carried by publications). The remaining types are the JSON frames of the
//! Centrifuge-style protocol spoken by the WebSocket transport:
//!
//! ```text
//! -> {"id":1,"connect":{"token":"...","name":"depth-ladder"}}
//! -> {"id":2,"subscribe":{"channel":"orderbook:BTC-USD"}}
//! <- {"id":2,"subscribe":{"data":{"market_id":"BTC-USD","sequence":1,...}}}
//! <- {"push":{"channel":"orderbook:BTC-USD","pub":{"data":{...}}}}
//! <- {}                      (server ping, answered with {})
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One `(price, quantity)` pair exactly as received.
///
/// Fields stay textual until reconciliation so that a single malformed pair
/// can be dropped without rejecting the whole message. JSON numbers are
/// accepted and kept as their textual form; any other JSON type becomes an
/// empty (and therefore malformed) field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawLevel(pub String, pub String);

impl RawLevel {
    /// Build a pair from anything string-like
    pub fn new(price: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self(price.into(), quantity.into())
    }

    /// Price field as received
    pub fn price(&self) -> &str {
        &self.0
    }

    /// Quantity field as received
    pub fn quantity(&self) -> &str {
        &self.1
    }
}

impl<'de> Deserialize<'de> for RawLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (price, quantity) = <(Value, Value)>::deserialize(deserializer)?;
        Ok(Self(field_text(price), field_text(quantity)))
    }
}

fn field_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Order book message for one instrument.
///
/// Used both as a full replace (subscribe reply) and as a delta
/// (publication). Quantities are absolute new resting sizes; zero removes
/// the level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMessage {
    /// Instrument symbol, e.g. `BTC-USD`
    pub market_id: String,
    /// Sequence number; each delta increments it by one
    pub sequence: u64,
    /// Server timestamp (microseconds), if provided
    #[serde(default)]
    pub timestamp: Option<u64>,
    /// Bid pairs
    #[serde(default)]
    pub bids: Vec<RawLevel>,
    /// Ask pairs
    #[serde(default)]
    pub asks: Vec<RawLevel>,
}

impl BookMessage {
    /// Create an empty message for `market_id` at `sequence`
    pub fn new(market_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            market_id: market_id.into(),
            sequence,
            timestamp: None,
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Replace the bid pairs
    #[must_use]
    pub fn with_bids(mut self, bids: &[(&str, &str)]) -> Self {
        self.bids = bids.iter().map(|&(p, q)| RawLevel::new(p, q)).collect();
        self
    }

    /// Replace the ask pairs
    #[must_use]
    pub fn with_asks(mut self, asks: &[(&str, &str)]) -> Self {
        self.asks = asks.iter().map(|&(p, q)| RawLevel::new(p, q)).collect();
        self
    }
}

/// Command sent to the server
#[derive(Debug, Clone, Serialize)]
pub struct Command {
    /// Command ID; the reply carries the same ID
    pub id: u64,
    /// Command body
    #[serde(flatten)]
    pub body: CommandBody,
}

/// Command body, serialized as a single keyed object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandBody {
    /// Authenticate the connection
    Connect {
        /// Access token
        token: String,
        /// Client name reported to the server
        name: String,
    },
    /// Subscribe to a channel
    Subscribe {
        /// Channel name
        channel: String,
    },
    /// Unsubscribe from a channel
    Unsubscribe {
        /// Channel name
        channel: String,
    },
}

/// A reply or push frame received from the server.
///
/// Exactly one of the optional sections is normally present; an empty frame
/// is a server ping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reply {
    /// ID of the command this replies to (absent for pushes)
    #[serde(default)]
    pub id: Option<u64>,
    /// Error reply
    #[serde(default)]
    pub error: Option<ReplyError>,
    /// Connect reply
    #[serde(default)]
    pub connect: Option<Value>,
    /// Subscribe reply
    #[serde(default)]
    pub subscribe: Option<SubscribeResult>,
    /// Unsubscribe reply
    #[serde(default)]
    pub unsubscribe: Option<Value>,
    /// Asynchronous push
    #[serde(default)]
    pub push: Option<Push>,
}

impl Reply {
    /// Whether this frame is a server ping (`{}`)
    pub fn is_ping(&self) -> bool {
        self.id.is_none()
            && self.error.is_none()
            && self.connect.is_none()
            && self.subscribe.is_none()
            && self.unsubscribe.is_none()
            && self.push.is_none()
    }
}

/// Error section of a reply
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyError {
    /// Error code
    pub code: u32,
    /// Error message
    #[serde(default)]
    pub message: String,
}

/// Subscribe reply; `data` carries the initial full book
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResult {
    /// Initial book state
    #[serde(default)]
    pub data: Option<BookMessage>,
}

/// Push frame
#[derive(Debug, Clone, Deserialize)]
pub struct Push {
    /// Channel the push belongs to
    #[serde(default)]
    pub channel: String,
    /// Publication, if this push is one
    #[serde(rename = "pub", default)]
    pub publication: Option<Publication>,
}

/// Publication carried by a push
#[derive(Debug, Clone, Deserialize)]
pub struct Publication {
    /// Delta payload
    pub data: BookMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_command_serialization() {
        let cmd = Command {
            id: 2,
            body: CommandBody::Subscribe {
                channel: "orderbook:BTC-USD".to_string(),
            },
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 2, "subscribe": {"channel": "orderbook:BTC-USD"}})
        );
    }

    #[test]
    fn test_push_deserialization() {
        let json = r#"{
            "push": {
                "channel": "orderbook:BTC-USD",
                "pub": {
                    "data": {
                        "market_id": "BTC-USD",
                        "sequence": 42,
                        "timestamp": 1700000000000000,
                        "bids": [["100.5", "0"], ["100", "2.25"]],
                        "asks": []
                    }
                }
            }
        }"#;

        let reply: Reply = serde_json::from_str(json).unwrap();
        assert!(!reply.is_ping());
        let push = reply.push.unwrap();
        assert_eq!(push.channel, "orderbook:BTC-USD");
        let data = push.publication.unwrap().data;
        assert_eq!(data.sequence, 42);
        assert_eq!(data.bids[1], RawLevel::new("100", "2.25"));
    }

    #[test]
    fn test_numeric_and_bad_fields_stay_textual() {
        let json = r#"{"market_id":"BTC-USD","sequence":1,"bids":[[100, "1"], [null, "2"]]}"#;
        let msg: BookMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.bids[0].price(), "100");
        assert_eq!(msg.bids[1].price(), "");
        assert!(msg.asks.is_empty());
    }

    #[test]
    fn test_empty_frame_is_ping() {
        let reply: Reply = serde_json::from_str("{}").unwrap();
        assert!(reply.is_ping());
    }

    #[test]
    fn test_error_reply() {
        let reply: Reply =
            serde_json::from_str(r#"{"id":3,"error":{"code":102,"message":"unknown channel"}}"#)
                .unwrap();
        let err = reply.error.unwrap();
        assert_eq!(err.code, 102);
        assert_eq!(err.message, "unknown channel");
    }
}
