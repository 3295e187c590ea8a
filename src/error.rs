//! Error types for the depth-ladder crate.
//!
//! The reconciliation core degrades instead of failing: malformed fields,
//! symbol mismatches, sequence gaps and observer panics are logged and
//! absorbed. The variants below cover the fallible edges around it
//! (transport, configuration and wire decoding), plus the gap/mismatch
//! conditions so they can be reported with context.

use thiserror::Error;

/// The main error type for this crate
#[derive(Debug, Error)]
pub enum Error {
    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (missing fields, bad format)
    #[error("Configuration error: {0}")]
    Config(String),

    /// WebSocket connection closed unexpectedly
    #[error("WebSocket connection closed")]
    ConnectionClosed,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Sequence gap detected (missed messages)
    #[error("Sequence gap: expected {expected}, got {got}")]
    SequenceGap {
        /// Expected sequence number
        expected: u64,
        /// Actual sequence number received
        got: u64,
    },

    /// Message carried a different symbol than the subscription
    #[error("Symbol mismatch: subscribed to {expected}, message for {got}")]
    SymbolMismatch {
        /// Subscribed symbol
        expected: String,
        /// Symbol found in the message
        got: String,
    },

    /// A live session already exists for this symbol
    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),

    /// Transport refused a subscription control request
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server replied to a command with an error
    #[error("Protocol error ({code}): {message}")]
    Protocol {
        /// Server error code
        code: u32,
        /// Server error message
        message: String,
    },
}

impl From<tokio_tungstenite::tungstenite::http::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::http::Error) -> Self {
        Error::Config(format!("HTTP error building WebSocket request: {}", err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Config(format!("invalid URL: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_gap_display() {
        let err = Error::SequenceGap {
            expected: 6,
            got: 8,
        };
        assert_eq!(err.to_string(), "Sequence gap: expected 6, got 8");
    }

    #[test]
    fn test_symbol_mismatch_display() {
        let err = Error::SymbolMismatch {
            expected: "BTC-USD".to_string(),
            got: "ETH-USD".to_string(),
        };
        assert!(err.to_string().contains("BTC-USD"));
        assert!(err.to_string().contains("ETH-USD"));
    }

    #[test]
    fn test_url_error_maps_to_config() {
        let err: Error = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
