//! Depth-of-market book and its reconciliation.
//!
//! This module provides:
//!
//! - [`PriceLevel`] - one ladder row whose figures are observable channels
//! - [`BookSide`] / [`OrderBook`] - price-descending sides and the two-sided book
//! - [`BookUpdate`] - the `previous -> next` transformation built from a message
//! - [`OrderBookProvider`] - sequence tracking, gap resync and subscriptions
//!
//! # Example
//!
//! ```rust
//! use depth_ladder::orderbook::{BookUpdate, OrderBook};
//! use depth_ladder::types::BookMessage;
//! use rust_decimal::Decimal;
//!
//! let full = BookMessage::new("BTC-USD", 1)
//!     .with_bids(&[("100", "2"), ("99", "3")])
//!     .with_asks(&[("101", "1"), ("102", "4")]);
//! let book = BookUpdate::full_replace(full).apply(OrderBook::new());
//!
//! let level = book.asks().get(Decimal::from(101)).unwrap();
//! assert_eq!(level.cumulative_depth().current_value(), Decimal::from(1));
//! assert_eq!(level.cumulative_depth_share().current_value(), Decimal::from(20));
//! ```

pub mod book;
pub mod level;
pub mod reconcile;
pub mod session;

pub use book::{BookSide, OrderBook};
pub use level::{DepthRow, PriceLevel};
pub use reconcile::{apply_update, BookUpdate};
pub use session::{BookSubscription, OrderBookProvider, SessionState};
