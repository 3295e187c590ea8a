//! # depth-ladder
//!
//! Live depth-of-market ladder for a single instrument, reconciled from a
//! stream of full snapshots and incremental deltas.
//!
//! ## Features
//!
//! - **Observable levels** - every ladder row exposes its quantity and
//!   cumulative figures as [`Subject`](observable::Subject) channels, so a
//!   view bound to a row keeps its binding across updates
//! - **Exact prices** - `rust_decimal` prices and quantities, no float keys
//! - **Sequence tracking** - gaps trigger a resubscribe and a fresh full book
//! - **WebSocket transport** - Centrifuge-style protocol with reconnection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use depth_ladder::client::WebSocketClient;
//! use depth_ladder::orderbook::{OrderBook, OrderBookProvider};
//! use depth_ladder::Config;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> depth_ladder::Result<()> {
//!     let config = Config::from_env()?;
//!     let mut ws = WebSocketClient::connect(&config).await?;
//!     let provider = OrderBookProvider::new(ws.transport());
//!
//!     let book = Rc::new(RefCell::new(OrderBook::new()));
//!     let store = Rc::clone(&book);
//!     let _sub = provider.subscribe("BTC-USD", move |update| {
//!         let previous = store.take();
//!         *store.borrow_mut() = update.apply(previous);
//!     })?;
//!
//!     while let Some(event) = ws.next().await {
//!         provider.dispatch(event?)?;
//!         println!("best bid: {:?}", book.borrow().best_bid());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Ladder Orientation
//!
//! Both sides are displayed price-descending. Bids accumulate depth in
//! display order (best bid on top); asks accumulate from the lowest ask,
//! which sits at the bottom of the ask side. Cumulative share is
//! `cumulative / side total * 100`.
//!
//! ## Architecture
//!
//! This crate is organized into several modules:
//!
//! - [`observable`] - replay-latest value channel
//! - [`orderbook`] - levels, sides, reconciliation and the session adapter
//! - [`client`] - transport seam and WebSocket client
//! - [`types`] - wire messages, numeric aliases and instrument metadata
//! - [`config`] - connection settings
//! - [`error`] - error types for the crate
//!
//! The book and its sessions are single-threaded (`Rc`/`RefCell`). Drive
//! them from one task, e.g. a current-thread Tokio runtime.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod observable;
pub mod orderbook;
pub mod types;

// Re-export main types at crate root for convenience
pub use config::Config;
pub use error::Error;

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;
