//! Session layer: sequence integrity and resync for one book per symbol.
//!
//! [`OrderBookProvider`] owns the transport, keeps one session per
//! subscribed symbol, and turns transport events into [`BookUpdate`]s for
//! the session's consumer.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --subscribe--> AwaitingSnapshot --full book--> Synced
//! Synced --delta seq == last+1--> Synced (update emitted)
//! Synced --delta seq != last+1--> AwaitingSnapshot (resubscribe requested)
//! any --cancel--> Idle
//! ```
//!
//! # Sequence Tracking
//!
//! Each session remembers the last accepted sequence number. Out-of-order
//! and duplicate sequences are gaps: nothing is buffered or reordered, the
//! channel is resubscribed and the next full book re-initializes the
//! session. The consumer's last committed book stays as it was during that
//! window, and no updates are emitted for it; [`OrderBookProvider::state`]
//! reports `AwaitingSnapshot` so a display can mark it stale.
//!
//! # Threading
//!
//! Single-threaded and synchronous: everything runs inside
//! [`OrderBookProvider::dispatch`] on the thread that reads the transport.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use super::reconcile::BookUpdate;
use crate::client::transport::{channel_for, ChannelEvent, Transport};
use crate::error::Error;
use crate::observable::Subscription;

/// Cancel handle returned by [`OrderBookProvider::subscribe`]
pub type BookSubscription = Subscription;

/// State of a symbol's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No subscription
    Idle,
    /// Subscribed, waiting for a full book (initially or after a gap)
    AwaitingSnapshot,
    /// Applying deltas in sequence
    Synced,
}

type UpdateCallback = Rc<dyn Fn(BookUpdate)>;

struct Session {
    symbol: String,
    state: SessionState,
    /// Set by the first full book
    last_sequence: Option<u64>,
    on_update: UpdateCallback,
}

/// What `dispatch` has to do once the session map is released
enum Action {
    Emit(UpdateCallback, BookUpdate),
    Resubscribe(String, Error),
}

impl Session {
    fn handle(&mut self, event: ChannelEvent) -> Result<Option<Action>, Error> {
        let got = &event.data().market_id;
        if *got != self.symbol {
            error!(
                expected = %self.symbol,
                got = %got,
                "received book for a different symbol, ignoring"
            );
            return Err(Error::SymbolMismatch {
                expected: self.symbol.clone(),
                got: got.clone(),
            });
        }

        match event {
            ChannelEvent::Subscribed { data, .. } => {
                debug!(symbol = %self.symbol, sequence = data.sequence, "full book received");
                self.last_sequence = Some(data.sequence);
                self.state = SessionState::Synced;
                Ok(Some(Action::Emit(
                    Rc::clone(&self.on_update),
                    BookUpdate::full_replace(data),
                )))
            }
            ChannelEvent::Publication { channel, data } => {
                let last = match (self.state, self.last_sequence) {
                    (SessionState::Synced, Some(last)) => last,
                    _ => {
                        debug!(
                            symbol = %self.symbol,
                            sequence = data.sequence,
                            "dropping delta while awaiting full book"
                        );
                        return Ok(None);
                    }
                };

                let expected = last + 1;
                if data.sequence != expected {
                    warn!(
                        symbol = %self.symbol,
                        expected,
                        got = data.sequence,
                        "sequence gap, resubscribing"
                    );
                    self.state = SessionState::AwaitingSnapshot;
                    return Ok(Some(Action::Resubscribe(
                        channel,
                        Error::SequenceGap {
                            expected,
                            got: data.sequence,
                        },
                    )));
                }

                self.last_sequence = Some(data.sequence);
                Ok(Some(Action::Emit(
                    Rc::clone(&self.on_update),
                    BookUpdate::delta(data),
                )))
            }
        }
    }
}

/// Order book sessions over one transport.
///
/// At most one session per symbol: fan-out to several consumers of the
/// same symbol needs a caching layer on top, which this type does not
/// provide.
///
/// # Example
///
/// ```rust
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use depth_ladder::client::transport::{ChannelEvent, Transport};
/// use depth_ladder::orderbook::{OrderBook, OrderBookProvider};
/// use depth_ladder::types::BookMessage;
///
/// struct Noop;
/// impl Transport for Noop {
///     fn subscribe(&mut self, _: &str) -> Result<(), depth_ladder::Error> { Ok(()) }
///     fn unsubscribe(&mut self, _: &str) -> Result<(), depth_ladder::Error> { Ok(()) }
/// }
///
/// let provider = OrderBookProvider::new(Noop);
/// let book = Rc::new(RefCell::new(OrderBook::new()));
///
/// let state = Rc::clone(&book);
/// let sub = provider
///     .subscribe("BTC-USD", move |update| {
///         let previous = state.replace(OrderBook::new());
///         *state.borrow_mut() = update.apply(previous);
///     })
///     .unwrap();
///
/// let full = BookMessage::new("BTC-USD", 1).with_bids(&[("100", "2")]);
/// provider
///     .dispatch(ChannelEvent::Subscribed { channel: "orderbook:BTC-USD".into(), data: full })
///     .unwrap();
/// assert_eq!(book.borrow().num_levels(), (1, 0));
///
/// sub.cancel();
/// ```
pub struct OrderBookProvider<T> {
    transport: Rc<RefCell<T>>,
    /// Sessions by channel name
    sessions: Rc<RefCell<FxHashMap<String, Session>>>,
}

impl<T: Transport + 'static> OrderBookProvider<T> {
    /// Create a provider over `transport`
    pub fn new(transport: T) -> Self {
        Self {
            transport: Rc::new(RefCell::new(transport)),
            sessions: Rc::new(RefCell::new(FxHashMap::default())),
        }
    }

    /// Subscribe to `symbol`'s book.
    ///
    /// `on_update` receives a [`BookUpdate`] for the initial full book and
    /// for every in-sequence delta after it; applying each update to the
    /// consumer's current book yields the next one.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadySubscribed`] if a session for `symbol` exists
    /// - whatever the transport returns when asked to subscribe
    pub fn subscribe<F>(&self, symbol: &str, on_update: F) -> Result<BookSubscription, Error>
    where
        F: Fn(BookUpdate) + 'static,
    {
        let channel = channel_for(symbol);
        if self.sessions.borrow().contains_key(&channel) {
            return Err(Error::AlreadySubscribed(symbol.to_string()));
        }

        self.transport.borrow_mut().subscribe(&channel)?;
        self.sessions.borrow_mut().insert(
            channel.clone(),
            Session {
                symbol: symbol.to_string(),
                state: SessionState::AwaitingSnapshot,
                last_sequence: None,
                on_update: Rc::new(on_update),
            },
        );
        debug!(%symbol, %channel, "subscribed");

        let sessions = Rc::downgrade(&self.sessions);
        let transport = Rc::downgrade(&self.transport);
        Ok(Subscription::new(move || {
            let removed = sessions
                .upgrade()
                .and_then(|sessions| sessions.borrow_mut().remove(&channel));
            if removed.is_none() {
                return;
            }
            if let Some(transport) = transport.upgrade() {
                if let Err(e) = transport.borrow_mut().unsubscribe(&channel) {
                    warn!(%channel, error = %e, "transport unsubscribe failed");
                }
            }
            debug!(%channel, "unsubscribed");
        }))
    }

    /// Route one transport event to its session.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` - an update was handed to the session's consumer
    /// - `Ok(false)` - nothing to do (no session for the channel, or a
    ///   delta arrived while awaiting a full book)
    /// - `Err(SymbolMismatch)` - the payload named another symbol; ignored
    /// - `Err(SequenceGap)` - a gap was detected and a resubscribe was
    ///   requested; the delta was not applied
    /// - `Err(_)` - the transport rejected the resubscribe request
    ///
    /// None of these end the session.
    pub fn dispatch(&self, event: ChannelEvent) -> Result<bool, Error> {
        // the session map is released before calling out, so a consumer may
        // cancel (or subscribe) from inside its callback
        let action = {
            let mut sessions = self.sessions.borrow_mut();
            match sessions.get_mut(event.channel()) {
                Some(session) => session.handle(event)?,
                None => {
                    debug!(channel = event.channel(), "event for unsubscribed channel");
                    return Ok(false);
                }
            }
        };

        match action {
            None => Ok(false),
            Some(Action::Emit(on_update, update)) => {
                on_update(update);
                Ok(true)
            }
            Some(Action::Resubscribe(channel, gap)) => {
                self.transport.borrow_mut().resubscribe(&channel)?;
                Err(gap)
            }
        }
    }

    /// Session state for `symbol` (`Idle` if not subscribed)
    pub fn state(&self, symbol: &str) -> SessionState {
        self.sessions
            .borrow()
            .get(&channel_for(symbol))
            .map_or(SessionState::Idle, |s| s.state)
    }

    /// Last accepted sequence number for `symbol`
    pub fn last_sequence(&self, symbol: &str) -> Option<u64> {
        self.sessions
            .borrow()
            .get(&channel_for(symbol))
            .and_then(|s| s.last_sequence)
    }

    /// Symbols with a live session
    pub fn symbols(&self) -> Vec<String> {
        self.sessions
            .borrow()
            .values()
            .map(|s| s.symbol.clone())
            .collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }

    /// Whether there are no live sessions
    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }

    /// Borrow the transport
    pub fn transport(&self) -> Ref<'_, T> {
        self.transport.borrow()
    }
}

impl<T> fmt::Debug for OrderBookProvider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBookProvider")
            .field("sessions", &self.sessions.borrow().len())
            .finish()
    }
}
