//! Book sides and the two-sided order book snapshot.
//!
//! Each side keeps its levels in a `BTreeMap` keyed by `Reverse<Price>`, so
//! native iteration order is price-descending, which is the display order for
//! both sides. No separate order array has to be kept in sync with the map.
//!
//! - O(log n) lookup, insertion and removal by price
//! - O(1) access to the best level of either side
//! - Ordered iteration for depth-of-book rendering

use std::cmp::Reverse;
use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::level::{DepthRow, PriceLevel};
use crate::types::{Price, Quantity, Side};

/// One side (bids or asks) of the book.
///
/// Invariant: every stored level has a positive quantity, and iteration
/// yields each price once, highest first.
#[derive(Debug)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Reverse<Price>, PriceLevel>,
}

impl BookSide {
    /// Create an empty side
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Which side this is
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of price levels
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the side has no levels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Level at `price`, if present
    #[must_use]
    pub fn get(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&Reverse(price))
    }

    /// Levels in display order (price-descending)
    pub fn levels(&self) -> impl DoubleEndedIterator<Item = &PriceLevel> + ExactSizeIterator + '_ {
        self.levels.values()
    }

    /// Prices in display order (price-descending)
    pub fn prices(&self) -> impl Iterator<Item = Price> + '_ {
        self.levels.keys().map(|Reverse(p)| *p)
    }

    /// Current figures of every level in display order
    pub fn rows(&self) -> impl Iterator<Item = DepthRow> + '_ {
        self.levels().map(PriceLevel::row)
    }

    /// Levels ordered best price first.
    ///
    /// Bids: highest first, the same as display order. Asks: lowest first,
    /// which is the *reverse* of display order. Cumulative depth is
    /// accumulated in this order (best-ask-first accumulation despite
    /// descending display order), so the asymmetry must stay.
    pub fn best_first(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Bid => Box::new(self.levels()),
            Side::Ask => Box::new(self.levels().rev()),
        }
    }

    /// Best level: highest bid or lowest ask
    #[must_use]
    pub fn best(&self) -> Option<&PriceLevel> {
        match self.side {
            Side::Bid => self.levels.first_key_value().map(|(_, l)| l),
            Side::Ask => self.levels.last_key_value().map(|(_, l)| l),
        }
    }

    /// Top `n` levels, best first
    #[must_use]
    pub fn top(&self, n: usize) -> Vec<DepthRow> {
        self.best_first().take(n).map(PriceLevel::row).collect()
    }

    /// Sum of all resting quantities on this side.
    ///
    /// The reconciler never stores levels whose sum would overflow; should
    /// it happen anyway the result saturates at `Decimal::MAX`.
    #[must_use]
    pub fn total_depth(&self) -> Quantity {
        self.levels()
            .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.quantity().current_value()))
            .unwrap_or(Decimal::MAX)
    }

    /// Set the resting quantity at `price`, reusing the existing level so
    /// its channels keep their observers. Returns `true` if a level was
    /// created.
    pub(crate) fn upsert(&mut self, price: Price, quantity: Quantity) -> bool {
        debug_assert!(quantity > Decimal::ZERO);
        match self.levels.get(&Reverse(price)) {
            Some(level) => {
                level.set_quantity(quantity);
                false
            }
            None => {
                self.levels
                    .insert(Reverse(price), PriceLevel::new(price, quantity));
                true
            }
        }
    }

    /// Drop the level at `price`, if present
    pub(crate) fn remove(&mut self, price: Price) -> Option<PriceLevel> {
        self.levels.remove(&Reverse(price))
    }

    /// Remove all levels
    pub fn clear(&mut self) {
        self.levels.clear();
    }
}

/// Both sides of the book at a point in time.
///
/// Created empty; the reconciler mutates it in place on every accepted
/// update. Not `Clone`: levels are shared channel handles, so a copy would
/// alias the same observers.
#[derive(Debug)]
pub struct OrderBook {
    bids: BookSide,
    asks: BookSide,
}

impl OrderBook {
    /// Create an empty book
    #[must_use]
    pub fn new() -> Self {
        Self {
            bids: BookSide::new(Side::Bid),
            asks: BookSide::new(Side::Ask),
        }
    }

    /// Bid side
    #[must_use]
    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    /// Ask side
    #[must_use]
    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    /// Side by tag
    #[must_use]
    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    pub(crate) fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    /// Best bid as `(price, quantity)`
    #[must_use]
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids
            .best()
            .map(|l| (l.price(), l.quantity().current_value()))
    }

    /// Best ask as `(price, quantity)`
    #[must_use]
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks
            .best()
            .map(|l| (l.price(), l.quantity().current_value()))
    }

    /// Average of best bid and best ask, or `None` if either is missing
    #[must_use]
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid
                .checked_add(ask)
                .map(|sum| sum / Decimal::TWO)
                // same-sign extremes: step half the distance from the bid
                .or_else(|| {
                    ask.checked_sub(bid)
                        .and_then(|gap| bid.checked_add(gap / Decimal::TWO))
                }),
            _ => None,
        }
    }

    /// Best ask minus best bid, or `None` if either is missing or the
    /// difference is out of range
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => ask.checked_sub(bid),
            _ => None,
        }
    }

    /// Check if the book is crossed (best bid >= best ask)
    ///
    /// This shouldn't happen in a healthy feed but is useful for validation.
    #[must_use]
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => bid >= ask,
            _ => false,
        }
    }

    /// Number of levels as `(bids, asks)`
    #[must_use]
    pub fn num_levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    /// Whether both sides are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Remove every level from both sides
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}
