//! Update reconciliation.
//!
//! Merges a [`BookMessage`] onto an [`OrderBook`] and refreshes the derived
//! cumulative figures. Levels are looked up by price and mutated in place,
//! so a level that survives an update keeps its channels (and whatever is
//! bound to them).
//!
//! Merge rule, per side and per `(price, quantity)` pair:
//!
//! - `quantity > 0`: set the level's quantity to that absolute value,
//!   creating the level if needed
//! - `quantity <= 0`: remove the level (no-op if absent)
//! - unparseable price or quantity: log and skip just that pair
//!
//! After merging, each side is walked best price first, publishing
//! cumulative depth and its share of the side total.

use rust_decimal::Decimal;
use tracing::{trace, warn};

use super::book::{BookSide, OrderBook};
use crate::types::messages::{BookMessage, RawLevel};
use crate::types::{parse_decimal, Quantity, Side};

/// A pending `previous -> next` book transformation.
///
/// The session hands these to its consumer instead of a finished book, so
/// the consumer decides when the new state is committed (for example, in
/// step with a render cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpdate {
    full_replace: bool,
    message: BookMessage,
}

impl BookUpdate {
    /// Restate the whole book: applying it ignores the previous state
    pub fn full_replace(message: BookMessage) -> Self {
        Self {
            full_replace: true,
            message,
        }
    }

    /// Merge incremental changes onto the previous state
    pub fn delta(message: BookMessage) -> Self {
        Self {
            full_replace: false,
            message,
        }
    }

    /// Whether this update restates the whole book
    pub fn is_full_replace(&self) -> bool {
        self.full_replace
    }

    /// Sequence number of the underlying message
    pub fn sequence(&self) -> u64 {
        self.message.sequence
    }

    /// Underlying message
    pub fn message(&self) -> &BookMessage {
        &self.message
    }

    /// Produce the next book from `previous`.
    ///
    /// A delta mutates `previous` in place and returns it. A full replace
    /// starts from an empty book, so none of the previous levels survive.
    pub fn apply(self, previous: OrderBook) -> OrderBook {
        if self.full_replace {
            drop(previous);
            apply_update(OrderBook::new(), &self.message)
        } else {
            apply_update(previous, &self.message)
        }
    }
}

/// Merge `message` onto `book` and recompute both sides' cumulative figures.
pub fn apply_update(mut book: OrderBook, message: &BookMessage) -> OrderBook {
    merge_side(book.side_mut(Side::Bid), &message.bids);
    merge_side(book.side_mut(Side::Ask), &message.asks);

    recompute_depth(book.bids());
    recompute_depth(book.asks());

    trace!(
        market = %message.market_id,
        sequence = message.sequence,
        bids = book.bids().len(),
        asks = book.asks().len(),
        "book reconciled"
    );
    book
}

fn merge_side(side: &mut BookSide, pairs: &[RawLevel]) {
    // stored levels always sum within range, so this is exact
    let mut total = side.total_depth();

    for pair in pairs {
        let (price, quantity) = match (parse_decimal(pair.price()), parse_decimal(pair.quantity())) {
            (Some(price), Some(quantity)) => (price, quantity),
            _ => {
                warn!(
                    side = side.side().as_str(),
                    price = pair.price(),
                    quantity = pair.quantity(),
                    "dropping malformed level"
                );
                continue;
            }
        };

        let previous = side
            .get(price)
            .map_or(Decimal::ZERO, |level| level.quantity().current_value());

        if quantity > Decimal::ZERO {
            match (total - previous).checked_add(quantity) {
                Some(next) => {
                    side.upsert(price, quantity);
                    total = next;
                }
                None => warn!(
                    side = side.side().as_str(),
                    price = pair.price(),
                    quantity = pair.quantity(),
                    "dropping level, side total would overflow"
                ),
            }
        } else if side.remove(price).is_some() {
            total -= previous;
        }
    }
}

/// Walk `side` best price first, publishing cumulative depth and its share
/// of the side total on every level.
///
/// Bids accumulate in display order; asks accumulate from the lowest price,
/// i.e. in reverse display order. An empty side publishes nothing.
pub fn recompute_depth(side: &BookSide) {
    let total = side.total_depth();
    if total.is_zero() {
        return;
    }

    let mut cumulative = Decimal::ZERO;
    for level in side.best_first() {
        // bounded by `total`
        cumulative = cumulative
            .checked_add(level.quantity().current_value())
            .unwrap_or(total);
        level.set_cumulative(cumulative, depth_share(cumulative, total));
    }
}

/// `cumulative / total * 100`, scaled first to keep the result exact where
/// possible. The outermost level always gets exactly 100.
fn depth_share(cumulative: Quantity, total: Quantity) -> Decimal {
    cumulative
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|scaled| scaled.checked_div(total))
        .unwrap_or_else(|| cumulative / total * Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Subject;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn d(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn initial() -> BookMessage {
        BookMessage::new("BTC-USD", 1)
            .with_bids(&[("100", "2"), ("99", "3")])
            .with_asks(&[("101", "1"), ("102", "4")])
    }

    fn column(side: &BookSide, f: impl Fn(&crate::orderbook::DepthRow) -> Decimal) -> Vec<Decimal> {
        side.rows().map(|r| f(&r)).collect()
    }

    #[test]
    fn test_initial_snapshot_figures() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());

        let bids = book.bids();
        assert_eq!(bids.prices().collect::<Vec<_>>(), vec![d(100), d(99)]);
        assert_eq!(column(bids, |r| r.cumulative_depth), vec![d(2), d(5)]);
        assert_eq!(column(bids, |r| r.cumulative_depth_share), vec![d(40), d(100)]);

        // display order descending, accumulation from the lowest ask
        let asks = book.asks();
        assert_eq!(asks.prices().collect::<Vec<_>>(), vec![d(102), d(101)]);
        assert_eq!(column(asks, |r| r.cumulative_depth), vec![d(5), d(1)]);
        assert_eq!(column(asks, |r| r.cumulative_depth_share), vec![d(100), d(20)]);
    }

    #[test]
    fn test_zero_quantity_removes_level() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());
        let delta = BookMessage::new("BTC-USD", 2).with_bids(&[("100", "0")]);
        let book = BookUpdate::delta(delta).apply(book);

        let bids = book.bids();
        assert!(bids.get(d(100)).is_none());
        assert_eq!(bids.prices().collect::<Vec<_>>(), vec![d(99)]);
        assert_eq!(column(bids, |r| r.cumulative_depth), vec![d(3)]);
        assert_eq!(column(bids, |r| r.cumulative_depth_share), vec![d(100)]);
        // asks untouched
        assert_eq!(book.asks().len(), 2);
    }

    #[test]
    fn test_negative_and_absent_removals() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());
        let delta = BookMessage::new("BTC-USD", 2)
            .with_bids(&[("99", "-1"), ("50", "0")])
            .with_asks(&[("500", "0")]);
        let book = BookUpdate::delta(delta).apply(book);

        assert_eq!(book.num_levels(), (1, 2));
    }

    #[test]
    fn test_quantity_is_absolute_not_incremental() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());
        let delta = BookMessage::new("BTC-USD", 2).with_bids(&[("100", "7")]);
        let book = BookUpdate::delta(delta).apply(book);

        assert_eq!(book.best_bid(), Some((d(100), d(7))));
        assert_eq!(column(book.bids(), |r| r.cumulative_depth), vec![d(7), d(10)]);
    }

    #[test]
    fn test_malformed_pair_is_skipped() {
        let message = BookMessage::new("BTC-USD", 1)
            .with_bids(&[("100", "2"), ("abc", "1"), ("98", "NaN"), ("99", "3")]);
        let book = BookUpdate::full_replace(message).apply(OrderBook::new());

        assert_eq!(
            book.bids().prices().collect::<Vec<_>>(),
            vec![d(100), d(99)]
        );
        assert_eq!(book.bids().total_depth(), d(5));
    }

    #[test]
    fn test_level_overflowing_side_total_is_skipped() {
        let max = Decimal::MAX.to_string();
        let message = BookMessage::new("BTC-USD", 1)
            .with_bids(&[("100", max.as_str()), ("99", max.as_str()), ("98", "1")])
            .with_asks(&[("101", "1")]);
        let book = BookUpdate::full_replace(message).apply(OrderBook::new());

        let bids = book.bids();
        assert_eq!(bids.prices().collect::<Vec<_>>(), vec![d(100)]);
        assert_eq!(bids.total_depth(), Decimal::MAX);
        assert_eq!(column(bids, |r| r.cumulative_depth_share), vec![d(100)]);
        assert_eq!(book.asks().len(), 1);

        // shrinking the big level makes room again
        let almost = (Decimal::MAX - d(10)).to_string();
        let delta =
            BookMessage::new("BTC-USD", 2).with_bids(&[("100", "5"), ("99", almost.as_str())]);
        let book = BookUpdate::delta(delta).apply(book);
        assert_eq!(book.bids().prices().collect::<Vec<_>>(), vec![d(100), d(99)]);
        assert_eq!(
            column(book.bids(), |r| r.cumulative_depth),
            vec![d(5), Decimal::MAX - d(5)]
        );
    }

    #[test]
    fn test_full_replace_discards_previous_levels() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());
        let old = book.bids().get(d(100)).unwrap().quantity().clone();

        let fresh = BookMessage::new("BTC-USD", 10).with_bids(&[("100", "1")]);
        let book = BookUpdate::full_replace(fresh).apply(book);

        assert_eq!(book.num_levels(), (1, 0));
        let new = book.bids().get(d(100)).unwrap().quantity();
        assert!(!Subject::ptr_eq(&old, new));
    }

    #[test]
    fn test_surviving_level_keeps_observers() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = book
            .bids()
            .get(d(99))
            .unwrap()
            .cumulative_depth()
            .subscribe(move |v| sink.borrow_mut().push(*v));

        let book = BookUpdate::delta(BookMessage::new("BTC-USD", 2).with_bids(&[("100", "0")]))
            .apply(book);
        let _book = BookUpdate::delta(BookMessage::new("BTC-USD", 3).with_bids(&[("101", "1")]))
            .apply(book);

        assert_eq!(*seen.borrow(), vec![d(3), d(4)]);
    }

    #[test]
    fn test_emptied_side_does_not_fail() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());
        let delta = BookMessage::new("BTC-USD", 2).with_asks(&[("101", "0"), ("102", "0")]);
        let book = BookUpdate::delta(delta).apply(book);

        assert!(book.asks().is_empty());
        assert_eq!(book.asks().total_depth(), Decimal::ZERO);
    }

    #[test]
    fn test_empty_delta_keeps_content() {
        let book = BookUpdate::full_replace(initial()).apply(OrderBook::new());
        let before: Vec<_> = book.bids().rows().chain(book.asks().rows()).collect();

        let book = BookUpdate::delta(BookMessage::new("BTC-USD", 2)).apply(book);
        let after: Vec<_> = book.bids().rows().chain(book.asks().rows()).collect();

        assert_eq!(before, after);
    }

    #[test]
    fn test_share_of_thirds_ends_at_hundred() {
        let message = BookMessage::new("BTC-USD", 1).with_bids(&[("3", "1"), ("2", "1"), ("1", "1")]);
        let book = BookUpdate::full_replace(message).apply(OrderBook::new());

        let shares = column(book.bids(), |r| r.cumulative_depth_share);
        assert!(shares[0] > d(33) && shares[0] < d(34));
        assert_eq!(shares[2], d(100));
    }

    #[test]
    fn test_update_accessors() {
        let update = BookUpdate::delta(BookMessage::new("BTC-USD", 9));
        assert!(!update.is_full_replace());
        assert_eq!(update.sequence(), 9);
        assert_eq!(update.message().market_id, "BTC-USD");
    }
}
