//! One row of the depth ladder.

use rust_decimal::Decimal;

use crate::observable::Subject;
use crate::types::{Price, Quantity};

/// Aggregate resting quantity at one distinct price, plus the cumulative
/// figures derived from its position in the side.
///
/// Each figure is a [`Subject`], so display bindings attach once and keep
/// receiving values for as long as the price stays in the book. The
/// reconciler mutates levels in place and never replaces a level whose price
/// persists.
///
/// Invariant: a level stored in a book always has `quantity > 0`.
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    quantity: Subject<Quantity>,
    cumulative_depth: Subject<Quantity>,
    cumulative_depth_share: Subject<Decimal>,
}

impl PriceLevel {
    pub(crate) fn new(price: Price, quantity: Quantity) -> Self {
        Self {
            price,
            quantity: Subject::new(quantity),
            cumulative_depth: Subject::new(Decimal::ZERO),
            cumulative_depth_share: Subject::new(Decimal::ZERO),
        }
    }

    /// Price of this level
    pub fn price(&self) -> Price {
        self.price
    }

    /// Current resting quantity channel
    pub fn quantity(&self) -> &Subject<Quantity> {
        &self.quantity
    }

    /// Sum of quantities from the best price through this one
    pub fn cumulative_depth(&self) -> &Subject<Quantity> {
        &self.cumulative_depth
    }

    /// Cumulative depth as a percentage of the side's total depth
    pub fn cumulative_depth_share(&self) -> &Subject<Decimal> {
        &self.cumulative_depth_share
    }

    /// Plain-value copy of the current figures
    pub fn row(&self) -> DepthRow {
        DepthRow {
            price: self.price,
            quantity: self.quantity.current_value(),
            cumulative_depth: self.cumulative_depth.current_value(),
            cumulative_depth_share: self.cumulative_depth_share.current_value(),
        }
    }

    pub(crate) fn set_quantity(&self, quantity: Quantity) {
        self.quantity.publish(quantity);
    }

    pub(crate) fn set_cumulative(&self, depth: Quantity, share: Decimal) {
        self.cumulative_depth.publish(depth);
        self.cumulative_depth_share.publish(share);
    }
}

/// Value snapshot of a [`PriceLevel`], for rendering and comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthRow {
    /// Level price
    pub price: Price,
    /// Resting quantity
    pub quantity: Quantity,
    /// Cumulative depth from the best price
    pub cumulative_depth: Quantity,
    /// Cumulative depth share, in percent
    pub cumulative_depth_share: Decimal,
}
