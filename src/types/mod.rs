//! Wire and domain types.
//!
//! - [`messages`] - Book messages and the transport's JSON command/reply frames
//! - [`instrument`] - Instrument metadata used for display formatting

pub mod instrument;
pub mod messages;

pub use instrument::Instrument;
pub use messages::{BookMessage, RawLevel};

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Price of a level
///
/// Exact decimal, so `"100.10"` and `"100.1"` are the same key and no
/// float rounding can reorder or split levels across updates.
pub type Price = Decimal;

/// Resting quantity at a level
pub type Quantity = Decimal;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side; best price is the highest
    Bid,
    /// Sell side; best price is the lowest
    Ask,
}

impl Side {
    /// Lowercase name, as used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Bid => "bid",
            Side::Ask => "ask",
        }
    }
}

/// Parse a price or quantity field.
///
/// Accepts plain decimals (`"101.25"`) and scientific notation (`"1e-3"`).
/// Returns `None` for anything else, including empty strings, `NaN` and
/// infinities, which `Decimal` cannot represent.
pub fn parse_decimal(field: &str) -> Option<Decimal> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    Decimal::from_str(field)
        .or_else(|_| Decimal::from_scientific(field))
        .ok()
}
