//! Instrument metadata.
//!
//! Configuration only: the reconciler never reads or mutates it. Display
//! code uses [`Instrument::format`] to render ladder values at the
//! instrument's precision.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Tradable instrument shown by the ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// Symbol, e.g. `BTC-USD`
    pub code: String,
    /// Base asset label, e.g. `BTC`
    pub base_asset: String,
    /// Quote currency label, e.g. `USD`
    pub currency: String,
    /// Decimal places used when displaying quantities and totals
    pub precision: u32,
}

impl Instrument {
    /// Create an instrument description
    pub fn new(
        code: impl Into<String>,
        base_asset: impl Into<String>,
        currency: impl Into<String>,
        precision: u32,
    ) -> Self {
        Self {
            code: code.into(),
            base_asset: base_asset.into(),
            currency: currency.into(),
            precision,
        }
    }

    /// Render `value` with exactly `precision` decimal places
    /// (half away from zero, like a fixed-point display).
    pub fn format(&self, value: Decimal) -> String {
        let rounded =
            value.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointAwayFromZero);
        format!("{:.*}", self.precision as usize, rounded)
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self::new("BTC-USD", "BTC", "USD", 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_default_instrument() {
        let instrument = Instrument::default();
        assert_eq!(instrument.code, "BTC-USD");
        assert_eq!(instrument.precision, 4);
    }

    #[test]
    fn test_format_pads_and_rounds() {
        let instrument = Instrument::default();
        assert_eq!(instrument.format(Decimal::from(2)), "2.0000");
        assert_eq!(
            instrument.format(Decimal::from_str("0.123456").unwrap()),
            "0.1235"
        );
    }
}
