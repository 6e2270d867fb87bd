//! Trading pair identity and exchange constraints.

use crate::{Price, Qty};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading pair symbol (e.g., "BTCUSDT").
///
/// Stored uppercase so lookups are case-insensitive at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(s.as_ref().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Exchange-imposed constraints for a symbol.
///
/// Fetched from the exchange at startup, never hard-coded. Quantities are
/// rounded to `step_size` and prices to `tick_size` before submission;
/// orders below `min_qty` or `min_notional` are rejected locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFilters {
    /// Minimum order quantity (LOT_SIZE).
    pub min_qty: Qty,
    /// Quantity step size (LOT_SIZE).
    pub step_size: Qty,
    /// Price tick size (PRICE_FILTER).
    pub tick_size: Price,
    /// Minimum notional value (MIN_NOTIONAL).
    pub min_notional: rust_decimal::Decimal,
}

impl SymbolFilters {
    /// Permissive filters for markets where none were fetched.
    pub fn permissive() -> Self {
        Self {
            min_qty: Qty::ZERO,
            step_size: Qty::ZERO,
            tick_size: Price::ZERO,
            min_notional: rust_decimal::Decimal::ZERO,
        }
    }

    /// Check a quantity against min_qty after step rounding.
    pub fn qty_acceptable(&self, qty: Qty) -> bool {
        qty.is_positive() && qty >= self.min_qty
    }

    /// Check an order's notional against min_notional.
    pub fn notional_acceptable(&self, qty: Qty, price: Price) -> bool {
        qty.notional(price) >= self.min_notional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_symbol_uppercased() {
        assert_eq!(Symbol::new("btcusdt").as_str(), "BTCUSDT");
        assert_eq!(Symbol::from("EThUsDt"), Symbol::new("ETHUSDT"));
    }

    #[test]
    fn test_filters_qty_check() {
        let filters = SymbolFilters {
            min_qty: Qty::new(dec!(0.001)),
            step_size: Qty::new(dec!(0.001)),
            tick_size: Price::new(dec!(0.01)),
            min_notional: dec!(10),
        };
        assert!(filters.qty_acceptable(Qty::new(dec!(0.001))));
        assert!(!filters.qty_acceptable(Qty::new(dec!(0.0005))));
        assert!(!filters.qty_acceptable(Qty::ZERO));
    }

    #[test]
    fn test_filters_notional_check() {
        let filters = SymbolFilters {
            min_qty: Qty::new(dec!(0.001)),
            step_size: Qty::new(dec!(0.001)),
            tick_size: Price::new(dec!(0.01)),
            min_notional: dec!(10),
        };
        assert!(filters.notional_acceptable(Qty::new(dec!(0.001)), Price::new(dec!(50000))));
        assert!(!filters.notional_acceptable(Qty::new(dec!(0.001)), Price::new(dec!(100))));
    }

    #[test]
    fn test_permissive_accepts_anything_positive() {
        let filters = SymbolFilters::permissive();
        assert!(filters.qty_acceptable(Qty::new(dec!(0.00000001))));
        assert!(filters.notional_acceptable(Qty::new(dec!(0.00000001)), Price::new(dec!(0.01))));
    }
}
