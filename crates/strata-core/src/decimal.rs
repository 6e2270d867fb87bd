//! Precision-safe decimal types for trading.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, avoiding
//! floating-point rounding errors critical in financial calculations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Sub};
use std::str::FromStr;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with quantities in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to the nearest multiple of `tick_size`.
    ///
    /// A zero tick size leaves the price unchanged.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Price) -> Self {
        if tick_size.is_zero() {
            return *self;
        }
        Self((self.0 / tick_size.0).floor() * tick_size.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Price {
    type Output = Self;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Self(self.0 * rhs)
    }
}

/// Order quantity with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qty(pub Decimal);

impl Qty {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Round down to the nearest multiple of `step_size`.
    ///
    /// A zero step size leaves the quantity unchanged. Used to satisfy
    /// the exchange's LOT_SIZE filter before submission.
    #[inline]
    pub fn round_to_step(&self, step_size: Qty) -> Self {
        if step_size.is_zero() {
            return *self;
        }
        Self((self.0 / step_size.0).floor() * step_size.0)
    }

    /// Notional value at the given price.
    #[inline]
    pub fn notional(&self, price: Price) -> Decimal {
        self.0 * price.inner()
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Qty {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Qty {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Qty {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Qty {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Qty {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Div<Decimal> for Qty {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_round_to_tick() {
        let px = Price::new(dec!(102.537));
        assert_eq!(px.round_to_tick(Price::new(dec!(0.01))), Price::new(dec!(102.53)));
        assert_eq!(px.round_to_tick(Price::ZERO), px);
    }

    #[test]
    fn test_qty_round_to_step() {
        let qty = Qty::new(dec!(0.33333333));
        assert_eq!(qty.round_to_step(Qty::new(dec!(0.001))), Qty::new(dec!(0.333)));
        assert_eq!(qty.round_to_step(Qty::ZERO), qty);
    }

    #[test]
    fn test_qty_notional() {
        let qty = Qty::new(dec!(0.5));
        assert_eq!(qty.notional(Price::new(dec!(100))), dec!(50.0));
    }

    #[test]
    fn test_arithmetic() {
        let a = Qty::new(dec!(1.0));
        let b = Qty::new(dec!(0.4));
        assert_eq!(a - b, Qty::new(dec!(0.6)));
        assert_eq!(b + b, Qty::new(dec!(0.8)));
        assert_eq!(a / dec!(4), Qty::new(dec!(0.25)));
    }

    #[test]
    fn test_parse() {
        let px: Price = "50000.5".parse().unwrap();
        assert_eq!(px, Price::new(dec!(50000.5)));
        let qty: Qty = "0.001".parse().unwrap();
        assert_eq!(qty, Qty::new(dec!(0.001)));
    }
}
