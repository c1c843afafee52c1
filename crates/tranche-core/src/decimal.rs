//! Precision-safe decimal price type.
//!
//! Uses `rust_decimal` for exact decimal arithmetic. All internal price
//! calculations run at `PRICE_SCALE` fractional digits; the broker's
//! 9-digit fixed-point form (`Quotation`) is produced only at the wire
//! boundary.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits kept by internal price arithmetic.
pub const PRICE_SCALE: u32 = 6;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` to keep prices apart from amounts and quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

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

    /// Round to `PRICE_SCALE` digits, half away from zero.
    #[inline]
    pub fn normalized(&self) -> Self {
        Self(round_price_scale(self.0))
    }

    /// `percent`% of this price, rounded to `PRICE_SCALE` digits.
    ///
    /// `None` on overflow.
    #[inline]
    pub fn percent(&self, percent: Decimal) -> Option<Decimal> {
        self.0
            .checked_mul(percent)?
            .checked_div(Decimal::ONE_HUNDRED)
            .map(round_price_scale)
    }

    #[inline]
    pub fn checked_add(&self, rhs: Price) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[inline]
    pub fn checked_sub(&self, rhs: Price) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }

    /// Round down to the nearest multiple of `tick_size`.
    ///
    /// A zero tick leaves the price unchanged. `None` when the tick count
    /// does not fit a `Decimal`.
    #[inline]
    pub fn round_to_tick(&self, tick_size: Price) -> Option<Self> {
        if tick_size.is_zero() {
            return Some(*self);
        }
        self.0
            .checked_div(tick_size.0)?
            .floor()
            .checked_mul(tick_size.0)
            .map(Self)
    }

    /// Clamp into `[lower, upper]`. The result is always one of
    /// `lower`, `upper` or `self`.
    #[inline]
    pub fn clamp_to(&self, lower: Price, upper: Price) -> Self {
        if *self < lower {
            lower
        } else if *self > upper {
            upper
        } else {
            *self
        }
    }

    /// Whole units of `amount` this price buys, rounded down.
    ///
    /// `None` for a non-positive price or negative amount, and when the
    /// unit count overflows `Decimal` or `u64`.
    #[inline]
    pub fn units_for(&self, amount: Decimal) -> Option<u64> {
        use rust_decimal::prelude::ToPrimitive;

        if !self.is_positive() || amount.is_sign_negative() {
            return None;
        }
        amount.checked_div(self.0)?.floor().to_u64()
    }
}

fn round_price_scale(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero)
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
