//! Broker fixed-point price representation.
//!
//! The broker encodes prices as an integer whole part (`units`) plus a
//! fractional part scaled by 1e9 (`nano`). Conversion happens only at the
//! broker boundary; everything upstream works with [`Price`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;
use crate::error::{CoreError, Result};

/// Scale of the `nano` field.
pub const NANO_SCALE: i64 = 1_000_000_000;

/// Fixed-point price as exchanged with the broker.
///
/// Invariants: `|nano| < 1e9`, and `nano` never has the opposite sign of
/// `units`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Quotation {
    pub units: i64,
    pub nano: i32,
}

impl Quotation {
    /// Build a quotation, validating the sign and range invariants.
    pub fn new(units: i64, nano: i32) -> Result<Self> {
        let q = Self { units, nano };
        if q.is_valid() {
            Ok(q)
        } else {
            Err(CoreError::InvalidQuotation { units, nano })
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        let in_range = i64::from(self.nano).abs() < NANO_SCALE;
        let sign_ok = !(self.units > 0 && self.nano < 0) && !(self.units < 0 && self.nano > 0);
        in_range && sign_ok
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.nano == 0
    }

    /// Convert a decimal price into fixed-point form.
    ///
    /// Digits beyond the ninth fractional place are rounded.
    pub fn from_price(price: Price) -> Result<Self> {
        let value = price.inner();
        let whole = value.trunc();
        let frac = ((value - whole) * Decimal::from(NANO_SCALE)).round();

        let units = whole
            .to_i64()
            .ok_or_else(|| CoreError::InvalidPrice(format!("{value} out of range")))?;
        let nano = frac
            .to_i32()
            .ok_or_else(|| CoreError::InvalidPrice(format!("{value} out of range")))?;

        Self::new(units, nano)
    }

    /// Convert back into a decimal price.
    pub fn to_price(&self) -> Result<Price> {
        if !self.is_valid() {
            return Err(CoreError::InvalidQuotation {
                units: self.units,
                nano: self.nano,
            });
        }
        let value = Decimal::from(self.units) + Decimal::new(i64::from(self.nano), 9);
        Ok(Price::new(value.normalize()))
    }
}

impl TryFrom<Price> for Quotation {
    type Error = CoreError;

    fn try_from(price: Price) -> Result<Self> {
        Self::from_price(price)
    }
}

impl TryFrom<Quotation> for Price {
    type Error = CoreError;

    fn try_from(q: Quotation) -> Result<Self> {
        q.to_price()
    }
}

impl fmt::Display for Quotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_price() {
            Ok(p) => write!(f, "{p}"),
            Err(_) => write!(f, "<invalid {}:{}>", self.units, self.nano),
        }
    }
}
