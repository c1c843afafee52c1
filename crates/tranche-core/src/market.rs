//! Instrument identification and specification types.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::decimal::Price;
use crate::error::{CoreError, Result};

/// Venue identifier of a tradable instrument (FIGI or instrument UID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Static trading parameters of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Minimum price increment.
    pub tick_size: Price,
    /// Units per lot.
    pub lot_size: u64,
    /// Ticker or display name.
    #[serde(default)]
    pub name: String,
}

/// Session price band enforced by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLimits {
    pub lower: Price,
    pub upper: Price,
}

impl PriceLimits {
    pub fn new(lower: Price, upper: Price) -> Result<Self> {
        if lower > upper {
            return Err(CoreError::InvalidPrice(format!(
                "lower limit {lower} above upper limit {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    /// Clamp a price into the band.
    #[inline]
    pub fn clamp(&self, price: Price) -> Price {
        price.clamp_to(self.lower, self.upper)
    }

    #[inline]
    pub fn bound(&self, bound: LimitBound) -> Price {
        match bound {
            LimitBound::Upper => self.upper,
            LimitBound::Lower => self.lower,
        }
    }
}

/// Which reference price a percentage level is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceType {
    /// Previous session close.
    #[default]
    Close,
    /// Last trade price.
    Last,
    /// Session open.
    Open,
}

impl fmt::Display for PriceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Close => write!(f, "close"),
            Self::Last => write!(f, "last"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Session limit selector for limit-mode levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitBound {
    Upper,
    Lower,
}
