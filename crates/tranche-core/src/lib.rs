//! Core domain types for the tranche order scheduler.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`: 6-digit decimal price used for all internal arithmetic
//! - `Quotation`: broker fixed-point wire price (units + nano)
//! - `Order`, `OrderDraft`: the scheduled order and its pre-persistence form
//! - `OrderStatus`: lifecycle state machine
//! - `Level`: price instruction for order generation
//! - `VenueClock`: time-of-day in the trading venue's timezone

pub mod decimal;
pub mod error;
pub mod market;
pub mod model;
pub mod order;
pub mod quotation;
pub mod time;

pub use decimal::{Price, PRICE_SCALE};
pub use error::{CoreError, Result};
pub use market::{InstrumentId, InstrumentSpec, LimitBound, PriceLimits, PriceType};
pub use model::{Level, Order, OrderDraft};
pub use order::{Direction, OrderId, OrderStatus, OrderType, TradeDirection};
pub use quotation::{Quotation, NANO_SCALE};
pub use time::{TimeResolution, VenueClock};
