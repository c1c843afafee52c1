//! Price and quantity generation.
//!
//! Turns a generation request (instruments, amount, direction, 1-3 price
//! levels) into venue-legal order drafts:
//! - Percentage, absolute or session-limit level prices
//! - Clamping into session limits and rounding down to tick
//! - Whole-lot sizing from the per-level amount
//!
//! Missing reference data never fails the batch; affected levels are
//! reported as skips next to the produced drafts.

pub mod error;
pub mod generator;
pub mod request;

pub use error::{ValidationError, ValidationResult};
pub use generator::{GenerationReport, GenerationSkip, OrderGenerator, SkipReason};
pub use request::{GenerationRequest, MAX_LEVELS};
