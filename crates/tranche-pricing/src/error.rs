//! Generation request validation errors.

use thiserror::Error;

/// A generation request that cannot be processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("At least one instrument is required")]
    NoInstruments,

    #[error("Instrument id at position {0} is blank")]
    BlankInstrument(usize),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(String),

    #[error("Between 1 and {max} levels are required, got {got}")]
    LevelCount { got: usize, max: usize },

    #[error("Level {index}: {reason}")]
    InvalidLevel { index: usize, reason: String },

    #[error("Account id is required")]
    MissingAccount,

    #[error("Order type must be specified")]
    UnspecifiedOrderType,
}

pub type ValidationResult<T> = Result<T, ValidationError>;
