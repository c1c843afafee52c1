//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    #[error("Invalid reference data: {0}")]
    InvalidData(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
