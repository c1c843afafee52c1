//! Dispatch error types.

use thiserror::Error;
use tranche_store::StoreError;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch task failed: {0}")]
    Task(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
