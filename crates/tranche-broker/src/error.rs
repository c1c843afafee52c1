//! Broker error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Broker unavailable (HTTP {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Broker call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Invalid broker response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl BrokerError {
    /// Transient failures worth another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Unavailable { .. } | Self::Timeout(_)
        )
    }

    /// Metric label for the attempt outcome.
    pub fn attempt_label(&self) -> &'static str {
        if self.is_retryable() {
            "retryable"
        } else {
            "fatal"
        }
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;
