//! Application error types.

use thiserror::Error;
use tranche_dispatch::DispatchError;
use tranche_pricing::ValidationError;
use tranche_store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(#[from] tranche_registry::RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Broker error: {0}")]
    Broker(#[from] tranche_broker::BrokerError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tranche_telemetry::TelemetryError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Errors returned by [`crate::OrderService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::AlreadyExists(_) | StoreError::InvalidTransition { .. } => {
                Self::Conflict(e.to_string())
            }
            other => Self::Store(other),
        }
    }
}

impl From<DispatchError> for ServiceError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::NotFound(id) => Self::NotFound(id),
            DispatchError::Conflict(msg) => Self::Conflict(msg),
            DispatchError::Store(e) => e.into(),
            DispatchError::Task(msg) => Self::Dispatch(msg),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
