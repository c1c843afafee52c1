//! tranche: scheduled order dispatch service.
//!
//! Wires the generator, order store, pending index, dispatcher and broker
//! client together:
//! - `AppConfig`: TOML configuration with environment overrides
//! - `OrderService`: create, inspect, cancel and force-send orders
//! - `Application`: background tasks and graceful shutdown

pub mod app;
pub mod config;
pub mod error;
pub mod service;

pub use app::Application;
pub use config::{
    AppConfig, BrokerConfig, SchedulerConfig, StoreBackend, StoreConfig, TelemetryConfig,
};
pub use error::{AppError, AppResult, ServiceError, ServiceResult};
pub use service::{CreateOrdersResult, FailedOrder, OrderService};
