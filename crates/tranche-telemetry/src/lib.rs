//! Prometheus metrics and structured logging for tranche.
//!
//! - Prometheus metrics for generation, dispatch, submission and status sync
//! - Structured logging with tracing (JSON in production)
//! - Optional `/metrics` HTTP endpoint

pub mod error;
pub mod logging;
pub mod metrics;
pub mod server;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use server::serve_metrics;
