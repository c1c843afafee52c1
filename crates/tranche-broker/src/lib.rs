//! Broker integration for tranche.
//!
//! - `BrokerApi`: dyn-compatible broker trait with a REST implementation
//!   and a scriptable mock
//! - `SubmissionClient`: submits one order with bounded retries, per-call
//!   timeouts and capped exponential backoff
//! - Message sanitization and id masking for anything that leaves the
//!   process in logs or stored error messages

pub mod api;
pub mod backoff;
pub mod client;
pub mod error;
pub mod http;
pub mod sanitize;

pub use api::{
    BoxFuture, BrokerApi, BrokerOrderState, DynBroker, MockBroker, PostOrderRequest,
    PostOrderResponse,
};
pub use backoff::BackoffPolicy;
pub use client::{SubmissionClient, SubmissionConfig, SubmissionFailure, SubmissionSuccess};
pub use error::{BrokerError, BrokerResult};
pub use http::RestBroker;
pub use sanitize::{mask_id, Sanitizer, MAX_MESSAGE_LEN};
