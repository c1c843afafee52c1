//! Scheduled order dispatch.
//!
//! - `PendingIndex`: in-memory time index of pending orders
//! - `Dispatcher`: fixed-interval driver that submits due orders on a
//!   bounded worker pool
//! - `StatusSync`: polls the broker for final states of sent orders

pub mod dispatcher;
pub mod error;
pub mod index;
pub mod reconcile;

pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherConfig, SchedulerState, TickReport};
pub use error::{DispatchError, DispatchResult};
pub use index::PendingIndex;
pub use reconcile::{StatusSync, SyncReport};
