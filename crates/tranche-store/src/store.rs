//! Order store trait.

use std::sync::Arc;

use chrono::NaiveTime;
use tranche_core::{Order, OrderId, OrderStatus};

use crate::error::StoreResult;

/// Status change applied by [`OrderStore::update_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            broker_order_id: None,
            error_message: None,
        }
    }

    /// Successful submission.
    pub fn sent(broker_order_id: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Sent,
            broker_order_id: Some(broker_order_id.into()),
            error_message: None,
        }
    }

    /// Failed submission.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Error,
            broker_order_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// Authoritative order storage.
///
/// Every status change goes through `update_status`, which enforces the
/// order state machine atomically per order.
pub trait OrderStore: Send + Sync {
    /// Insert a new order. Fails with `AlreadyExists` on a duplicate id.
    fn save(&self, order: Order) -> StoreResult<()>;

    /// Insert a batch. Either every order is stored or none is.
    fn save_all(&self, orders: Vec<Order>) -> StoreResult<()>;

    fn find_by_order_id(&self, order_id: &OrderId) -> StoreResult<Option<Order>>;

    /// Orders in `status`, ordered by scheduled time then creation time.
    fn find_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>>;

    /// Pending orders scheduled at or before `time`.
    fn find_ready_to_send(&self, time: NaiveTime) -> StoreResult<Vec<Order>>;

    /// Apply a validated status transition and return the updated order.
    fn update_status(&self, order_id: &OrderId, update: StatusUpdate) -> StoreResult<Order>;

    /// Record a broker order id without changing status.
    ///
    /// For acknowledgements that arrive after the order left PENDING by
    /// another path. `note` replaces the error message.
    fn attach_broker_order_id(
        &self,
        order_id: &OrderId,
        broker_order_id: &str,
        note: &str,
    ) -> StoreResult<Order>;

    fn exists(&self, order_id: &OrderId) -> StoreResult<bool>;

    /// Remove an order. Returns false if it did not exist.
    fn delete(&self, order_id: &OrderId) -> StoreResult<bool>;
}

/// Shared order store handle.
pub type DynOrderStore = Arc<dyn OrderStore>;
