//! Order service.
//!
//! Programmatic surface over the engine: create orders from a generation
//! request, look them up, cancel them and force-send them.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use tranche_broker::mask_id;
use tranche_core::{Order, OrderId, OrderStatus};
use tranche_dispatch::{DispatchOutcome, Dispatcher, PendingIndex};
use tranche_pricing::{GenerationReport, GenerationRequest, GenerationSkip, OrderGenerator};
use tranche_store::{DynOrderStore, StatusUpdate};

use crate::error::{ServiceError, ServiceResult};

/// A generated order that could not be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedOrder {
    pub order_id: OrderId,
    pub message: String,
}

/// Outcome of [`OrderService::create_orders`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateOrdersResult {
    /// Persisted and indexed orders.
    pub created: Vec<Order>,
    /// Levels the generator could not price.
    pub skips: Vec<GenerationSkip>,
    /// Drafts dropped because the store rejected them.
    pub failed: Vec<FailedOrder>,
}

pub struct OrderService {
    generator: OrderGenerator,
    store: DynOrderStore,
    dispatcher: Arc<Dispatcher>,
}

impl OrderService {
    pub fn new(generator: OrderGenerator, store: DynOrderStore, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            generator,
            store,
            dispatcher,
        }
    }

    fn index(&self) -> &Arc<PendingIndex> {
        self.dispatcher.index()
    }

    /// Generate drafts without persisting anything.
    pub fn plan(&self, request: &GenerationRequest) -> ServiceResult<GenerationReport> {
        Ok(self.generator.generate(request)?)
    }

    /// Generate, persist and index orders.
    ///
    /// A store failure drops that order only; siblings already saved stay.
    pub fn create_orders(&self, request: &GenerationRequest) -> ServiceResult<CreateOrdersResult> {
        let report = self.generator.generate(request)?;
        let mut result = CreateOrdersResult {
            skips: report.skips,
            ..CreateOrdersResult::default()
        };

        let now = Utc::now();
        for draft in report.drafts {
            let order = Order::from_draft(draft, now);
            match self.store.save(order.clone()) {
                Ok(()) => {
                    self.index().insert(order.clone());
                    result.created.push(order);
                }
                Err(e) => {
                    warn!(
                        order_id = %mask_id(order.order_id.as_str()),
                        error = %e,
                        "Failed to persist generated order"
                    );
                    result.failed.push(FailedOrder {
                        order_id: order.order_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            created = result.created.len(),
            skipped = result.skips.len(),
            failed = result.failed.len(),
            scheduled_time = %request.scheduled_time,
            "Orders created"
        );
        Ok(result)
    }

    pub fn get(&self, order_id: &OrderId) -> ServiceResult<Order> {
        self.store
            .find_by_order_id(order_id)?
            .ok_or_else(|| ServiceError::NotFound(order_id.to_string()))
    }

    pub fn list_by_status(&self, status: OrderStatus) -> ServiceResult<Vec<Order>> {
        Ok(self.store.find_by_status(status)?)
    }

    /// Cancel a pending or failed order and drop it from the pending index.
    ///
    /// Holds the order's dispatch claim for the status write, so no task
    /// can submit it concurrently. Fails with `Conflict` while a task is
    /// dispatching the order, and for SENT orders since there is no
    /// broker-side cancel.
    pub fn cancel(&self, order_id: &OrderId) -> ServiceResult<Order> {
        let order = self.dispatcher.with_claim(order_id, || -> ServiceResult<Order> {
            let current = self.get(order_id)?;
            if current.status == OrderStatus::Sent {
                return Err(ServiceError::Conflict(format!(
                    "order {order_id} is already at the broker"
                )));
            }
            Ok(self
                .store
                .update_status(order_id, StatusUpdate::new(OrderStatus::Cancelled))?)
        })??;
        self.index().remove(order_id);
        info!(order_id = %mask_id(order_id.as_str()), "Order cancelled");
        Ok(order)
    }

    /// Submit an order now, regardless of its scheduled time.
    pub async fn force_send(&self, order_id: &OrderId) -> ServiceResult<DispatchOutcome> {
        Ok(self.dispatcher.force_send(order_id).await?)
    }
}
