//! Concurrent in-memory order store.

use chrono::{NaiveTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use tranche_core::{Order, OrderId, OrderStatus};

use crate::error::{StoreError, StoreResult};
use crate::store::{OrderStore, StatusUpdate};

/// In-memory store backed by a `DashMap`.
///
/// Status updates hold the entry's shard lock for the whole
/// check-and-write, so two updates of one order never interleave.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: DashMap<OrderId, Order>,
    /// Serializes batch inserts against single inserts.
    insert_lock: Mutex<()>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted orders.
    pub fn from_orders(orders: Vec<Order>) -> Self {
        let store = Self::new();
        for order in orders {
            store.orders.insert(order.order_id.clone(), order);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Clone every order, sorted by scheduled time then creation time.
    pub fn snapshot(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.iter().map(|e| e.value().clone()).collect();
        sort_orders(&mut orders);
        orders
    }

    /// Put `order` back as given, replacing any current version.
    pub(crate) fn restore(&self, order: Order) {
        self.orders.insert(order.order_id.clone(), order);
    }

    pub(crate) fn forget(&self, order_id: &OrderId) {
        self.orders.remove(order_id);
    }

    fn collect_sorted(&self, mut predicate: impl FnMut(&Order) -> bool) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect();
        sort_orders(&mut orders);
        orders
    }
}

fn sort_orders(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        a.scheduled_time
            .cmp(&b.scheduled_time)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.order_id.as_str().cmp(b.order_id.as_str()))
    });
}

/// Apply `update` to `order` if the transition is allowed.
pub(crate) fn apply_update(order: &mut Order, update: StatusUpdate) -> StoreResult<()> {
    if !order.status.can_transition_to(update.status) {
        return Err(StoreError::InvalidTransition {
            order_id: order.order_id.to_string(),
            from: order.status,
            to: update.status,
        });
    }

    order.status = update.status;
    match update.status {
        OrderStatus::Sent => {
            order.broker_order_id = update.broker_order_id;
            order.error_message = None;
        }
        OrderStatus::Error => {
            order.error_message = update.error_message;
        }
        _ => {
            if update.broker_order_id.is_some() {
                order.broker_order_id = update.broker_order_id;
            }
            if update.error_message.is_some() {
                order.error_message = update.error_message;
            }
        }
    }
    order.updated_at = Utc::now();
    Ok(())
}

impl OrderStore for MemoryOrderStore {
    fn save(&self, order: Order) -> StoreResult<()> {
        let _guard = self.insert_lock.lock();
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(e) => Err(StoreError::AlreadyExists(e.key().to_string())),
            Entry::Vacant(e) => {
                e.insert(order);
                Ok(())
            }
        }
    }

    fn save_all(&self, orders: Vec<Order>) -> StoreResult<()> {
        let _guard = self.insert_lock.lock();

        let mut seen = std::collections::HashSet::with_capacity(orders.len());
        for order in &orders {
            if self.orders.contains_key(&order.order_id) || !seen.insert(&order.order_id) {
                return Err(StoreError::AlreadyExists(order.order_id.to_string()));
            }
        }

        let count = orders.len();
        for order in orders {
            self.orders.insert(order.order_id.clone(), order);
        }
        debug!(count, "Saved order batch");
        Ok(())
    }

    fn find_by_order_id(&self, order_id: &OrderId) -> StoreResult<Option<Order>> {
        Ok(self.orders.get(order_id).map(|e| e.value().clone()))
    }

    fn find_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        Ok(self.collect_sorted(|o| o.status == status))
    }

    fn find_ready_to_send(&self, time: NaiveTime) -> StoreResult<Vec<Order>> {
        Ok(self.collect_sorted(|o| o.status == OrderStatus::Pending && o.scheduled_time <= time))
    }

    fn update_status(&self, order_id: &OrderId, update: StatusUpdate) -> StoreResult<Order> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        apply_update(entry.value_mut(), update)?;
        Ok(entry.value().clone())
    }

    fn attach_broker_order_id(
        &self,
        order_id: &OrderId,
        broker_order_id: &str,
        note: &str,
    ) -> StoreResult<Order> {
        let mut entry = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        let order = entry.value_mut();
        order.broker_order_id = Some(broker_order_id.to_string());
        order.error_message = Some(note.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    fn exists(&self, order_id: &OrderId) -> StoreResult<bool> {
        Ok(self.orders.contains_key(order_id))
    }

    fn delete(&self, order_id: &OrderId) -> StoreResult<bool> {
        let _guard = self.insert_lock.lock();
        Ok(self.orders.remove(order_id).is_some())
    }
}
