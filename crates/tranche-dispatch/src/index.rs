//! Pending-order time index.
//!
//! Holds the working set of pending orders keyed by id and by scheduled
//! time-of-day bucket. The store stays authoritative; the index only tells
//! the dispatcher what to look at.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveTime;
use parking_lot::RwLock;
use tracing::{debug, info};
use tranche_broker::mask_id;
use tranche_core::{Order, OrderId, OrderStatus, TimeResolution};
use tranche_store::{OrderStore, StoreResult};
use tranche_telemetry::Metrics;

#[derive(Debug, Default)]
struct IndexInner {
    by_id: HashMap<OrderId, Order>,
    by_time: BTreeMap<NaiveTime, HashSet<OrderId>>,
}

impl IndexInner {
    fn detach(&mut self, order_id: &OrderId, key: NaiveTime) {
        if let Some(bucket) = self.by_time.get_mut(&key) {
            bucket.remove(order_id);
            if bucket.is_empty() {
                self.by_time.remove(&key);
            }
        }
    }
}

/// Concurrent index of pending orders by id and time bucket.
///
/// Both maps live behind one lock, so readers never observe an id in one
/// map but not the other.
#[derive(Debug, Default)]
pub struct PendingIndex {
    inner: RwLock<IndexInner>,
    resolution: TimeResolution,
}

impl PendingIndex {
    pub fn new(resolution: TimeResolution) -> Self {
        Self {
            inner: RwLock::new(IndexInner::default()),
            resolution,
        }
    }

    pub fn resolution(&self) -> TimeResolution {
        self.resolution
    }

    /// Insert or replace an order.
    ///
    /// Re-inserting an id moves it to the bucket of its new scheduled time.
    /// Returns true if the id was not indexed before.
    pub fn insert(&self, order: Order) -> bool {
        let key = self.resolution.normalize(order.scheduled_time);
        let id = order.order_id.clone();

        let (is_new, size) = {
            let mut inner = self.inner.write();
            let previous = inner.by_id.insert(id.clone(), order);
            if let Some(prev) = &previous {
                let prev_key = self.resolution.normalize(prev.scheduled_time);
                inner.detach(&id, prev_key);
            }
            inner.by_time.entry(key).or_default().insert(id);
            (previous.is_none(), inner.by_id.len())
        };

        Metrics::set_index_size(size);
        is_new
    }

    /// Remove an order from both maps. Empty buckets are dropped.
    pub fn remove(&self, order_id: &OrderId) -> Option<Order> {
        let (removed, size) = {
            let mut inner = self.inner.write();
            let removed = inner.by_id.remove(order_id);
            if let Some(order) = &removed {
                let key = self.resolution.normalize(order.scheduled_time);
                inner.detach(order_id, key);
            }
            (removed, inner.by_id.len())
        };

        if removed.is_some() {
            Metrics::set_index_size(size);
        }
        removed
    }

    /// Every order whose bucket is at or before `now`.
    ///
    /// Catch-up semantics: a bucket missed by a late tick is still returned
    /// on the next one. Results are ordered by bucket.
    pub fn due(&self, now: NaiveTime) -> Vec<Order> {
        let inner = self.inner.read();
        inner
            .by_time
            .range(..=now)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| inner.by_id.get(id).cloned())
            .collect()
    }

    pub fn get(&self, order_id: &OrderId) -> Option<Order> {
        self.inner.read().by_id.get(order_id).cloned()
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.inner.read().by_id.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of non-empty time buckets.
    pub fn bucket_count(&self) -> usize {
        self.inner.read().by_time.len()
    }

    /// Load every pending order from the store.
    pub fn warm_start(&self, store: &dyn OrderStore) -> StoreResult<usize> {
        let pending = store.find_by_status(OrderStatus::Pending)?;
        let count = pending.len();
        for order in pending {
            debug!(order_id = %mask_id(order.order_id.as_str()), time = %order.scheduled_time, "Indexing pending order");
            self.insert(order);
        }
        info!(count, buckets = self.bucket_count(), "Pending index warm start complete");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tranche_core::{Direction, InstrumentId, OrderType, Price};
    use tranche_store::{MemoryOrderStore, StatusUpdate};

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn order(id: &str, time: NaiveTime) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::from(id),
            instrument_id: InstrumentId::from("BBG004730N88"),
            quantity: 1,
            price: Price::new(dec!(99)),
            direction: Direction::Buy,
            account_id: "acc-1".to_string(),
            order_type: OrderType::Limit,
            scheduled_time: time,
            status: OrderStatus::Pending,
            broker_order_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_due_is_catch_up() {
        let index = PendingIndex::new(TimeResolution::Second);
        index.insert(order("a", t(9, 59, 0)));
        index.insert(order("b", t(10, 0, 0)));
        index.insert(order("c", t(10, 0, 1)));

        let due: Vec<_> = index
            .due(t(10, 0, 0))
            .into_iter()
            .map(|o| o.order_id.to_string())
            .collect();
        assert_eq!(due, vec!["a", "b"]);
        assert!(index.due(t(9, 0, 0)).is_empty());
    }

    #[test]
    fn test_minute_resolution_buckets() {
        let index = PendingIndex::new(TimeResolution::Minute);
        index.insert(order("a", t(10, 15, 10)));
        index.insert(order("b", t(10, 15, 50)));

        assert_eq!(index.bucket_count(), 1);
        assert_eq!(index.due(t(10, 15, 0)).len(), 2);
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let index = PendingIndex::new(TimeResolution::Second);
        index.insert(order("a", t(10, 0, 0)));
        index.insert(order("b", t(10, 0, 0)));

        assert!(index.remove(&OrderId::from("a")).is_some());
        assert_eq!(index.bucket_count(), 1);
        assert!(index.remove(&OrderId::from("b")).is_some());
        assert_eq!(index.bucket_count(), 0);
        assert!(index.remove(&OrderId::from("b")).is_none());
        assert!(index.is_empty());
    }

    #[test]
    fn test_reinsert_moves_bucket() {
        let index = PendingIndex::new(TimeResolution::Second);
        assert!(index.insert(order("a", t(10, 0, 0))));
        assert!(!index.insert(order("a", t(11, 0, 0))));

        assert_eq!(index.len(), 1);
        assert_eq!(index.bucket_count(), 1);
        assert!(index.due(t(10, 30, 0)).is_empty());
        assert_eq!(index.due(t(11, 0, 0)).len(), 1);
    }

    #[test]
    fn test_concurrent_insert_then_remove_leaves_nothing() {
        let index = Arc::new(PendingIndex::new(TimeResolution::Second));
        let n = 500;

        let inserters: Vec<_> = (0..4)
            .map(|w| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in (w..n).step_by(4) {
                        let time = t(10, (i % 60) as u32, (i % 7) as u32);
                        index.insert(order(&format!("o-{i}"), time));
                    }
                })
            })
            .collect();
        for h in inserters {
            h.join().unwrap();
        }
        assert_eq!(index.len(), n);

        let removers: Vec<_> = (0..4)
            .map(|w| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in (w..n).step_by(4) {
                        assert!(index.remove(&OrderId::from(format!("o-{i}"))).is_some());
                    }
                })
            })
            .collect();
        for h in removers {
            h.join().unwrap();
        }

        assert_eq!(index.len(), 0);
        assert_eq!(index.bucket_count(), 0);
    }

    #[test]
    fn test_warm_start_loads_only_pending() {
        let store = MemoryOrderStore::new();
        store
            .save_all(vec![order("a", t(10, 0, 0)), order("b", t(11, 0, 0))])
            .unwrap();
        store
            .update_status(&OrderId::from("b"), StatusUpdate::sent("b-1"))
            .unwrap();

        let index = PendingIndex::new(TimeResolution::Second);
        assert_eq!(index.warm_start(&store).unwrap(), 1);
        assert!(index.contains(&OrderId::from("a")));
        assert!(!index.contains(&OrderId::from("b")));
    }
}
