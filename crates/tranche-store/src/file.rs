//! JSON snapshot file store.
//!
//! Keeps the working set in a [`MemoryOrderStore`] and rewrites the whole
//! snapshot after every mutation. Writes go to a temporary sibling file
//! that is then renamed over the snapshot. A mutation whose snapshot write
//! fails is rolled back in memory before the error is returned.
//!
//! The write is synchronous and runs on the caller's thread, including
//! dispatch tasks on the runtime. Terminal orders are never pruned, so the
//! snapshot and the cost of each write grow with the order history; start
//! each session from a fresh file when that history gets large.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use tranche_core::{Order, OrderId, OrderStatus};

use crate::error::StoreResult;
use crate::memory::MemoryOrderStore;
use crate::store::{OrderStore, StatusUpdate};

/// Order store persisted as a JSON array on disk.
#[derive(Debug)]
pub struct FileOrderStore {
    path: PathBuf,
    inner: MemoryOrderStore,
    /// Held across each mutation and its snapshot write.
    write_lock: Mutex<()>,
}

impl FileOrderStore {
    /// Open `path`, loading existing orders if the file exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let orders: Vec<Order> = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            Vec::new()
        };

        info!(path = %path.display(), orders = orders.len(), "Opened order store");
        Ok(Self {
            path,
            inner: MemoryOrderStore::from_orders(orders),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the snapshot file from the in-memory state.
    ///
    /// Callers hold `write_lock`.
    fn persist(&self) -> StoreResult<()> {
        let orders = self.inner.snapshot();

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, &orders)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;

        debug!(orders = orders.len(), "Persisted order snapshot");
        Ok(())
    }

    /// Persist, running `rollback` on the in-memory state if the write fails.
    fn persist_or(&self, rollback: impl FnOnce(&MemoryOrderStore)) -> StoreResult<()> {
        self.persist().map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Snapshot write failed, rolling back");
            rollback(&self.inner);
            e
        })
    }
}

impl OrderStore for FileOrderStore {
    fn save(&self, order: Order) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let order_id = order.order_id.clone();
        self.inner.save(order)?;
        self.persist_or(|inner| inner.forget(&order_id))
    }

    fn save_all(&self, orders: Vec<Order>) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let ids: Vec<OrderId> = orders.iter().map(|o| o.order_id.clone()).collect();
        self.inner.save_all(orders)?;
        self.persist_or(|inner| ids.iter().for_each(|id| inner.forget(id)))
    }

    fn find_by_order_id(&self, order_id: &OrderId) -> StoreResult<Option<Order>> {
        self.inner.find_by_order_id(order_id)
    }

    fn find_by_status(&self, status: OrderStatus) -> StoreResult<Vec<Order>> {
        self.inner.find_by_status(status)
    }

    fn find_ready_to_send(&self, time: NaiveTime) -> StoreResult<Vec<Order>> {
        self.inner.find_ready_to_send(time)
    }

    fn update_status(&self, order_id: &OrderId, update: StatusUpdate) -> StoreResult<Order> {
        let _guard = self.write_lock.lock();
        let previous = self.inner.find_by_order_id(order_id)?;
        let order = self.inner.update_status(order_id, update)?;
        self.persist_or(|inner| previous.into_iter().for_each(|o| inner.restore(o)))?;
        Ok(order)
    }

    fn attach_broker_order_id(
        &self,
        order_id: &OrderId,
        broker_order_id: &str,
        note: &str,
    ) -> StoreResult<Order> {
        let _guard = self.write_lock.lock();
        let previous = self.inner.find_by_order_id(order_id)?;
        let order = self.inner.attach_broker_order_id(order_id, broker_order_id, note)?;
        self.persist_or(|inner| previous.into_iter().for_each(|o| inner.restore(o)))?;
        Ok(order)
    }

    fn exists(&self, order_id: &OrderId) -> StoreResult<bool> {
        self.inner.exists(order_id)
    }

    fn delete(&self, order_id: &OrderId) -> StoreResult<bool> {
        let _guard = self.write_lock.lock();
        let Some(previous) = self.inner.find_by_order_id(order_id)? else {
            return Ok(false);
        };
        self.inner.delete(order_id)?;
        self.persist_or(|inner| inner.restore(previous))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;
    use tranche_core::{Direction, InstrumentId, OrderType, Price};

    fn order(id: &str) -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::from(id),
            instrument_id: InstrumentId::from("BBG004730N88"),
            quantity: 2,
            price: Price::new(dec!(49.5)),
            direction: Direction::Sell,
            account_id: "acc-1".to_string(),
            order_type: OrderType::Limit,
            scheduled_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            status: OrderStatus::Pending,
            broker_order_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_reopen_restores_orders_and_status() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.json");

        {
            let store = FileOrderStore::open(&path).unwrap();
            store.save_all(vec![order("a"), order("b")]).unwrap();
            store
                .update_status(&OrderId::from("a"), StatusUpdate::sent("b-1"))
                .unwrap();
        }

        let reopened = FileOrderStore::open(&path).unwrap();
        let a = reopened.find_by_order_id(&OrderId::from("a")).unwrap().unwrap();
        assert_eq!(a.status, OrderStatus::Sent);
        assert_eq!(a.broker_order_id.as_deref(), Some("b-1"));
        assert_eq!(a.price.inner(), dec!(49.5));

        let pending = reopened.find_by_status(OrderStatus::Pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id.as_str(), "b");
    }

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("orders.json");

        let store = FileOrderStore::open(&path).unwrap();
        store.save(order("a")).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_delete_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.json");

        let store = FileOrderStore::open(&path).unwrap();
        store.save(order("a")).unwrap();
        assert!(store.delete(&OrderId::from("a")).unwrap());

        let reopened = FileOrderStore::open(&path).unwrap();
        assert!(!reopened.exists(&OrderId::from("a")).unwrap());
    }

    /// A directory at the temp path makes every snapshot write fail.
    fn block_writes(path: &Path) -> PathBuf {
        let tmp = path.with_extension("json.tmp");
        fs::create_dir(&tmp).unwrap();
        tmp
    }

    #[test]
    fn test_failed_save_is_not_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.json");
        let store = FileOrderStore::open(&path).unwrap();

        let blocker = block_writes(&path);
        assert!(store.save(order("failed")).is_err());
        assert!(store.save_all(vec![order("batch-1"), order("batch-2")]).is_err());
        assert!(!store.exists(&OrderId::from("failed")).unwrap());
        assert!(!store.exists(&OrderId::from("batch-1")).unwrap());

        fs::remove_dir(&blocker).unwrap();
        store.save(order("ok")).unwrap();

        let reopened = FileOrderStore::open(&path).unwrap();
        let pending: Vec<String> = reopened
            .find_by_status(OrderStatus::Pending)
            .unwrap()
            .into_iter()
            .map(|o| o.order_id.as_str().to_string())
            .collect();
        assert_eq!(pending, vec!["ok"]);
    }

    #[test]
    fn test_failed_update_and_delete_roll_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.json");
        let store = FileOrderStore::open(&path).unwrap();
        store.save(order("a")).unwrap();
        let id = OrderId::from("a");

        let blocker = block_writes(&path);
        assert!(store.update_status(&id, StatusUpdate::sent("b-1")).is_err());
        let a = store.find_by_order_id(&id).unwrap().unwrap();
        assert_eq!(a.status, OrderStatus::Pending);
        assert_eq!(a.broker_order_id, None);

        assert!(store.delete(&id).is_err());
        assert!(store.exists(&id).unwrap());

        fs::remove_dir(&blocker).unwrap();
        store
            .update_status(&id, StatusUpdate::new(OrderStatus::Cancelled))
            .unwrap();
        let reopened = FileOrderStore::open(&path).unwrap();
        let a = reopened.find_by_order_id(&id).unwrap().unwrap();
        assert_eq!(a.status, OrderStatus::Cancelled);
    }

    #[test]
    fn test_attach_broker_order_id_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orders.json");
        let store = FileOrderStore::open(&path).unwrap();
        store.save(order("a")).unwrap();
        let id = OrderId::from("a");
        store
            .update_status(&id, StatusUpdate::new(OrderStatus::Cancelled))
            .unwrap();

        store
            .attach_broker_order_id(&id, "b-9", "accepted after cancel")
            .unwrap();

        let reopened = FileOrderStore::open(&path).unwrap();
        let a = reopened.find_by_order_id(&id).unwrap().unwrap();
        assert_eq!(a.status, OrderStatus::Cancelled);
        assert_eq!(a.broker_order_id.as_deref(), Some("b-9"));
        assert_eq!(a.error_message.as_deref(), Some("accepted after cancel"));
    }
}
