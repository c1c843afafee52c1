//! Scheduled order dispatcher.
//!
//! Every tick:
//! 1. Reads the venue time of day at second resolution
//! 2. Collects due orders from the pending index
//! 3. Claims each order and spawns a dispatch task on the worker pool
//!
//! Each task re-reads the order from the store, submits it through the
//! `SubmissionClient`, writes SENT or ERROR back and drops the order from
//! the index. Failed orders are not re-queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use tranche_broker::{mask_id, SubmissionClient};
use tranche_core::{OrderId, OrderStatus, VenueClock};
use tranche_store::{DynOrderStore, StatusUpdate};
use tranche_telemetry::Metrics;

use crate::error::{DispatchError, DispatchResult};
use crate::index::PendingIndex;

// ============================================================================
// Config and reports
// ============================================================================

/// Dispatcher settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub tick_interval: Duration,
    /// Wait inside each task before the broker call.
    pub pre_submit_delay: Duration,
    /// Maximum concurrent broker submissions.
    pub worker_permits: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            pre_submit_delay: Duration::from_millis(50),
            worker_permits: 16,
        }
    }
}

/// Driver state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scanning,
    /// Number of claimed orders still being dispatched.
    Dispatching(usize),
}

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub spawned: usize,
    pub already_in_flight: usize,
}

/// Result of dispatching one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { broker_order_id: String },
    Failed { message: String },
    /// Dropped without a broker call.
    Skipped { reason: String },
}

// ============================================================================
// In-flight claims
// ============================================================================

/// Releases an in-flight claim when dropped.
struct Claim {
    in_flight: Arc<DashMap<OrderId, ()>>,
    order_id: OrderId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.in_flight.remove(&self.order_id);
        Metrics::in_flight_dec();
    }
}

fn try_claim(in_flight: &Arc<DashMap<OrderId, ()>>, order_id: &OrderId) -> Option<Claim> {
    match in_flight.entry(order_id.clone()) {
        Entry::Occupied(_) => None,
        Entry::Vacant(e) => {
            e.insert(());
            Metrics::in_flight_inc();
            Some(Claim {
                in_flight: Arc::clone(in_flight),
                order_id: order_id.clone(),
            })
        }
    }
}

// ============================================================================
// DispatchContext
// ============================================================================

/// State shared by the driver and every dispatch task.
struct DispatchContext {
    index: Arc<PendingIndex>,
    store: DynOrderStore,
    client: SubmissionClient,
    permits: Arc<Semaphore>,
    config: DispatcherConfig,
}

impl DispatchContext {
    /// Read through the store, submit, and record the outcome.
    async fn dispatch(&self, order_id: &OrderId, forced: bool) -> DispatchOutcome {
        let masked = mask_id(order_id.as_str());

        let order = match self.store.find_by_order_id(order_id) {
            Ok(Some(order)) => order,
            Ok(None) => {
                self.index.remove(order_id);
                return skipped(&masked, "order no longer exists");
            }
            Err(e) => {
                // Left in the index; the next tick tries again.
                warn!(order_id = %masked, error = %e, "Store read failed before dispatch");
                return DispatchOutcome::Skipped {
                    reason: format!("store read failed: {e}"),
                };
            }
        };

        let sendable = if forced {
            order.status.is_sendable()
        } else {
            order.status == OrderStatus::Pending
        };
        if !sendable {
            self.index.remove(order_id);
            return skipped(&masked, &format!("order is {}", order.status));
        }

        if let Some(reason) = order.dispatch_blocker() {
            self.record(order_id, StatusUpdate::error(reason), &masked);
            self.index.remove(order_id);
            Metrics::dispatch_error();
            return DispatchOutcome::Failed {
                message: reason.to_string(),
            };
        }

        let outcome = match self.client.submit(&order).await {
            Ok(success) => {
                self.record_sent(order_id, &success.broker_order_id, &masked);
                Metrics::dispatch_sent();
                DispatchOutcome::Sent {
                    broker_order_id: success.broker_order_id,
                }
            }
            Err(failure) => {
                self.record(order_id, StatusUpdate::error(failure.message.clone()), &masked);
                Metrics::dispatch_error();
                DispatchOutcome::Failed {
                    message: failure.message,
                }
            }
        };
        self.index.remove(order_id);
        outcome
    }

    fn record(&self, order_id: &OrderId, update: StatusUpdate, masked: &str) {
        let status = update.status;
        if let Err(e) = self.store.update_status(order_id, update) {
            error!(order_id = %masked, %status, error = %e, "Failed to record dispatch outcome");
        }
    }

    /// Write SENT, or keep the broker id on the record if the write fails.
    fn record_sent(&self, order_id: &OrderId, broker_order_id: &str, masked: &str) {
        let Err(e) = self
            .store
            .update_status(order_id, StatusUpdate::sent(broker_order_id))
        else {
            return;
        };
        error!(
            order_id = %masked,
            broker_order_id = %mask_id(broker_order_id),
            error = %e,
            "Broker accepted order but SENT was not recorded"
        );
        let note = format!("accepted by broker after local status change: {e}");
        if let Err(e) = self
            .store
            .attach_broker_order_id(order_id, broker_order_id, &note)
        {
            error!(order_id = %masked, error = %e, "Failed to attach broker order id");
        }
    }
}

fn skipped(masked: &str, reason: &str) -> DispatchOutcome {
    debug!(order_id = %masked, reason, "Dispatch skipped");
    Metrics::dispatch_skipped();
    DispatchOutcome::Skipped {
        reason: reason.to_string(),
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Fixed-interval scheduler that submits due orders.
pub struct Dispatcher {
    ctx: Arc<DispatchContext>,
    clock: VenueClock,
    in_flight: Arc<DashMap<OrderId, ()>>,
    tracker: TaskTracker,
    scanning: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        index: Arc<PendingIndex>,
        store: DynOrderStore,
        client: SubmissionClient,
        clock: VenueClock,
        config: DispatcherConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.worker_permits.max(1)));
        Self {
            ctx: Arc::new(DispatchContext {
                index,
                store,
                client,
                permits,
                config,
            }),
            clock,
            in_flight: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> &Arc<PendingIndex> {
        &self.ctx.index
    }

    pub fn state(&self) -> SchedulerState {
        if self.scanning.load(Ordering::Acquire) {
            return SchedulerState::Scanning;
        }
        match self.in_flight.len() {
            0 => SchedulerState::Idle,
            n => SchedulerState::Dispatching(n),
        }
    }

    pub fn is_in_flight(&self, order_id: &OrderId) -> bool {
        self.in_flight.contains_key(order_id)
    }

    /// Run `f` while holding the order's dispatch claim.
    ///
    /// Fails with `Conflict` if a dispatch task holds the claim. Ticks and
    /// forced sends skip the order until `f` returns.
    pub fn with_claim<T>(&self, order_id: &OrderId, f: impl FnOnce() -> T) -> DispatchResult<T> {
        let _claim = try_claim(&self.in_flight, order_id).ok_or_else(|| {
            DispatchError::Conflict(format!("order {order_id} is being dispatched"))
        })?;
        Ok(f())
    }

    /// Run one tick at the current venue time.
    pub fn tick(&self) -> TickReport {
        self.tick_at(self.clock.now())
    }

    /// Run one tick as if the venue time were `now`.
    ///
    /// Never waits for a worker permit; spawned tasks queue on the pool.
    pub fn tick_at(&self, now: NaiveTime) -> TickReport {
        self.scanning.store(true, Ordering::Release);
        let due = self.ctx.index.due(now);
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for order in due {
            match try_claim(&self.in_flight, &order.order_id) {
                Some(claim) => {
                    self.spawn_dispatch(claim, false);
                    report.spawned += 1;
                }
                None => report.already_in_flight += 1,
            }
        }
        self.scanning.store(false, Ordering::Release);

        if report.due > 0 {
            debug!(
                now = %now,
                due = report.due,
                spawned = report.spawned,
                in_flight = report.already_in_flight,
                "Dispatch tick"
            );
        }
        report
    }

    /// Submit an order immediately, regardless of its scheduled time.
    ///
    /// Accepts PENDING and ERROR orders. Fails with `NotFound` for unknown
    /// ids and `Conflict` for sent or terminal orders, or orders already
    /// being dispatched.
    pub async fn force_send(&self, order_id: &OrderId) -> DispatchResult<DispatchOutcome> {
        let order = self
            .ctx
            .store
            .find_by_order_id(order_id)?
            .ok_or_else(|| DispatchError::NotFound(order_id.to_string()))?;

        if !order.status.is_sendable() {
            return Err(DispatchError::Conflict(format!(
                "order {order_id} is {}",
                order.status
            )));
        }

        let claim = try_claim(&self.in_flight, order_id).ok_or_else(|| {
            DispatchError::Conflict(format!("order {order_id} is already being dispatched"))
        })?;

        info!(order_id = %mask_id(order_id.as_str()), "Forced send");
        self.spawn_dispatch(claim, true)
            .await
            .map_err(|e| DispatchError::Task(e.to_string()))
    }

    fn spawn_dispatch(
        &self,
        claim: Claim,
        forced: bool,
    ) -> tokio::task::JoinHandle<DispatchOutcome> {
        let ctx = Arc::clone(&self.ctx);
        self.tracker.spawn(async move {
            let order_id = claim.order_id.clone();
            let _claim = claim;

            let Ok(_permit) = Arc::clone(&ctx.permits).acquire_owned().await else {
                return DispatchOutcome::Skipped {
                    reason: "worker pool closed".to_string(),
                };
            };
            if !forced && !ctx.config.pre_submit_delay.is_zero() {
                tokio::time::sleep(ctx.config.pre_submit_delay).await;
            }
            ctx.dispatch(&order_id, forced).await
        })
    }

    /// Wait for every dispatch task spawned so far.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Tick every `tick_interval` until `shutdown` is cancelled, then wait
    /// for in-flight tasks.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.ctx.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_ms = self.ctx.config.tick_interval.as_millis() as u64,
            permits = self.ctx.config.worker_permits,
            offset = %self.clock.offset(),
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick();
                }
            }
        }

        info!(in_flight = self.in_flight.len(), "Dispatcher stopping, waiting for in-flight orders");
        self.tracker.close();
        self.tracker.wait().await;
        info!("Dispatcher stopped");
    }
}
