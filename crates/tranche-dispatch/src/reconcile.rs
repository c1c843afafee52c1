//! Broker status sync.
//!
//! Polls the broker for every SENT order and moves it to EXECUTED,
//! REJECTED or CANCELLED once the broker reports a final state.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tranche_broker::{mask_id, DynBroker};
use tranche_core::OrderStatus;
use tranche_store::{DynOrderStore, StatusUpdate, StoreResult};
use tranche_telemetry::Metrics;

/// Summary of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub checked: usize,
    pub updated: usize,
    pub failed: usize,
}

/// Periodic reconciliation of sent orders against the broker.
pub struct StatusSync {
    store: DynOrderStore,
    broker: DynBroker,
    call_timeout: Duration,
}

impl StatusSync {
    pub fn new(store: DynOrderStore, broker: DynBroker, call_timeout: Duration) -> Self {
        Self {
            store,
            broker,
            call_timeout,
        }
    }

    /// Check every SENT order once.
    pub async fn sync_once(&self) -> StoreResult<SyncReport> {
        let sent = self.store.find_by_status(OrderStatus::Sent)?;
        let mut report = SyncReport::default();

        for order in sent {
            let masked = mask_id(order.order_id.as_str());
            let Some(broker_order_id) = order.broker_order_id.clone() else {
                warn!(order_id = %masked, "Sent order has no broker order id");
                continue;
            };
            report.checked += 1;

            let state = match tokio::time::timeout(
                self.call_timeout,
                self.broker
                    .order_state(order.account_id.clone(), broker_order_id),
            )
            .await
            {
                Ok(Ok(state)) => state,
                Ok(Err(e)) => {
                    warn!(order_id = %masked, error = %e, "Order state query failed");
                    report.failed += 1;
                    continue;
                }
                Err(_) => {
                    warn!(order_id = %masked, "Order state query timed out");
                    report.failed += 1;
                    continue;
                }
            };

            let Some(status) = state.final_status() else {
                debug!(order_id = %masked, ?state, "Order still working");
                continue;
            };

            match self.store.update_status(&order.order_id, StatusUpdate::new(status)) {
                Ok(_) => {
                    info!(order_id = %masked, %status, "Order reached final state");
                    Metrics::status_synced(status.as_str());
                    report.updated += 1;
                }
                Err(e) => {
                    warn!(order_id = %masked, %status, error = %e, "Failed to record final state");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Sync every `interval` until `shutdown` is cancelled.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Status sync started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.sync_once().await {
                        Ok(report) if report.checked > 0 => {
                            debug!(?report, "Status sync pass");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Status sync failed"),
                    }
                }
            }
        }

        info!("Status sync stopped");
    }
}
