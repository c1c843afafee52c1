//! Application wiring.
//!
//! Builds the engine from configuration and runs its background tasks:
//! - Dispatcher tick loop
//! - Broker status sync
//! - Session limits refresh
//! - Optional `/metrics` endpoint

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tranche_broker::{DynBroker, MockBroker, RestBroker, Sanitizer, SubmissionClient};
use tranche_dispatch::{Dispatcher, PendingIndex, StatusSync};
use tranche_pricing::{GenerationRequest, OrderGenerator};
use tranche_registry::InstrumentCache;
use tranche_store::{DynOrderStore, FileOrderStore, MemoryOrderStore};
use tranche_telemetry::serve_metrics;
use zeroize::Zeroizing;

use crate::config::{AppConfig, StoreBackend};
use crate::error::AppResult;
use crate::service::OrderService;

/// Main application.
pub struct Application {
    config: AppConfig,
    registry: Arc<InstrumentCache>,
    store: DynOrderStore,
    broker: DynBroker,
    dispatcher: Arc<Dispatcher>,
    service: Arc<OrderService>,
}

impl Application {
    /// Create an application talking to the configured broker.
    ///
    /// `broker.dry_run` swaps the REST broker for a local mock that
    /// acknowledges every order.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let broker: DynBroker = if config.broker.dry_run {
            warn!("Dry run: orders are acknowledged locally, nothing reaches the broker");
            Arc::new(MockBroker::new().with_post_history(0))
        } else {
            Arc::new(RestBroker::new(
                config.broker.base_url.clone(),
                Zeroizing::new(config.broker.token.clone()),
            )?)
        };
        Self::with_broker(config, broker)
    }

    /// Create an application with an explicit broker.
    pub fn with_broker(config: AppConfig, broker: DynBroker) -> AppResult<Self> {
        let registry = Arc::new(InstrumentCache::from_seeds(&config.instruments)?);
        info!(instruments = registry.len(), "Instrument registry loaded");

        let store: DynOrderStore = match config.store.backend {
            StoreBackend::Memory => Arc::new(MemoryOrderStore::new()),
            StoreBackend::File => Arc::new(FileOrderStore::open(&config.store.path)?),
        };

        let mut sanitizer = Sanitizer::new();
        if !config.broker.token.is_empty() {
            sanitizer = sanitizer.with_secret(&config.broker.token);
        }
        let client = SubmissionClient::new(
            Arc::clone(&broker),
            config.broker.submission_config(),
            sanitizer,
        );

        let index = Arc::new(PendingIndex::new(config.scheduler.resolution));
        let dispatcher = Arc::new(Dispatcher::new(
            index,
            Arc::clone(&store),
            client,
            config.scheduler.venue_clock()?,
            config.scheduler.dispatcher_config(),
        ));

        let generator = OrderGenerator::new(registry.clone());
        let service = Arc::new(OrderService::new(
            generator,
            Arc::clone(&store),
            Arc::clone(&dispatcher),
        ));

        Ok(Self {
            config,
            registry,
            store,
            broker,
            dispatcher,
            service,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<InstrumentCache> {
        &self.registry
    }

    pub fn store(&self) -> &DynOrderStore {
        &self.store
    }

    pub fn service(&self) -> &Arc<OrderService> {
        &self.service
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Load every PENDING order from the store into the index.
    pub fn warm_start(&self) -> AppResult<usize> {
        Ok(self.dispatcher.index().warm_start(self.store.as_ref())?)
    }

    /// Refresh session limits for every known instrument.
    ///
    /// Failures keep the previous limits. Returns the number refreshed.
    pub async fn refresh_limits(&self) -> usize {
        let timeout = self.config.broker.call_timeout();
        let mut refreshed = 0;

        for instrument in self.registry.instruments() {
            match tokio::time::timeout(timeout, self.broker.price_limits(instrument.clone())).await {
                Ok(Ok(limits)) => {
                    self.registry.set_limits(instrument, limits);
                    refreshed += 1;
                }
                Ok(Err(e)) => {
                    warn!(instrument = %instrument, error = %e, "Limits refresh failed");
                }
                Err(_) => {
                    warn!(instrument = %instrument, "Limits refresh timed out");
                }
            }
        }

        debug!(refreshed, "Session limits refreshed");
        refreshed
    }

    /// Parse a JSON array of generation requests.
    ///
    /// Requests without an account use `broker.account_id`.
    pub fn load_instructions(&self, path: impl AsRef<Path>) -> AppResult<Vec<GenerationRequest>> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut requests: Vec<GenerationRequest> = serde_json::from_str(&content)?;
        for request in &mut requests {
            if request.account_id.trim().is_empty() {
                request.account_id = self.config.broker.account_id.clone();
            }
        }
        Ok(requests)
    }

    /// Create orders for each request. Rejected requests are logged and
    /// skipped. Returns the number of orders created.
    pub fn apply_instructions(&self, requests: &[GenerationRequest]) -> usize {
        let mut created = 0;
        for (i, request) in requests.iter().enumerate() {
            match self.service.create_orders(request) {
                Ok(result) => {
                    for skip in &result.skips {
                        warn!(
                            request = i,
                            instrument = %skip.instrument,
                            level = ?skip.level_index,
                            reason = %skip.reason,
                            "Level skipped"
                        );
                    }
                    created += result.created.len();
                }
                Err(e) => error!(request = i, error = %e, "Instruction rejected"),
            }
        }
        created
    }

    /// Run until Ctrl-C or `shutdown` is cancelled, then wait for
    /// in-flight dispatches to finish.
    pub async fn run(&self, shutdown: CancellationToken) -> AppResult<()> {
        info!(
            pending = self.dispatcher.index().len(),
            dry_run = self.config.broker.dry_run,
            "Starting application"
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let token = shutdown.clone();
        let dispatch_handle = tokio::spawn(async move { dispatcher.run(token).await });

        let sync_handle = match self.config.scheduler.status_sync_interval_secs {
            0 => None,
            secs => {
                let sync = StatusSync::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.broker),
                    self.config.broker.call_timeout(),
                );
                let token = shutdown.clone();
                Some(tokio::spawn(async move {
                    sync.run(Duration::from_secs(secs), token).await
                }))
            }
        };

        let metrics_handle = self.config.telemetry.metrics_port.map(|port| {
            let token = shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = serve_metrics(port, token).await {
                    error!(port, error = %e, "Metrics server failed");
                }
            })
        });

        let refresh_secs = self.config.scheduler.limits_refresh_interval_secs;
        let refresh_enabled = refresh_secs > 0 && !self.config.broker.dry_run;
        let mut refresh_interval = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));

        loop {
            tokio::select! {
                _ = refresh_interval.tick(), if refresh_enabled => {
                    self.refresh_limits().await;
                }

                _ = shutdown.cancelled() => break,

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        shutdown.cancel();
        if let Err(e) = dispatch_handle.await {
            error!(error = %e, "Dispatcher task failed");
        }
        if let Some(handle) = sync_handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Status sync task failed");
            }
        }
        if let Some(handle) = metrics_handle {
            if let Err(e) = handle.await {
                error!(error = %e, "Metrics task failed");
            }
        }

        info!(pending = self.dispatcher.index().len(), "Shutdown complete");
        Ok(())
    }
}
