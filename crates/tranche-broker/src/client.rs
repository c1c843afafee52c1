//! Retrying order submission client.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use tranche_core::Order;
use tranche_telemetry::Metrics;

use crate::api::{DynBroker, PostOrderRequest};
use crate::backoff::BackoffPolicy;
use crate::error::BrokerError;
use crate::sanitize::{mask_id, Sanitizer};

/// Submission client settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionConfig {
    pub max_attempts: u32,
    /// Bound on every individual broker call.
    pub call_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            call_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSuccess {
    pub broker_order_id: String,
    pub attempts: u32,
}

/// Final failure after retries. `message` is sanitized and truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailure {
    pub message: String,
    pub attempts: u32,
}

/// Submits single orders with retry and backoff.
///
/// Stateless between calls; safe to share across dispatch tasks.
pub struct SubmissionClient {
    broker: DynBroker,
    config: SubmissionConfig,
    sanitizer: Sanitizer,
}

impl SubmissionClient {
    pub fn new(broker: DynBroker, config: SubmissionConfig, sanitizer: Sanitizer) -> Self {
        Self {
            broker,
            config,
            sanitizer,
        }
    }

    pub fn config(&self) -> &SubmissionConfig {
        &self.config
    }

    /// Submit `order`, retrying transient failures.
    ///
    /// Every attempt carries the same order id, so the broker can
    /// deduplicate a retry of a request that did land.
    pub async fn submit(&self, order: &Order) -> Result<SubmissionSuccess, SubmissionFailure> {
        let masked = mask_id(order.order_id.as_str());
        let started = Instant::now();

        let request = match PostOrderRequest::from_order(order) {
            Ok(req) => req,
            Err(e) => return Err(self.fail(&masked, &e, 0, started)),
        };

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(request.clone()).await {
                Ok(broker_order_id) => {
                    Metrics::submission_attempt("ok");
                    Metrics::submission_latency("sent", elapsed_ms(started));
                    info!(
                        order_id = %masked,
                        broker_order_id = %mask_id(&broker_order_id),
                        attempt,
                        "Order submitted"
                    );
                    return Ok(SubmissionSuccess {
                        broker_order_id,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    Metrics::submission_attempt(e.attempt_label());
                    if !e.is_retryable() || attempt >= max_attempts {
                        return Err(self.fail(&masked, &e, attempt, started));
                    }
                    let delay = self.config.backoff.delay_for(attempt);
                    warn!(
                        order_id = %masked,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %self.sanitizer.sanitize(&e.to_string()),
                        "Submission failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One bounded broker call.
    async fn attempt(&self, request: PostOrderRequest) -> Result<String, BrokerError> {
        let timeout = self.config.call_timeout;
        let response = tokio::time::timeout(timeout, self.broker.post_order(request))
            .await
            .map_err(|_| BrokerError::Timeout(timeout))??;

        if response.broker_order_id.trim().is_empty() {
            return Err(BrokerError::InvalidResponse(
                "empty broker order id".to_string(),
            ));
        }
        debug!(state = ?response.state, "Broker acknowledged order");
        Ok(response.broker_order_id)
    }

    fn fail(
        &self,
        masked: &str,
        error: &BrokerError,
        attempts: u32,
        started: Instant,
    ) -> SubmissionFailure {
        Metrics::submission_latency("error", elapsed_ms(started));
        let message = self.sanitizer.sanitize(&error.to_string());
        warn!(order_id = %masked, attempts, error = %message, "Submission failed");
        SubmissionFailure { message, attempts }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
