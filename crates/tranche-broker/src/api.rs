//! Broker API trait and mock.
//!
//! Abstracts the broker so the dispatcher can be tested without a network:
//! - `RestBroker` for the real gateway
//! - `MockBroker` with scripted results for tests

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tranche_core::{
    Direction, InstrumentId, Order, OrderId, OrderStatus, OrderType, PriceLimits, Quotation,
};

use crate::error::{BrokerError, BrokerResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Order submission payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostOrderRequest {
    /// Idempotency key. Identical across retries.
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    /// Whole lots.
    pub quantity: u64,
    pub price: Quotation,
    pub direction: Direction,
    pub account_id: String,
    pub order_type: OrderType,
}

impl PostOrderRequest {
    pub fn from_order(order: &Order) -> BrokerResult<Self> {
        let price = Quotation::from_price(order.price)
            .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            order_id: order.order_id.clone(),
            instrument_id: order.instrument_id.clone(),
            quantity: order.quantity,
            price,
            direction: order.direction,
            account_id: order.account_id.clone(),
            order_type: order.order_type,
        })
    }
}

/// Broker acknowledgement of a submitted order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostOrderResponse {
    pub broker_order_id: String,
    pub state: BrokerOrderState,
}

/// Execution state reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerOrderState {
    New,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
    Unknown,
}

impl BrokerOrderState {
    /// Final order status this state maps to, if the order is done.
    #[must_use]
    pub fn final_status(&self) -> Option<OrderStatus> {
        match self {
            Self::Filled => Some(OrderStatus::Executed),
            Self::Rejected => Some(OrderStatus::Rejected),
            Self::Cancelled => Some(OrderStatus::Cancelled),
            Self::New | Self::PartiallyFilled | Self::Unknown => None,
        }
    }
}

/// Broker operations used by the engine.
pub trait BrokerApi: Send + Sync {
    /// Submit one order. The request's `order_id` is the idempotency key.
    fn post_order(&self, request: PostOrderRequest) -> BoxFuture<'_, BrokerResult<PostOrderResponse>>;

    /// Current execution state of a previously submitted order.
    fn order_state(
        &self,
        account_id: String,
        broker_order_id: String,
    ) -> BoxFuture<'_, BrokerResult<BrokerOrderState>>;

    /// Current session price limits of an instrument.
    fn price_limits(&self, instrument_id: InstrumentId) -> BoxFuture<'_, BrokerResult<PriceLimits>>;
}

/// Arc wrapper for broker trait objects.
pub type DynBroker = Arc<dyn BrokerApi>;

/// Most recent submissions kept by [`MockBroker`].
pub const DEFAULT_POST_HISTORY: usize = 1024;

/// Mock broker for testing and dry runs.
///
/// `post_order` pops scripted results in order; once the script is empty it
/// acknowledges with `mock-<n>` broker ids. Only the last `post_history`
/// submissions are recorded.
#[derive(Debug)]
pub struct MockBroker {
    /// Recorded submissions for verification.
    posts: Mutex<VecDeque<PostOrderRequest>>,
    post_history: usize,
    /// Scripted `post_order` results.
    post_results: Mutex<VecDeque<BrokerResult<PostOrderResponse>>>,
    /// Order states by broker id.
    states: Mutex<HashMap<String, BrokerOrderState>>,
    limits: Mutex<HashMap<InstrumentId, PriceLimits>>,
    /// Artificial latency of every `post_order` call.
    delay: Mutex<Option<Duration>>,
    post_calls: AtomicUsize,
}

impl Default for MockBroker {
    fn default() -> Self {
        Self {
            posts: Mutex::new(VecDeque::new()),
            post_history: DEFAULT_POST_HISTORY,
            post_results: Mutex::new(VecDeque::new()),
            states: Mutex::new(HashMap::new()),
            limits: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            post_calls: AtomicUsize::new(0),
        }
    }
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` recorded submissions. Zero disables recording.
    pub fn with_post_history(mut self, limit: usize) -> Self {
        self.post_history = limit;
        self
    }

    /// Queue the result of the next unscripted `post_order` call.
    pub fn push_post_result(&self, result: BrokerResult<PostOrderResponse>) {
        self.post_results.lock().push_back(result);
    }

    /// Queue a failure.
    pub fn push_post_error(&self, error: BrokerError) {
        self.push_post_result(Err(error));
    }

    /// Queue an acknowledgement with the given broker id.
    pub fn push_post_ok(&self, broker_order_id: &str) {
        self.push_post_result(Ok(PostOrderResponse {
            broker_order_id: broker_order_id.to_string(),
            state: BrokerOrderState::New,
        }));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_order_state(&self, broker_order_id: &str, state: BrokerOrderState) {
        self.states.lock().insert(broker_order_id.to_string(), state);
    }

    pub fn set_limits(&self, instrument_id: InstrumentId, limits: PriceLimits) {
        self.limits.lock().insert(instrument_id, limits);
    }

    /// Number of `post_order` calls, including failed ones.
    pub fn post_count(&self) -> usize {
        self.post_calls.load(Ordering::SeqCst)
    }

    /// Get recorded submissions, oldest first.
    pub fn get_posts(&self) -> Vec<PostOrderRequest> {
        self.posts.lock().iter().cloned().collect()
    }

    fn record_post(&self, request: PostOrderRequest) {
        if self.post_history == 0 {
            return;
        }
        let mut posts = self.posts.lock();
        while posts.len() >= self.post_history {
            posts.pop_front();
        }
        posts.push_back(request);
    }
}

impl BrokerApi for MockBroker {
    fn post_order(&self, request: PostOrderRequest) -> BoxFuture<'_, BrokerResult<PostOrderResponse>> {
        Box::pin(async move {
            let n = self.post_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.record_post(request);

            let scripted = self.post_results.lock().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(PostOrderResponse {
                    broker_order_id: format!("mock-{n}"),
                    state: BrokerOrderState::New,
                })
            })
        })
    }

    fn order_state(
        &self,
        _account_id: String,
        broker_order_id: String,
    ) -> BoxFuture<'_, BrokerResult<BrokerOrderState>> {
        Box::pin(async move {
            Ok(self
                .states
                .lock()
                .get(&broker_order_id)
                .copied()
                .unwrap_or(BrokerOrderState::New))
        })
    }

    fn price_limits(&self, instrument_id: InstrumentId) -> BoxFuture<'_, BrokerResult<PriceLimits>> {
        Box::pin(async move {
            self.limits
                .lock()
                .get(&instrument_id)
                .copied()
                .ok_or_else(|| BrokerError::Rejected(format!("no limits for {instrument_id}")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use rust_decimal_macros::dec;
    use tranche_core::Price;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            order_id: OrderId::from("tr-1"),
            instrument_id: InstrumentId::from("BBG004730N88"),
            quantity: 3,
            price: Price::new(dec!(49.5)),
            direction: Direction::Buy,
            account_id: "acc-1".to_string(),
            order_type: OrderType::Limit,
            scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            status: OrderStatus::Pending,
            broker_order_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_request_converts_price_to_quotation() {
        let req = PostOrderRequest::from_order(&order()).unwrap();
        assert_eq!(req.price, Quotation::new(49, 500_000_000).unwrap());
        assert_eq!(req.order_id.as_str(), "tr-1");
    }

    #[test]
    fn test_final_status_mapping() {
        assert_eq!(
            BrokerOrderState::Filled.final_status(),
            Some(OrderStatus::Executed)
        );
        assert_eq!(BrokerOrderState::PartiallyFilled.final_status(), None);
    }

    #[tokio::test]
    async fn test_mock_scripted_then_default() {
        let broker = MockBroker::new();
        broker.push_post_error(BrokerError::Transport("reset".into()));

        let req = PostOrderRequest::from_order(&order()).unwrap();
        assert!(broker.post_order(req.clone()).await.is_err());
        let ack = broker.post_order(req).await.unwrap();
        assert_eq!(ack.broker_order_id, "mock-2");
        assert_eq!(broker.post_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_keeps_only_recent_posts() {
        let broker = MockBroker::new().with_post_history(2);
        for id in ["tr-1", "tr-2", "tr-3"] {
            let mut req = PostOrderRequest::from_order(&order()).unwrap();
            req.order_id = OrderId::from(id);
            broker.post_order(req).await.unwrap();
        }

        let ids: Vec<_> = broker
            .get_posts()
            .into_iter()
            .map(|p| p.order_id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["tr-2", "tr-3"]);
        assert_eq!(broker.post_count(), 3);

        let silent = MockBroker::new().with_post_history(0);
        silent
            .post_order(PostOrderRequest::from_order(&order()).unwrap())
            .await
            .unwrap();
        assert!(silent.get_posts().is_empty());
        assert_eq!(silent.post_count(), 1);
    }
}
