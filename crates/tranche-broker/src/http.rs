//! REST gateway broker implementation.
//!
//! Speaks the broker's JSON-over-HTTP gateway. int64 fields travel as JSON
//! strings; prices as `{units, nano}` quotations.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tranche_core::{Direction, InstrumentId, OrderType, PriceLimits, Quotation};
use zeroize::Zeroizing;

use crate::api::{BoxFuture, BrokerApi, BrokerOrderState, PostOrderRequest, PostOrderResponse};
use crate::error::{BrokerError, BrokerResult};
use crate::sanitize::{mask_id, Sanitizer};

const SERVICE_PREFIX: &str = "tinkoff.public.invest.api.contract.v1";

/// Transport-level timeout. The submission client applies its own per-call
/// timeout on top.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Quotation as encoded on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct WireQuotation {
    units: String,
    nano: i32,
}

impl From<Quotation> for WireQuotation {
    fn from(q: Quotation) -> Self {
        Self {
            units: q.units.to_string(),
            nano: q.nano,
        }
    }
}

impl TryFrom<WireQuotation> for Quotation {
    type Error = BrokerError;

    fn try_from(w: WireQuotation) -> BrokerResult<Self> {
        let units = w
            .units
            .parse::<i64>()
            .map_err(|e| BrokerError::InvalidResponse(format!("units {:?}: {e}", w.units)))?;
        Quotation::new(units, w.nano).map_err(|e| BrokerError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePostOrder {
    instrument_id: String,
    quantity: String,
    price: WireQuotation,
    direction: &'static str,
    account_id: String,
    order_type: &'static str,
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePostOrderResponse {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    execution_report_status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGetOrderState {
    account_id: String,
    order_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrderState {
    #[serde(default)]
    execution_report_status: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGetOrderBook {
    instrument_id: String,
    depth: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOrderBook {
    limit_up: Option<WireQuotation>,
    limit_down: Option<WireQuotation>,
}

fn wire_direction(direction: Direction) -> &'static str {
    match direction {
        Direction::Buy => "ORDER_DIRECTION_BUY",
        Direction::Sell => "ORDER_DIRECTION_SELL",
        Direction::Unspecified => "ORDER_DIRECTION_UNSPECIFIED",
    }
}

fn wire_order_type(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "ORDER_TYPE_LIMIT",
        OrderType::Market => "ORDER_TYPE_MARKET",
        OrderType::Unspecified => "ORDER_TYPE_UNSPECIFIED",
    }
}

fn parse_report_status(status: &str) -> BrokerOrderState {
    match status {
        "EXECUTION_REPORT_STATUS_NEW" => BrokerOrderState::New,
        "EXECUTION_REPORT_STATUS_PARTIALLYFILL" => BrokerOrderState::PartiallyFilled,
        "EXECUTION_REPORT_STATUS_FILL" => BrokerOrderState::Filled,
        "EXECUTION_REPORT_STATUS_REJECTED" => BrokerOrderState::Rejected,
        "EXECUTION_REPORT_STATUS_CANCELLED" => BrokerOrderState::Cancelled,
        _ => BrokerOrderState::Unknown,
    }
}

/// Broker client for the REST gateway.
pub struct RestBroker {
    client: Client,
    base_url: String,
    token: Zeroizing<String>,
    sanitizer: Sanitizer,
}

impl std::fmt::Debug for RestBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBroker")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestBroker {
    /// Create a new REST broker.
    ///
    /// # Arguments
    /// * `base_url` - Gateway root, e.g. `https://invest-public-api.tinkoff.ru/rest`
    /// * `token` - API token, sent as a bearer credential
    pub fn new(base_url: impl Into<String>, token: Zeroizing<String>) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BrokerError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        let sanitizer = Sanitizer::new().with_secret(token.as_str());
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            sanitizer,
        })
    }

    fn url(&self, service: &str, method: &str) -> String {
        format!("{}/{SERVICE_PREFIX}.{service}/{method}", self.base_url)
    }

    async fn call<B: Serialize, R: DeserializeOwned>(
        &self,
        service: &str,
        method: &str,
        body: &B,
    ) -> BrokerResult<R> {
        let response = self
            .client
            .post(self.url(service, method))
            .bearer_auth(self.token.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(self.sanitizer.sanitize(&e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = self.sanitizer.sanitize(&text);
            return Err(classify_status(status, message));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| BrokerError::InvalidResponse(self.sanitizer.sanitize(&e.to_string())))
    }
}

fn classify_status(status: StatusCode, message: String) -> BrokerError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        BrokerError::Unavailable {
            status: status.as_u16(),
            message,
        }
    } else {
        BrokerError::Rejected(format!("HTTP {}: {message}", status.as_u16()))
    }
}

impl BrokerApi for RestBroker {
    fn post_order(&self, request: PostOrderRequest) -> BoxFuture<'_, BrokerResult<PostOrderResponse>> {
        Box::pin(async move {
            debug!(order_id = %mask_id(request.order_id.as_str()), "PostOrder");
            let body = WirePostOrder {
                instrument_id: request.instrument_id.to_string(),
                quantity: request.quantity.to_string(),
                price: request.price.into(),
                direction: wire_direction(request.direction),
                account_id: request.account_id,
                order_type: wire_order_type(request.order_type),
                order_id: request.order_id.to_string(),
            };
            let resp: WirePostOrderResponse = self.call("OrdersService", "PostOrder", &body).await?;
            Ok(PostOrderResponse {
                broker_order_id: resp.order_id,
                state: parse_report_status(&resp.execution_report_status),
            })
        })
    }

    fn order_state(
        &self,
        account_id: String,
        broker_order_id: String,
    ) -> BoxFuture<'_, BrokerResult<BrokerOrderState>> {
        Box::pin(async move {
            let body = WireGetOrderState {
                account_id,
                order_id: broker_order_id,
            };
            let resp: WireOrderState = self.call("OrdersService", "GetOrderState", &body).await?;
            Ok(parse_report_status(&resp.execution_report_status))
        })
    }

    fn price_limits(&self, instrument_id: InstrumentId) -> BoxFuture<'_, BrokerResult<PriceLimits>> {
        Box::pin(async move {
            let body = WireGetOrderBook {
                instrument_id: instrument_id.to_string(),
                depth: 1,
            };
            let book: WireOrderBook = self.call("MarketDataService", "GetOrderBook", &body).await?;

            let (Some(up), Some(down)) = (book.limit_up, book.limit_down) else {
                return Err(BrokerError::InvalidResponse(format!(
                    "order book for {instrument_id} has no limits"
                )));
            };
            let to_price = |w: WireQuotation| -> BrokerResult<_> {
                Quotation::try_from(w)?
                    .to_price()
                    .map_err(|e| BrokerError::InvalidResponse(e.to_string()))
            };
            PriceLimits::new(to_price(down)?, to_price(up)?)
                .map_err(|e| BrokerError::InvalidResponse(e.to_string()))
        })
    }
}
