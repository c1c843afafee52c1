//! Scheduled order model.
//!
//! This module provides:
//! - `Level`: one price instruction of a generation request
//! - `OrderDraft`: generator output, not yet persisted
//! - `Order`: the persisted order tracked through its lifecycle

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Price;
use crate::market::{InstrumentId, LimitBound};
use crate::order::{Direction, OrderId, OrderStatus, OrderType};

// ============================================================================
// Level
// ============================================================================

/// Price instruction for one level of a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Level {
    /// Offset from the reference price, in percent. Buys go below the
    /// reference, sells above.
    Percent { value: Decimal },
    /// Absolute price supplied by the caller.
    Absolute { price: Price },
    /// The instrument's current session limit.
    Limit { bound: LimitBound },
}

// ============================================================================
// OrderDraft
// ============================================================================

/// Order produced by the generator, before it enters the store and index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    /// Whole lots.
    pub quantity: u64,
    pub price: Price,
    pub direction: Direction,
    pub account_id: String,
    pub order_type: OrderType,
    pub scheduled_time: NaiveTime,
    /// Index of the request level this draft came from.
    pub level_index: usize,
}

// ============================================================================
// Order
// ============================================================================

/// Scheduled order tracked from creation until a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub instrument_id: InstrumentId,
    /// Whole lots.
    pub quantity: u64,
    pub price: Price,
    pub direction: Direction,
    pub account_id: String,
    pub order_type: OrderType,
    /// Time of day at which the order becomes due.
    pub scheduled_time: NaiveTime,
    pub status: OrderStatus,
    /// Set only after a successful submission.
    #[serde(default)]
    pub broker_order_id: Option<String>,
    /// Set on submission failure.
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a `Pending` order from a draft.
    #[must_use]
    pub fn from_draft(draft: OrderDraft, now: DateTime<Utc>) -> Self {
        Self {
            order_id: draft.order_id,
            instrument_id: draft.instrument_id,
            quantity: draft.quantity,
            price: draft.price,
            direction: draft.direction,
            account_id: draft.account_id,
            order_type: draft.order_type,
            scheduled_time: draft.scheduled_time,
            status: OrderStatus::Pending,
            broker_order_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the reason this order cannot be sent to the broker, if any.
    #[must_use]
    pub fn dispatch_blocker(&self) -> Option<&'static str> {
        if self.quantity == 0 {
            Some("quantity must be positive")
        } else if self.price.is_zero() {
            Some("price must be non-zero")
        } else if !self.direction.is_specified() {
            Some("direction is unspecified")
        } else if self.order_type == OrderType::Unspecified {
            Some("order type is unspecified")
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_dispatch_eligible(&self) -> bool {
        self.dispatch_blocker().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_draft() -> OrderDraft {
        OrderDraft {
            order_id: OrderId::from("tr-1"),
            instrument_id: InstrumentId::from("BBG004730N88"),
            quantity: 3,
            price: Price::new(dec!(49.5)),
            direction: Direction::Buy,
            account_id: "acc-1".to_string(),
            order_type: OrderType::Limit,
            scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            level_index: 0,
        }
    }

    #[test]
    fn test_order_from_draft_is_pending() {
        let now = Utc::now();
        let order = Order::from_draft(sample_draft(), now);

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.quantity, 3);
        assert!(order.broker_order_id.is_none());
        assert!(order.error_message.is_none());
        assert_eq!(order.created_at, now);
        assert!(order.is_dispatch_eligible());
    }

    #[test]
    fn test_dispatch_blockers() {
        let now = Utc::now();

        let mut order = Order::from_draft(sample_draft(), now);
        order.quantity = 0;
        assert_eq!(order.dispatch_blocker(), Some("quantity must be positive"));

        let mut order = Order::from_draft(sample_draft(), now);
        order.price = Price::ZERO;
        assert_eq!(order.dispatch_blocker(), Some("price must be non-zero"));

        let mut order = Order::from_draft(sample_draft(), now);
        order.direction = Direction::Unspecified;
        assert!(!order.is_dispatch_eligible());
    }

    #[test]
    fn test_level_serde_tagged() {
        let level: Level = serde_json::from_str(r#"{"mode":"percent","value":"1.5"}"#).unwrap();
        assert_eq!(level, Level::Percent { value: dec!(1.5) });

        let level: Level = serde_json::from_str(r#"{"mode":"limit","bound":"upper"}"#).unwrap();
        assert_eq!(level, Level::Limit { bound: LimitBound::Upper });
    }
}
