//! Order identifiers, directions, types and the status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Order direction as understood by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Buy,
    Sell,
    #[default]
    Unspecified,
}

impl Direction {
    /// Returns true for BUY and SELL.
    #[must_use]
    pub fn is_specified(&self) -> bool {
        !matches!(self, Self::Unspecified)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Direction of a generation request. `Both` places one order on each side
/// of every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    Buy,
    Sell,
    Both,
}

impl TradeDirection {
    /// Order directions this request expands into.
    #[must_use]
    pub fn sides(&self) -> &'static [Direction] {
        match self {
            Self::Buy => &[Direction::Buy],
            Self::Sell => &[Direction::Sell],
            Self::Both => &[Direction::Buy, Direction::Sell],
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Limit order.
    #[default]
    Limit,
    /// Market order.
    Market,
    Unspecified,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Market => write!(f, "market"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Lifecycle state of a scheduled order.
///
/// ```text
///   Pending ──> Sent ──> Executed
///      │  \       ├────> Rejected
///      │   \      └────> Cancelled
///      │    └──> Error ──> Sent (operator resend)
///      └──────────────┴──> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created, waiting for its scheduled time.
    #[default]
    Pending,
    /// Accepted by the broker.
    Sent,
    /// Submission failed.
    Error,
    /// Filled at the broker.
    Executed,
    /// Rejected by the broker after acceptance.
    Rejected,
    /// Cancelled by an operator or the broker.
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending,
        Self::Sent,
        Self::Error,
        Self::Executed,
        Self::Rejected,
        Self::Cancelled,
    ];

    /// Returns true if no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected | Self::Cancelled)
    }

    /// Returns true if the order may be (re)submitted to the broker.
    #[must_use]
    pub fn is_sendable(&self) -> bool {
        matches!(self, Self::Pending | Self::Error)
    }

    /// States reachable from this state.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Sent, Error, Cancelled],
            Error => &[Sent, Error, Cancelled],
            Sent => &[Executed, Rejected, Cancelled],
            Executed | Rejected | Cancelled => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Validate a transition, returning the target state.
    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Stable lowercase label, used for metrics and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Error => "error",
            Self::Executed => "executed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order identifier, also the broker idempotency key.
///
/// Every submission of the same order carries the same id, so a retried
/// request can never create a second order at the broker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new unique order id.
    ///
    /// Format: `{prefix}-{uuid_v4}`
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Executed.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());

        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Sent.is_terminal());
        assert!(!OrderStatus::Error.is_terminal());
    }

    #[test]
    fn test_terminal_states_have_no_transitions() {
        for status in OrderStatus::ALL {
            if status.is_terminal() {
                assert!(status.valid_transitions().is_empty(), "{status}");
            }
        }
    }

    #[test]
    fn test_dispatch_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Sent));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Error));
        assert!(OrderStatus::Error.can_transition_to(OrderStatus::Sent));
        assert!(OrderStatus::Sent.can_transition_to(OrderStatus::Executed));

        assert!(!OrderStatus::Sent.can_transition_to(OrderStatus::Sent));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Executed));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Sent));
    }

    #[test]
    fn test_transition_error_names_states() {
        let err = OrderStatus::Executed
            .transition(OrderStatus::Pending)
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid status transition: executed -> pending");
    }

    #[test]
    fn test_sendable_states() {
        assert!(OrderStatus::Pending.is_sendable());
        assert!(OrderStatus::Error.is_sendable());
        assert!(!OrderStatus::Sent.is_sendable());
        assert!(!OrderStatus::Cancelled.is_sendable());
    }

    #[test]
    fn test_trade_direction_sides() {
        assert_eq!(TradeDirection::Buy.sides(), &[Direction::Buy]);
        assert_eq!(
            TradeDirection::Both.sides(),
            &[Direction::Buy, Direction::Sell]
        );
    }

    #[test]
    fn test_order_id_unique_and_prefixed() {
        let id1 = OrderId::generate("tr");
        let id2 = OrderId::generate("tr");
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("tr-"));
    }

    #[test]
    fn test_status_serde_screaming_case() {
        let json = serde_json::to_string(&OrderStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        let back: OrderStatus = serde_json::from_str("\"SENT\"").unwrap();
        assert_eq!(back, OrderStatus::Sent);
    }
}
