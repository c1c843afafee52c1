//! Generation request and its validation.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tranche_core::{InstrumentId, Level, OrderType, PriceType, TradeDirection};

use crate::error::{ValidationError, ValidationResult};

/// Maximum number of price levels per request.
pub const MAX_LEVELS: usize = 3;

fn default_id_prefix() -> String {
    "tr".to_string()
}

/// Trading instruction to turn into scheduled orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub instruments: Vec<InstrumentId>,
    /// Total monetary amount per instrument, split evenly across levels.
    pub amount: Decimal,
    pub direction: TradeDirection,
    pub levels: Vec<Level>,
    /// Venue time of day at which the orders become due.
    pub scheduled_time: NaiveTime,
    /// Empty falls back to the configured default account.
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub order_type: OrderType,
    /// Reference price for percentage levels.
    #[serde(default)]
    pub price_type: PriceType,
    /// Prefix of generated order ids.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,
}

impl GenerationRequest {
    /// Check the request before any pricing work starts.
    pub fn validate(&self) -> ValidationResult<()> {
        if self.instruments.is_empty() {
            return Err(ValidationError::NoInstruments);
        }
        if let Some(pos) = self.instruments.iter().position(InstrumentId::is_blank) {
            return Err(ValidationError::BlankInstrument(pos));
        }
        if self.amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(self.amount.to_string()));
        }
        if self.levels.is_empty() || self.levels.len() > MAX_LEVELS {
            return Err(ValidationError::LevelCount {
                got: self.levels.len(),
                max: MAX_LEVELS,
            });
        }
        for (index, level) in self.levels.iter().enumerate() {
            validate_level(index, level)?;
        }
        if self.account_id.trim().is_empty() {
            return Err(ValidationError::MissingAccount);
        }
        if self.order_type == OrderType::Unspecified {
            return Err(ValidationError::UnspecifiedOrderType);
        }
        Ok(())
    }

    /// Amount allotted to each level. Skipped levels still take their share.
    #[must_use]
    pub fn per_level_amount(&self) -> Decimal {
        if self.levels.is_empty() {
            return Decimal::ZERO;
        }
        self.amount / Decimal::from(self.levels.len())
    }
}

fn validate_level(index: usize, level: &Level) -> ValidationResult<()> {
    match level {
        Level::Percent { value } => {
            if *value <= Decimal::ZERO || *value >= Decimal::ONE_HUNDRED {
                return Err(ValidationError::InvalidLevel {
                    index,
                    reason: format!("percent {value} outside (0, 100)"),
                });
            }
        }
        Level::Absolute { price } => {
            if !price.is_positive() {
                return Err(ValidationError::InvalidLevel {
                    index,
                    reason: format!("absolute price {price} must be positive"),
                });
            }
        }
        Level::Limit { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tranche_core::{LimitBound, Price};

    fn request() -> GenerationRequest {
        GenerationRequest {
            instruments: vec![InstrumentId::from("A")],
            amount: dec!(300),
            direction: TradeDirection::Buy,
            levels: vec![Level::Percent { value: dec!(1) }],
            scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            account_id: "acc-1".to_string(),
            order_type: OrderType::Limit,
            price_type: PriceType::Close,
            id_prefix: default_id_prefix(),
        }
    }

    #[test]
    fn test_valid_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_and_blank_instruments() {
        let mut req = request();
        req.instruments.clear();
        assert_eq!(req.validate(), Err(ValidationError::NoInstruments));

        let mut req = request();
        req.instruments.push(InstrumentId::from("  "));
        assert_eq!(req.validate(), Err(ValidationError::BlankInstrument(1)));
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let mut req = request();
        req.amount = Decimal::ZERO;
        assert!(matches!(
            req.validate(),
            Err(ValidationError::NonPositiveAmount(_))
        ));
    }

    #[test]
    fn test_level_count_bounds() {
        let mut req = request();
        req.levels.clear();
        assert!(matches!(req.validate(), Err(ValidationError::LevelCount { got: 0, .. })));

        let mut req = request();
        req.levels = vec![Level::Limit { bound: LimitBound::Lower }; 4];
        assert!(matches!(req.validate(), Err(ValidationError::LevelCount { got: 4, .. })));
    }

    #[test]
    fn test_level_values() {
        let mut req = request();
        req.levels = vec![Level::Percent { value: dec!(100) }];
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidLevel { index: 0, .. })
        ));

        let mut req = request();
        req.levels = vec![
            Level::Percent { value: dec!(0.5) },
            Level::Absolute { price: Price::ZERO },
        ];
        assert!(matches!(
            req.validate(),
            Err(ValidationError::InvalidLevel { index: 1, .. })
        ));
    }

    #[test]
    fn test_account_and_order_type_required() {
        let mut req = request();
        req.account_id = String::new();
        assert_eq!(req.validate(), Err(ValidationError::MissingAccount));

        let mut req = request();
        req.order_type = OrderType::Unspecified;
        assert_eq!(req.validate(), Err(ValidationError::UnspecifiedOrderType));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "instruments": ["BBG004730N88"],
            "amount": "100000",
            "direction": "both",
            "levels": [{"mode": "limit", "bound": "lower"}],
            "scheduled_time": "10:00:00",
            "account_id": "acc-1"
        }"#;
        let req: GenerationRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.order_type, OrderType::Limit);
        assert_eq!(req.price_type, PriceType::Close);
        assert_eq!(req.id_prefix, "tr");
        assert_eq!(req.per_level_amount(), dec!(100000));
    }
}
