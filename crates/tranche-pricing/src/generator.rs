//! Order draft generation.
//!
//! Per level and side:
//! 1. Resolve the raw price (percent offset, absolute, or session limit)
//! 2. Clamp into session limits when known
//! 3. Round down to tick
//! 4. Size in whole lots from the per-level amount

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};
use tranche_core::{
    Direction, InstrumentId, Level, OrderDraft, OrderId, Price, PriceLimits, PriceType,
};
use tranche_registry::InstrumentProvider;
use tranche_telemetry::Metrics;

use crate::error::ValidationResult;
use crate::request::GenerationRequest;

/// Why a level (or a whole instrument) produced no draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingReferencePrice(PriceType),
    MissingLimits,
    MissingTickSize,
    MissingLotSize,
    NonPositivePrice,
    ZeroLots,
    /// Price or quantity arithmetic left the `Decimal` or `u64` range.
    Overflow,
}

impl SkipReason {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingReferencePrice(_) => "missing_reference_price",
            Self::MissingLimits => "missing_limits",
            Self::MissingTickSize => "missing_tick_size",
            Self::MissingLotSize => "missing_lot_size",
            Self::NonPositivePrice => "non_positive_price",
            Self::ZeroLots => "zero_lots",
            Self::Overflow => "arithmetic_overflow",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingReferencePrice(price_type) => {
                write!(f, "missing {price_type} reference price")
            }
            other => f.write_str(other.as_str()),
        }
    }
}

/// A level/side (or whole instrument) that produced no draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSkip {
    pub instrument: InstrumentId,
    /// `None` when the whole instrument was skipped.
    pub level_index: Option<usize>,
    /// `None` when every side was skipped.
    pub direction: Option<Direction>,
    pub reason: SkipReason,
}

/// Result of one generation request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    pub drafts: Vec<OrderDraft>,
    pub skips: Vec<GenerationSkip>,
}

impl GenerationReport {
    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

/// Reference data needed to price one instrument.
struct InstrumentContext {
    tick: Price,
    lot: u64,
    reference: Option<Price>,
    limits: Option<PriceLimits>,
}

/// Computes order drafts from generation requests.
///
/// Pure with respect to the store: it only reads reference data.
pub struct OrderGenerator {
    provider: Arc<dyn InstrumentProvider>,
}

impl OrderGenerator {
    pub fn new(provider: Arc<dyn InstrumentProvider>) -> Self {
        Self { provider }
    }

    /// Validate `request` and generate drafts for every instrument.
    ///
    /// Validation failures abort the request; missing reference data only
    /// produces skips.
    pub fn generate(&self, request: &GenerationRequest) -> ValidationResult<GenerationReport> {
        request.validate()?;

        let per_level = request.per_level_amount();
        let mut report = GenerationReport::default();

        for instrument in &request.instruments {
            let Some(ctx) = self.context(instrument, request.price_type, &mut report) else {
                continue;
            };

            for (level_index, level) in request.levels.iter().enumerate() {
                for &direction in request.direction.sides() {
                    match price_level(&ctx, level, direction, request.price_type, per_level) {
                        Ok((price, quantity)) => {
                            Metrics::order_generated(&direction.to_string());
                            report.drafts.push(OrderDraft {
                                order_id: OrderId::generate(&request.id_prefix),
                                instrument_id: instrument.clone(),
                                quantity,
                                price,
                                direction,
                                account_id: request.account_id.clone(),
                                order_type: request.order_type,
                                scheduled_time: request.scheduled_time,
                                level_index,
                            });
                        }
                        Err(reason) => {
                            record_skip(
                                &mut report,
                                instrument,
                                Some(level_index),
                                Some(direction),
                                reason,
                            );
                        }
                    }
                }
            }
        }

        debug!(
            drafts = report.drafts.len(),
            skips = report.skips.len(),
            "Generation complete"
        );
        Ok(report)
    }

    /// Gather tick, lot, reference price and limits for one instrument.
    ///
    /// Returns `None` (and records a skip) when tick or lot size is unknown.
    fn context(
        &self,
        instrument: &InstrumentId,
        price_type: PriceType,
        report: &mut GenerationReport,
    ) -> Option<InstrumentContext> {
        let Some(tick) = self.provider.tick_size(instrument) else {
            record_skip(report, instrument, None, None, SkipReason::MissingTickSize);
            return None;
        };
        let lot = match self.provider.lot_size(instrument) {
            Some(lot) if lot > 0 => lot,
            _ => {
                record_skip(report, instrument, None, None, SkipReason::MissingLotSize);
                return None;
            }
        };

        Some(InstrumentContext {
            tick,
            lot,
            reference: self.provider.reference_price(instrument, price_type),
            limits: self.provider.session_limits(instrument),
        })
    }
}

/// Price and lot quantity for one level and side.
fn price_level(
    ctx: &InstrumentContext,
    level: &Level,
    direction: Direction,
    price_type: PriceType,
    per_level: Decimal,
) -> Result<(Price, u64), SkipReason> {
    let raw = match level {
        Level::Percent { value } => {
            let reference = ctx
                .reference
                .ok_or(SkipReason::MissingReferencePrice(price_type))?;
            let delta = Price::new(reference.percent(*value).ok_or(SkipReason::Overflow)?);
            let shifted = match direction {
                Direction::Sell => reference.checked_add(delta),
                _ => reference.checked_sub(delta),
            };
            shifted.ok_or(SkipReason::Overflow)?
        }
        Level::Absolute { price } => *price,
        Level::Limit { bound } => ctx
            .limits
            .ok_or(SkipReason::MissingLimits)?
            .bound(*bound),
    };

    let clamped = match ctx.limits {
        Some(limits) => limits.clamp(raw),
        None => raw,
    };
    let price = clamped
        .round_to_tick(ctx.tick)
        .ok_or(SkipReason::Overflow)?
        .normalized();
    if !price.is_positive() {
        return Err(SkipReason::NonPositivePrice);
    }

    let units = price.units_for(per_level).ok_or(SkipReason::Overflow)?;
    let lots = units / ctx.lot;
    if lots == 0 {
        return Err(SkipReason::ZeroLots);
    }
    Ok((price, lots))
}

fn record_skip(
    report: &mut GenerationReport,
    instrument: &InstrumentId,
    level_index: Option<usize>,
    direction: Option<Direction>,
    reason: SkipReason,
) {
    warn!(
        instrument = %instrument,
        level = ?level_index,
        direction = ?direction,
        reason = %reason,
        "Skipping level"
    );
    Metrics::level_skipped(reason.as_str());
    report.skips.push(GenerationSkip {
        instrument: instrument.clone(),
        level_index,
        direction,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use rust_decimal_macros::dec;
    use tranche_core::{InstrumentSpec, LimitBound, OrderType, TradeDirection};
    use tranche_registry::InstrumentCache;

    fn cache_with(id: &str, close: Decimal, tick: Decimal, lot: u64) -> InstrumentCache {
        let cache = InstrumentCache::new();
        add_instrument(&cache, id, close, tick, lot);
        cache
    }

    fn add_instrument(cache: &InstrumentCache, id: &str, close: Decimal, tick: Decimal, lot: u64) {
        let id = InstrumentId::from(id);
        cache.replace_spec(
            id.clone(),
            InstrumentSpec {
                tick_size: Price::new(tick),
                lot_size: lot,
                name: String::new(),
            },
        );
        cache.set_reference_price(id, PriceType::Close, Price::new(close));
    }

    fn request(instruments: &[&str], amount: Decimal, levels: Vec<Level>) -> GenerationRequest {
        GenerationRequest {
            instruments: instruments.iter().map(|s| InstrumentId::from(*s)).collect(),
            amount,
            direction: TradeDirection::Buy,
            levels,
            scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            account_id: "acc-1".to_string(),
            order_type: OrderType::Limit,
            price_type: PriceType::Close,
            id_prefix: "tr".to_string(),
        }
    }

    fn generator(cache: InstrumentCache) -> OrderGenerator {
        OrderGenerator::new(Arc::new(cache))
    }

    #[test]
    fn test_two_instruments_two_percent_levels() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        add_instrument(&cache, "B", dec!(50), dec!(0.01), 1);
        let req = request(
            &["A", "B"],
            dec!(300),
            vec![
                Level::Percent { value: dec!(1) },
                Level::Percent { value: dec!(2) },
            ],
        );

        let report = generator(cache).generate(&req).unwrap();
        assert!(report.skips.is_empty());
        assert_eq!(report.drafts.len(), 4);

        let summary: Vec<_> = report
            .drafts
            .iter()
            .map(|d| (d.instrument_id.as_str().to_string(), d.price.inner(), d.quantity))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("A".to_string(), dec!(99), 1),
                ("A".to_string(), dec!(98), 1),
                ("B".to_string(), dec!(49.5), 3),
                ("B".to_string(), dec!(49), 3),
            ]
        );
        for draft in &report.drafts {
            assert_eq!(draft.direction, Direction::Buy);
            assert!(draft.order_id.as_str().starts_with("tr-"));
        }
    }

    #[test]
    fn test_lot_sizing() {
        let cache = cache_with("A", dec!(250), dec!(0.01), 10);
        let req = request(
            &["A"],
            dec!(100000),
            vec![Level::Absolute {
                price: Price::new(dec!(250.00)),
            }],
        );

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.drafts.len(), 1);
        assert_eq!(report.drafts[0].quantity, 40);
    }

    #[test]
    fn test_sell_goes_above_reference() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        let mut req = request(&["A"], dec!(1000), vec![Level::Percent { value: dec!(1.5) }]);
        req.direction = TradeDirection::Sell;

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.drafts[0].price.inner(), dec!(101.5));
        assert_eq!(report.drafts[0].direction, Direction::Sell);
    }

    #[test]
    fn test_both_directions_doubles_drafts() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        let mut req = request(&["A"], dec!(1000), vec![Level::Percent { value: dec!(1) }]);
        req.direction = TradeDirection::Both;

        let report = generator(cache).generate(&req).unwrap();
        let prices: Vec<_> = report
            .drafts
            .iter()
            .map(|d| (d.direction, d.price.inner()))
            .collect();
        assert_eq!(
            prices,
            vec![(Direction::Buy, dec!(99)), (Direction::Sell, dec!(101))]
        );
    }

    #[test]
    fn test_price_rounds_down_to_tick() {
        let cache = cache_with("A", dec!(100.37), dec!(0.05), 1);
        let req = request(&["A"], dec!(1000), vec![Level::Percent { value: dec!(1) }]);

        let report = generator(cache).generate(&req).unwrap();
        // 100.37 - 1.0037 = 99.3663 -> 99.35
        assert_eq!(report.drafts[0].price.inner(), dec!(99.35));
    }

    #[test]
    fn test_clamps_into_session_limits() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        let id = InstrumentId::from("A");
        cache.set_limits(
            id,
            PriceLimits::new(Price::new(dec!(95)), Price::new(dec!(105))).unwrap(),
        );
        let req = request(&["A"], dec!(1000), vec![Level::Percent { value: dec!(10) }]);

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.drafts[0].price.inner(), dec!(95));
    }

    #[test]
    fn test_limit_level_uses_session_bound() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        cache.set_limits(
            InstrumentId::from("A"),
            PriceLimits::new(Price::new(dec!(90)), Price::new(dec!(110))).unwrap(),
        );
        let req = request(
            &["A"],
            dec!(1000),
            vec![Level::Limit {
                bound: LimitBound::Upper,
            }],
        );

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.drafts[0].price.inner(), dec!(110));
        assert_eq!(report.drafts[0].quantity, 9);
    }

    #[test]
    fn test_limit_level_without_limits_is_skipped() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        let req = request(
            &["A"],
            dec!(1000),
            vec![
                Level::Limit {
                    bound: LimitBound::Lower,
                },
                Level::Percent { value: dec!(1) },
            ],
        );

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.drafts.len(), 1);
        assert_eq!(report.drafts[0].level_index, 1);
        assert_eq!(
            report.skips,
            vec![GenerationSkip {
                instrument: InstrumentId::from("A"),
                level_index: Some(0),
                direction: Some(Direction::Buy),
                reason: SkipReason::MissingLimits,
            }]
        );
    }

    #[test]
    fn test_missing_instrument_skips_and_continues() {
        let cache = cache_with("B", dec!(50), dec!(0.01), 1);
        let req = request(&["A", "B"], dec!(300), vec![Level::Percent { value: dec!(1) }]);

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.drafts.len(), 1);
        assert_eq!(report.skips.len(), 1);
        assert_eq!(report.skips[0].reason, SkipReason::MissingTickSize);
        assert_eq!(report.skips[0].level_index, None);
    }

    #[test]
    fn test_missing_reference_price() {
        let cache = InstrumentCache::new();
        cache.replace_spec(
            InstrumentId::from("A"),
            InstrumentSpec {
                tick_size: Price::new(dec!(0.01)),
                lot_size: 1,
                name: String::new(),
            },
        );
        let req = request(&["A"], dec!(300), vec![Level::Percent { value: dec!(1) }]);

        let report = generator(cache).generate(&req).unwrap();
        assert!(report.is_empty());
        assert_eq!(
            report.skips[0].reason,
            SkipReason::MissingReferencePrice(PriceType::Close)
        );
    }

    #[test]
    fn test_amount_too_small_for_one_lot() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 10);
        let req = request(&["A"], dec!(500), vec![Level::Percent { value: dec!(1) }]);

        let report = generator(cache).generate(&req).unwrap();
        assert!(report.drafts.is_empty());
        assert_eq!(report.skips[0].reason, SkipReason::ZeroLots);
    }

    #[test]
    fn test_sub_tick_price_is_non_positive() {
        let cache = cache_with("A", dec!(0.004), dec!(0.01), 1);
        let req = request(&["A"], dec!(300), vec![Level::Percent { value: dec!(1) }]);

        let report = generator(cache).generate(&req).unwrap();
        assert_eq!(report.skips[0].reason, SkipReason::NonPositivePrice);
    }

    #[test]
    fn test_huge_amount_is_skipped_as_overflow() {
        let cache = cache_with("A", dec!(0.05), dec!(0.01), 1);
        let req = request(
            &["A"],
            dec!(70000000000000000000000000000),
            vec![Level::Percent { value: dec!(1) }],
        );
        assert!(req.validate().is_ok());

        let report = generator(cache).generate(&req).unwrap();
        assert!(report.drafts.is_empty());
        assert_eq!(report.skips.len(), 1);
        assert_eq!(report.skips[0].reason, SkipReason::Overflow);
    }

    #[test]
    fn test_huge_absolute_price_is_skipped_as_overflow() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        let req = request(
            &["A"],
            dec!(300),
            vec![Level::Absolute {
                price: Price::new(dec!(70000000000000000000000000000)),
            }],
        );

        let report = generator(cache).generate(&req).unwrap();
        assert!(report.drafts.is_empty());
        assert_eq!(report.skips[0].reason, SkipReason::Overflow);
    }

    #[test]
    fn test_invalid_request_fails_fast() {
        let cache = cache_with("A", dec!(100), dec!(0.01), 1);
        let req = request(&["A"], dec!(0), vec![Level::Percent { value: dec!(1) }]);
        assert!(generator(cache).generate(&req).is_err());
    }
}
