//! Instrument reference data cache.
//!
//! Caches instrument specs, reference prices and session limits.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use tranche_core::{InstrumentId, InstrumentSpec, Price, PriceLimits, PriceType};

use crate::error::{RegistryError, RegistryResult};
use crate::provider::InstrumentProvider;

/// Static reference data for one instrument, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSeed {
    pub id: InstrumentId,
    #[serde(default)]
    pub name: String,
    pub tick_size: Price,
    pub lot_size: u64,
    #[serde(default)]
    pub close: Option<Price>,
    #[serde(default)]
    pub last: Option<Price>,
    #[serde(default)]
    pub open: Option<Price>,
    #[serde(default)]
    pub lower_limit: Option<Price>,
    #[serde(default)]
    pub upper_limit: Option<Price>,
}

#[derive(Debug, Default)]
struct InstrumentEntry {
    spec: Option<InstrumentSpec>,
    prices: HashMap<PriceType, Price>,
    limits: Option<PriceLimits>,
}

/// Concurrent instrument reference cache.
#[derive(Debug, Default)]
pub struct InstrumentCache {
    entries: DashMap<InstrumentId, InstrumentEntry>,
}

impl InstrumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from configuration seeds.
    pub fn from_seeds(seeds: &[InstrumentSeed]) -> RegistryResult<Self> {
        let cache = Self::new();
        for seed in seeds {
            cache.seed(seed)?;
        }
        Ok(cache)
    }

    /// Load one configuration seed, replacing any previous data.
    pub fn seed(&self, seed: &InstrumentSeed) -> RegistryResult<()> {
        if seed.id.is_blank() {
            return Err(RegistryError::InvalidData("blank instrument id".to_string()));
        }
        if !seed.tick_size.is_positive() || seed.lot_size == 0 {
            return Err(RegistryError::InvalidData(format!(
                "{}: tick_size and lot_size must be positive",
                seed.id
            )));
        }

        let spec = InstrumentSpec {
            tick_size: seed.tick_size,
            lot_size: seed.lot_size,
            name: seed.name.clone(),
        };
        self.replace_spec(seed.id.clone(), spec);

        for (price_type, price) in [
            (PriceType::Close, seed.close),
            (PriceType::Last, seed.last),
            (PriceType::Open, seed.open),
        ] {
            if let Some(price) = price {
                self.set_reference_price(seed.id.clone(), price_type, price);
            }
        }

        if let (Some(lower), Some(upper)) = (seed.lower_limit, seed.upper_limit) {
            let limits = PriceLimits::new(lower, upper)
                .map_err(|e| RegistryError::InvalidData(format!("{}: {e}", seed.id)))?;
            self.set_limits(seed.id.clone(), limits);
        }

        Ok(())
    }

    /// Known instrument ids.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Set spec, replacing any previous one.
    pub fn replace_spec(&self, instrument: InstrumentId, spec: InstrumentSpec) {
        let mut entry = self.entries.entry(instrument).or_default();
        entry.spec = Some(spec);
    }

    pub fn set_reference_price(&self, instrument: InstrumentId, price_type: PriceType, price: Price) {
        let mut entry = self.entries.entry(instrument).or_default();
        entry.prices.insert(price_type, price);
    }

    pub fn set_limits(&self, instrument: InstrumentId, limits: PriceLimits) {
        debug!(
            instrument = %instrument,
            lower = %limits.lower,
            upper = %limits.upper,
            "Session limits updated"
        );
        let mut entry = self.entries.entry(instrument).or_default();
        entry.limits = Some(limits);
    }
}

impl InstrumentProvider for InstrumentCache {
    fn reference_price(&self, instrument: &InstrumentId, price_type: PriceType) -> Option<Price> {
        self.entries
            .get(instrument)
            .and_then(|e| e.prices.get(&price_type).copied())
    }

    fn session_limits(&self, instrument: &InstrumentId) -> Option<PriceLimits> {
        self.entries.get(instrument).and_then(|e| e.limits)
    }

    fn lot_size(&self, instrument: &InstrumentId) -> Option<u64> {
        self.entries
            .get(instrument)
            .and_then(|e| e.spec.as_ref().map(|s| s.lot_size))
    }

    fn tick_size(&self, instrument: &InstrumentId) -> Option<Price> {
        self.entries
            .get(instrument)
            .and_then(|e| e.spec.as_ref().map(|s| s.tick_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn seed(id: &str) -> InstrumentSeed {
        InstrumentSeed {
            id: InstrumentId::from(id),
            name: "SBER".to_string(),
            tick_size: Price::new(dec!(0.01)),
            lot_size: 10,
            close: Some(Price::new(dec!(250))),
            last: None,
            open: None,
            lower_limit: Some(Price::new(dec!(225))),
            upper_limit: Some(Price::new(dec!(275))),
        }
    }

    #[test]
    fn test_seed_populates_provider() {
        let cache = InstrumentCache::from_seeds(&[seed("A")]).unwrap();
        let id = InstrumentId::from("A");

        assert_eq!(cache.tick_size(&id), Some(Price::new(dec!(0.01))));
        assert_eq!(cache.lot_size(&id), Some(10));
        assert_eq!(
            cache.reference_price(&id, PriceType::Close),
            Some(Price::new(dec!(250)))
        );
        assert_eq!(cache.reference_price(&id, PriceType::Last), None);
        assert_eq!(cache.session_limits(&id).unwrap().upper.inner(), dec!(275));
    }

    #[test]
    fn test_unknown_instrument_misses() {
        let cache = InstrumentCache::new();
        let id = InstrumentId::from("missing");
        assert!(cache.tick_size(&id).is_none());
        assert!(cache.lot_size(&id).is_none());
        assert!(cache.session_limits(&id).is_none());
    }

    #[test]
    fn test_seed_rejects_bad_data() {
        let mut bad = seed("A");
        bad.lot_size = 0;
        assert!(InstrumentCache::new().seed(&bad).is_err());

        let mut inverted = seed("B");
        inverted.lower_limit = Some(Price::new(dec!(300)));
        assert!(InstrumentCache::new().seed(&inverted).is_err());
    }
}
