//! Reference data provider trait.

use tranche_core::{InstrumentId, Price, PriceLimits, PriceType};

/// Read-only view of instrument reference data.
///
/// Every lookup may miss; the generator treats a miss as a reason to skip
/// the affected level or instrument, never as an error.
pub trait InstrumentProvider: Send + Sync {
    /// Reference price of the given type (e.g. previous close).
    fn reference_price(&self, instrument: &InstrumentId, price_type: PriceType) -> Option<Price>;

    /// Current session price band.
    fn session_limits(&self, instrument: &InstrumentId) -> Option<PriceLimits>;

    /// Units per lot.
    fn lot_size(&self, instrument: &InstrumentId) -> Option<u64>;

    /// Minimum price increment.
    fn tick_size(&self, instrument: &InstrumentId) -> Option<Price>;
}
