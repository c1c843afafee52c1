//! Instrument reference data for order generation.
//!
//! Defines the read-only [`InstrumentProvider`] consumed by the generator
//! and [`InstrumentCache`], a concurrent in-memory implementation filled
//! from configuration and refreshed from the broker's limits query.

pub mod cache;
pub mod error;
pub mod provider;

pub use cache::{InstrumentCache, InstrumentSeed};
pub use error::{RegistryError, RegistryResult};
pub use provider::InstrumentProvider;
