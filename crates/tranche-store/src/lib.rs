//! Order persistence for tranche.
//!
//! The store is the source of truth for order status. Two implementations:
//! - `MemoryOrderStore`: concurrent in-memory map
//! - `FileOrderStore`: in-memory map mirrored to a JSON snapshot file

pub mod error;
pub mod file;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use file::FileOrderStore;
pub use memory::MemoryOrderStore;
pub use store::{DynOrderStore, OrderStore, StatusUpdate};
