//! Data layer
//!
//! Domain models plus the SQLite-backed key-value store that holds
//! per-user fetch state and the append-only bookmark cache.

mod models;
mod store;

pub use models::*;
pub use store::Store;
