//! Concurrent in-memory store layer (spec §4.1, §4.2).

pub mod aggregate;
pub mod typed_store;

pub use aggregate::{MetricsStore, Store, Stores};
pub use typed_store::TypedStore;
