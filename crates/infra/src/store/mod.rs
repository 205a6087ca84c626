//! Transactional storage boundary.
//!
//! Workflows talk to [`InventoryStore`] / [`StoreTransaction`] only; the
//! in-memory and Postgres adapters provide the same row-locking semantics.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{DEFAULT_LOCK_TIMEOUT, InMemoryStore};
pub use postgres::PostgresStore;
pub use r#trait::{InventoryStore, StoreError, StoreTransaction};
