//! Persistence: the store trait, its Postgres implementation, and an
//! in-memory variant for tests and local play.

pub mod memory;
pub mod repository;

pub use memory::MemoryStore;
pub use repository::{PgStore, Store, StoreError, StoreResult};
