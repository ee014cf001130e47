//! Database Module
//!
//! Store traits plus their PostgreSQL and in-memory implementations.

pub mod connection;
pub mod memory;
pub mod postgres;
pub mod store;

// Re-export commonly used types
pub use connection::{DatabaseConfig, DatabasePool, Pagination};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{
    AccountStore, ResetRequestStore, SettingsStore, StoreError, StoreResult, SubscriptionStore,
};
