//! Infrastructure layer: external store integrations

pub mod counter_store;
pub mod quota_registry;
pub mod usage_store;

pub use counter_store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
pub use quota_registry::SqlxQuotaRegistry;
pub use usage_store::SqlxUsageStore;
