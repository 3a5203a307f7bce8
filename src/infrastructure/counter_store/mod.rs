//! Ephemeral counter store backends
//!
//! Holds both the fixed-window rate-limit counters and the per-minute
//! usage-metering hashes:
//! - Dragonfly/Redis for production use (counters shared across workers)
//! - In-memory for development and tests
//!
//! Every operation the request path depends on for correctness
//! (increment-and-return, TTL set, hash increments) maps to a single
//! store-native primitive; the service process never does
//! read-modify-write on these, with the one documented exception of the
//! max-latency field in usage metering.

pub mod memory;
pub mod redis;

pub use memory::InMemoryCounterStore;
pub use redis::RedisCounterStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::errors::StoreError;

/// Trait for ephemeral counter storage
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment an integer key and return the new value
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Set the TTL of a key in seconds. Idempotent; re-setting the TTL
    /// of a freshly created key is harmless.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Atomically increment several hash fields of one key, then
    /// refresh the key's TTL, as one round trip
    async fn hash_increment_many(
        &self,
        key: &str,
        fields: &[(&str, i64)],
        ttl_secs: u64,
    ) -> Result<(), StoreError>;

    /// Read a single hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<i64>, StoreError>;

    /// Overwrite a single hash field
    async fn hash_set(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError>;

    /// Read all fields of a hash; empty map when the key is absent
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, StoreError>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// List all live keys starting with the given prefix
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}
