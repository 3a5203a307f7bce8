//! In-memory counter store for development and tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CounterStore;
use crate::domain::errors::StoreError;

#[derive(Clone)]
struct MemoryEntry<T: Clone> {
    value: T,
    /// Unix seconds; `None` means no expiry set yet
    expires_at: Option<u64>,
}

impl<T: Clone> MemoryEntry<T> {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map(|at| now < at).unwrap_or(true)
    }
}

/// In-memory storage backend for development and single-instance tests.
/// Counter mutations take the write lock for the whole operation, which
/// gives the same atomicity the Redis primitives provide.
pub struct InMemoryCounterStore {
    counters: Arc<RwLock<HashMap<String, MemoryEntry<i64>>>>,
    hashes: Arc<RwLock<HashMap<String, MemoryEntry<HashMap<String, i64>>>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(RwLock::new(HashMap::new())),
            hashes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn current_time() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let now = Self::current_time();
        let mut counters = self.counters.write().await;

        let entry = counters
            .entry(key.to_string())
            .and_modify(|e| {
                // An expired counter behaves as absent
                if !e.is_live(now) {
                    e.value = 0;
                    e.expires_at = None;
                }
            })
            .or_insert(MemoryEntry {
                value: 0,
                expires_at: None,
            });

        entry.value += 1;
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let now = Self::current_time();

        let mut counters = self.counters.write().await;
        if let Some(entry) = counters.get_mut(key) {
            entry.expires_at = Some(now + ttl_secs);
            return Ok(());
        }
        drop(counters);

        let mut hashes = self.hashes.write().await;
        if let Some(entry) = hashes.get_mut(key) {
            entry.expires_at = Some(now + ttl_secs);
        }
        Ok(())
    }

    async fn hash_increment_many(
        &self,
        key: &str,
        fields: &[(&str, i64)],
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let now = Self::current_time();
        let mut hashes = self.hashes.write().await;

        let entry = hashes
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    e.value.clear();
                }
            })
            .or_insert(MemoryEntry {
                value: HashMap::new(),
                expires_at: None,
            });

        for (field, delta) in fields {
            *entry.value.entry(field.to_string()).or_insert(0) += delta;
        }
        entry.expires_at = Some(now + ttl_secs);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<i64>, StoreError> {
        let now = Self::current_time();
        let hashes = self.hashes.read().await;

        Ok(hashes
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.value.get(field).copied()))
    }

    async fn hash_set(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError> {
        let now = Self::current_time();
        let mut hashes = self.hashes.write().await;

        let entry = hashes
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    e.value.clear();
                }
            })
            .or_insert(MemoryEntry {
                value: HashMap::new(),
                expires_at: None,
            });

        entry.value.insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, StoreError> {
        let now = Self::current_time();
        let hashes = self.hashes.read().await;

        Ok(hashes
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.counters.write().await.remove(key);
        self.hashes.write().await.remove(key);
        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let now = Self::current_time();
        let needle = format!("{}:", prefix);

        let mut keys = Vec::new();
        {
            let counters = self.counters.read().await;
            keys.extend(
                counters
                    .iter()
                    .filter(|(k, e)| k.starts_with(&needle) && e.is_live(now))
                    .map(|(k, _)| k.clone()),
            );
        }
        {
            let hashes = self.hashes.read().await;
            keys.extend(
                hashes
                    .iter()
                    .filter(|(k, e)| k.starts_with(&needle) && e.is_live(now))
                    .map(|(k, _)| k.clone()),
            );
        }
        Ok(keys)
    }
}
