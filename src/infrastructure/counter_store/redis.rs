//! Dragonfly/Redis counter store backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use super::CounterStore;
use crate::domain::errors::StoreError;

fn store_err(context: &str, e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
        StoreError::Unavailable {
            message: format!("{}: {}", context, e),
        }
    } else {
        StoreError::Protocol {
            message: format!("{}: {}", context, e),
        }
    }
}

/// Dragonfly/Redis storage backend for rate-limit and metering counters
pub struct RedisCounterStore {
    connection_manager: Arc<ConnectionManager>,
}

impl RedisCounterStore {
    /// Create a new Dragonfly/Redis backend and verify connectivity
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            warn!("Failed to create Redis client for counter store: {}", e);
            store_err("client open", e)
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            warn!("Failed to create connection manager for counter store: {}", e);
            store_err("connection manager", e)
        })?;

        let mut conn = connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(|e| {
                warn!("Failed to ping Redis for counter store: {}", e);
                store_err("ping", e)
            })?;

        debug!("Successfully connected to Dragonfly counter store");

        Ok(Self {
            connection_manager: Arc::new(connection_manager),
        })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = (*self.connection_manager).clone();

        redis::cmd("INCR")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| store_err("INCR", e))
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = (*self.connection_manager).clone();

        redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_secs)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| store_err("EXPIRE", e))?;

        Ok(())
    }

    async fn hash_increment_many(
        &self,
        key: &str,
        fields: &[(&str, i64)],
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let mut conn = (*self.connection_manager).clone();

        let mut pipe = redis::pipe();
        for (field, delta) in fields {
            pipe.cmd("HINCRBY").arg(key).arg(field).arg(delta).ignore();
        }
        pipe.cmd("EXPIRE").arg(key).arg(ttl_secs).ignore();

        pipe.query_async::<()>(&mut conn)
            .await
            .map_err(|e| store_err("HINCRBY pipeline", e))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = (*self.connection_manager).clone();

        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async::<Option<i64>>(&mut conn)
            .await
            .map_err(|e| store_err("HGET", e))
    }

    async fn hash_set(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError> {
        let mut conn = (*self.connection_manager).clone();

        redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| store_err("HSET", e))?;

        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, i64>, StoreError> {
        let mut conn = (*self.connection_manager).clone();

        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("HGETALL", e))?;

        let mut parsed = HashMap::with_capacity(raw.len());
        for (field, value) in raw {
            let value = value.parse::<i64>().map_err(|e| StoreError::Protocol {
                message: format!("non-integer hash field {}: {}", field, e),
            })?;
            parsed.insert(field, value);
        }
        Ok(parsed)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = (*self.connection_manager).clone();

        redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| store_err("DEL", e))?;

        Ok(())
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = (*self.connection_manager).clone();
        let pattern = format!("{}:*", prefix);

        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| store_err("SCAN", e))?;

            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}
