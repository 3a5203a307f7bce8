//! Usage metering
//!
//! Folds every observed request outcome into the current minute's
//! window counter hash. All fields except max latency go through
//! store-native atomic increments in a single pipeline; max latency is
//! a read-compare-write and therefore best-effort under concurrency (a
//! higher concurrent value can briefly lose to a stale read). That is
//! acceptable for a diagnostic field and mirrors the rest of the
//! pipeline's guarantees nowhere stronger.

use std::sync::Arc;

use crate::domain::entities::UsageObservation;
use crate::domain::errors::StoreError;
use crate::domain::window::{self, MinuteWindow};
use crate::infrastructure::counter_store::CounterStore;

/// Hash field names within a window counter
pub mod fields {
    pub const REQUESTS: &str = "requests";
    pub const SUCCESS: &str = "success";
    pub const ERRORS: &str = "errors";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const TOTAL_LATENCY_MS: &str = "total_latency_ms";
    pub const MAX_LATENCY_MS: &str = "max_latency_ms";
}

/// Per-(endpoint, credential, minute-window) usage metering
pub struct UsageMetering {
    store: Arc<dyn CounterStore>,
    key_prefix: String,
    /// Refreshed on every update so a busy window cannot expire while
    /// still receiving traffic
    counter_ttl_secs: u64,
}

impl UsageMetering {
    pub fn new(
        store: Arc<dyn CounterStore>,
        key_prefix: impl Into<String>,
        counter_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            counter_ttl_secs,
        }
    }

    /// Fold one observation into the current minute's counter
    pub async fn record(&self, obs: &UsageObservation) -> Result<(), StoreError> {
        self.record_in_window(obs, MinuteWindow::current()).await
    }

    /// Fold one observation into an explicit window. Exposed so tests
    /// can pin the window instead of racing the wall clock.
    pub async fn record_in_window(
        &self,
        obs: &UsageObservation,
        window: MinuteWindow,
    ) -> Result<(), StoreError> {
        let key = window::counter_key(
            &self.key_prefix,
            obs.endpoint_id,
            obs.credential_id,
            window,
        );

        let mut increments: Vec<(&str, i64)> = vec![(fields::REQUESTS, 1)];
        if obs.is_success() {
            increments.push((fields::SUCCESS, 1));
        } else {
            increments.push((fields::ERRORS, 1));
        }
        if obs.rate_limited {
            increments.push((fields::RATE_LIMITED, 1));
        }
        increments.push((fields::TOTAL_LATENCY_MS, obs.latency_ms as i64));

        self.store
            .hash_increment_many(&key, &increments, self.counter_ttl_secs)
            .await?;

        // Best-effort max: read-compare-write, no atomic max primitive
        let current_max = self.store.hash_get(&key, fields::MAX_LATENCY_MS).await?;
        if current_max.map(|m| (obs.latency_ms as i64) > m).unwrap_or(true) {
            self.store
                .hash_set(&key, fields::MAX_LATENCY_MS, obs.latency_ms as i64)
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::counter_store::InMemoryCounterStore;
    use uuid::Uuid;

    fn obs(status: u16, latency: u64, rate_limited: bool) -> UsageObservation {
        UsageObservation {
            endpoint_id: Uuid::nil(),
            credential_id: Uuid::nil(),
            status_code: status,
            latency_ms: latency,
            rate_limited,
        }
    }

    #[tokio::test]
    async fn test_record_splits_success_and_errors() {
        let store = Arc::new(InMemoryCounterStore::new());
        let metering = UsageMetering::new(store.clone(), "usage", 300);
        let window = MinuteWindow::parse("202601010000").unwrap();

        metering.record_in_window(&obs(200, 10, false), window).await.unwrap();
        metering.record_in_window(&obs(201, 30, false), window).await.unwrap();
        metering.record_in_window(&obs(500, 20, false), window).await.unwrap();
        metering.record_in_window(&obs(429, 0, true), window).await.unwrap();

        let key = window::counter_key("usage", Uuid::nil(), Uuid::nil(), window);
        let all = store.hash_get_all(&key).await.unwrap();

        assert_eq!(all.get(fields::REQUESTS), Some(&4));
        assert_eq!(all.get(fields::SUCCESS), Some(&2));
        assert_eq!(all.get(fields::ERRORS), Some(&2));
        assert_eq!(all.get(fields::RATE_LIMITED), Some(&1));
        assert_eq!(all.get(fields::TOTAL_LATENCY_MS), Some(&60));
        assert_eq!(all.get(fields::MAX_LATENCY_MS), Some(&30));
    }

    #[tokio::test]
    async fn test_max_latency_keeps_high_water_mark() {
        let store = Arc::new(InMemoryCounterStore::new());
        let metering = UsageMetering::new(store.clone(), "usage", 300);
        let window = MinuteWindow::parse("202601010000").unwrap();

        metering.record_in_window(&obs(200, 80, false), window).await.unwrap();
        metering.record_in_window(&obs(200, 15, false), window).await.unwrap();

        let key = window::counter_key("usage", Uuid::nil(), Uuid::nil(), window);
        assert_eq!(
            store.hash_get(&key, fields::MAX_LATENCY_MS).await.unwrap(),
            Some(80)
        );
    }
}
