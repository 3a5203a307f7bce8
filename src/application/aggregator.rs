//! Window counter aggregation
//!
//! Periodically drains elapsed window counters from the ephemeral store
//! into durable usage summaries. Only windows whose end lies in the
//! past are touched, so no live metering writer can race the
//! read-then-delete. Keys are deleted only after the durable insert
//! succeeded; a failed insert leaves the key for the next cycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::application::metering::fields;
use crate::domain::entities::{UsageSummary, WindowCounterSnapshot};
use crate::domain::errors::StoreError;
use crate::domain::repositories::UsageStore;
use crate::domain::window::{self, MinuteWindow};
use crate::infrastructure::counter_store::CounterStore;

/// Outcome of one aggregation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationReport {
    /// Keys seen under the metering prefix
    pub scanned: usize,
    /// Keys folded into summaries and deleted
    pub aggregated: usize,
    /// Keys left alone because their window has not elapsed yet
    pub skipped_live: usize,
    /// Keys skipped because they did not parse as counter keys
    pub skipped_malformed: usize,
    /// Keys that hit an error and will be retried next cycle
    pub failed: usize,
}

/// Batch job folding elapsed window counters into durable summaries
pub struct Aggregator {
    store: Arc<dyn CounterStore>,
    usage: Arc<dyn UsageStore>,
    key_prefix: String,
    in_flight: AtomicBool,
}

impl Aggregator {
    pub fn new(
        store: Arc<dyn CounterStore>,
        usage: Arc<dyn UsageStore>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            usage,
            key_prefix: key_prefix.into(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one aggregation pass against the current wall clock.
    ///
    /// Returns `Ok(None)` when another pass is still in flight;
    /// overlapping drains of the same key set would double-aggregate.
    pub async fn run_once(&self) -> Result<Option<AggregationReport>, StoreError> {
        self.run_at(Utc::now()).await
    }

    /// Run one pass with an explicit "now", so tests can treat every
    /// window as elapsed without sleeping.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<Option<AggregationReport>, StoreError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("Skipping aggregation pass - previous pass still running");
            return Ok(None);
        }
        let result = self.drain(now).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    async fn drain(&self, now: DateTime<Utc>) -> Result<AggregationReport, StoreError> {
        let keys = self.store.scan_keys(&self.key_prefix).await?;

        let mut report = AggregationReport {
            scanned: keys.len(),
            ..Default::default()
        };

        for key in keys {
            let Some((endpoint_id, credential_id, win)) =
                window::parse_counter_key(&self.key_prefix, &key)
            else {
                tracing::warn!(key = %key, "Skipping malformed counter key");
                report.skipped_malformed += 1;
                continue;
            };

            // Live windows still have writers; leave them for later
            if !win.has_elapsed(now) {
                report.skipped_live += 1;
                continue;
            }

            match self.drain_key(&key, endpoint_id, credential_id, win).await {
                Ok(true) => report.aggregated += 1,
                Ok(false) => {}
                Err(e) => {
                    // One bad key never aborts the batch; the key was
                    // not deleted and is retried next cycle.
                    tracing::warn!(key = %key, "Failed to aggregate counter, will retry: {}", e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            aggregated = report.aggregated,
            skipped_live = report.skipped_live,
            failed = report.failed,
            "Aggregation pass complete"
        );

        Ok(report)
    }

    /// Drain a single counter key. Returns `Ok(false)` when the key
    /// vanished between scan and read (already expired or drained).
    async fn drain_key(
        &self,
        key: &str,
        endpoint_id: uuid::Uuid,
        credential_id: uuid::Uuid,
        win: MinuteWindow,
    ) -> Result<bool, DrainError> {
        let data = self.store.hash_get_all(key).await.map_err(DrainError::Store)?;
        if data.is_empty() {
            return Ok(false);
        }

        let snapshot = snapshot_from(&data);
        let summary = summarize(endpoint_id, credential_id, win, &snapshot);

        self.usage
            .insert_usage_summary(&summary)
            .await
            .map_err(DrainError::Durable)?;

        // Delete strictly after the durable write. A failure here means
        // the key is drained again next cycle; readers deduplicate
        // summaries by (endpoint, credential, window) if that happens.
        self.store.delete(key).await.map_err(DrainError::Store)?;

        Ok(true)
    }

    /// Spawn the periodic aggregation worker. A single task; overlap
    /// with itself is additionally prevented by the in-flight guard.
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip the immediate first tick; counters need a window to fill
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.run_once().await {
                            Ok(Some(report)) if report.failed > 0 => {
                                tracing::warn!(failed = report.failed, "Aggregation pass had failures");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!("Aggregation pass failed (non-fatal): {}", e);
                            }
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Aggregation worker shutting down gracefully");
                        return;
                    }
                }
            }
        });
    }
}

#[derive(Debug, thiserror::Error)]
enum DrainError {
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Durable(crate::domain::errors::UsageStoreError),
}

fn snapshot_from(data: &std::collections::HashMap<String, i64>) -> WindowCounterSnapshot {
    let get = |field: &str| data.get(field).copied().unwrap_or(0);
    WindowCounterSnapshot {
        requests: get(fields::REQUESTS),
        success: get(fields::SUCCESS),
        errors: get(fields::ERRORS),
        rate_limited: get(fields::RATE_LIMITED),
        total_latency_ms: get(fields::TOTAL_LATENCY_MS),
        max_latency_ms: get(fields::MAX_LATENCY_MS),
    }
}

fn summarize(
    endpoint_id: uuid::Uuid,
    credential_id: uuid::Uuid,
    win: MinuteWindow,
    snapshot: &WindowCounterSnapshot,
) -> UsageSummary {
    // requests can be zero when the hash was created by a lone
    // max-latency write; never divide by it
    let avg_latency_ms = if snapshot.requests > 0 {
        snapshot.total_latency_ms / snapshot.requests
    } else {
        0
    };

    UsageSummary {
        endpoint_id,
        credential_id,
        window_start: win.start(),
        window_end: win.end(),
        request_count: snapshot.requests,
        success_count: snapshot.success,
        error_count: snapshot.errors,
        rate_limited_count: snapshot.rate_limited,
        avg_latency_ms,
        max_latency_ms: snapshot.max_latency_ms,
    }
}
