//! SQLx implementation of the durable usage store
//!
//! Both tables are append-only from this service's perspective: one row
//! per admitted request in `usage_logs`, one row per drained window in
//! `usage_summaries`. No updates, no deletes.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entities::{UsageLogEntry, UsageSummary};
use crate::domain::errors::UsageStoreError;
use crate::domain::repositories::UsageStore;

/// SQLx implementation of the usage store
pub struct SqlxUsageStore {
    pool: Arc<PgPool>,
}

impl SqlxUsageStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageStore for SqlxUsageStore {
    #[tracing::instrument(skip_all, fields(credential_id = %entry.credential_id))]
    async fn insert_usage_log(&self, entry: &UsageLogEntry) -> Result<(), UsageStoreError> {
        sqlx::query(
            r#"
            INSERT INTO usage_logs
                (endpoint_id, credential_id, user_id, path, method,
                 status_code, latency_ms, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.endpoint_id)
        .bind(entry.credential_id)
        .bind(entry.user_id)
        .bind(&entry.path)
        .bind(&entry.method)
        .bind(entry.status_code as i32)
        .bind(entry.latency_ms as i64)
        .bind(entry.occurred_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| UsageStoreError::Database {
            message: format!("failed to insert usage log: {}", e),
        })?;

        Ok(())
    }

    #[tracing::instrument(skip_all, fields(credential_id = %summary.credential_id))]
    async fn insert_usage_summary(&self, summary: &UsageSummary) -> Result<(), UsageStoreError> {
        sqlx::query(
            r#"
            INSERT INTO usage_summaries
                (endpoint_id, credential_id, window_start, window_end,
                 request_count, success_count, error_count, rate_limited_count,
                 avg_latency_ms, max_latency_ms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(summary.endpoint_id)
        .bind(summary.credential_id)
        .bind(summary.window_start)
        .bind(summary.window_end)
        .bind(summary.request_count)
        .bind(summary.success_count)
        .bind(summary.error_count)
        .bind(summary.rate_limited_count)
        .bind(summary.avg_latency_ms)
        .bind(summary.max_latency_ms)
        .execute(&*self.pool)
        .await
        .map_err(|e| UsageStoreError::Database {
            message: format!("failed to insert usage summary: {}", e),
        })?;

        Ok(())
    }
}
