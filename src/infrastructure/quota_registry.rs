//! SQLx implementation of the quota registry lookup
//!
//! Read-only: provisioning (creating credentials, tiers, endpoints)
//! belongs to a separate subsystem; this gateway only resolves a
//! presented credential into its tier rule and scoped endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::entities::{EndpointDescriptor, ResolvedCredential, TierLimits};
use crate::domain::errors::RegistryError;
use crate::domain::repositories::QuotaRegistry;

/// SQLx implementation of the quota registry
pub struct SqlxQuotaRegistry {
    pool: Arc<PgPool>,
}

impl SqlxQuotaRegistry {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaRegistry for SqlxQuotaRegistry {
    #[tracing::instrument(skip_all)]
    async fn resolve(&self, credential: &str) -> Result<Option<ResolvedCredential>, RegistryError> {
        // One round trip: credential -> tier -> rate rule, plus the
        // scoped endpoint. Disabled credentials resolve to nothing;
        // disabled endpoints resolve normally so the caller can reject
        // with the dedicated reason.
        let row = sqlx::query(
            r#"
            SELECT
                k.id            AS credential_id,
                k.user_id       AS user_id,
                k.enabled       AS credential_enabled,
                t.name          AS tier_name,
                r.requests_per_minute,
                r.requests_per_hour,
                r.requests_per_day,
                e.id            AS endpoint_id,
                e.name          AS endpoint_name,
                e.address       AS endpoint_address,
                e.method        AS endpoint_method,
                e.enabled       AS endpoint_enabled
            FROM api_credentials k
            JOIN tiers t             ON t.id = k.tier_id
            JOIN rate_limit_rules r  ON r.tier_id = t.id
            JOIN monitored_endpoints e ON e.id = k.endpoint_id
            WHERE k.key_value = $1
            "#,
        )
        .bind(credential)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Database error resolving credential: {}", e);
            RegistryError::Database {
                message: format!("failed to resolve credential: {}", e),
            }
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let resolved = ResolvedCredential {
            credential_id: row.try_get("credential_id").map_err(db_err)?,
            user_id: row.try_get("user_id").map_err(db_err)?,
            enabled: row.try_get("credential_enabled").map_err(db_err)?,
            tier_name: row.try_get("tier_name").map_err(db_err)?,
            limits: TierLimits {
                requests_per_minute: row
                    .try_get::<i32, _>("requests_per_minute")
                    .map_err(db_err)? as u32,
                requests_per_hour: row
                    .try_get::<Option<i32>, _>("requests_per_hour")
                    .map_err(db_err)?
                    .map(|v| v as u32),
                requests_per_day: row
                    .try_get::<Option<i32>, _>("requests_per_day")
                    .map_err(db_err)?
                    .map(|v| v as u32),
            },
            endpoint: EndpointDescriptor {
                id: row.try_get("endpoint_id").map_err(db_err)?,
                name: row.try_get("endpoint_name").map_err(db_err)?,
                address: row.try_get("endpoint_address").map_err(db_err)?,
                method: row.try_get("endpoint_method").map_err(db_err)?,
                enabled: row.try_get("endpoint_enabled").map_err(db_err)?,
            },
        };

        Ok(Some(resolved))
    }
}

fn db_err(e: sqlx::Error) -> RegistryError {
    RegistryError::Database {
        message: format!("unexpected row shape: {}", e),
    }
}
