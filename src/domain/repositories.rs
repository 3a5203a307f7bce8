//! Domain interfaces for external stores
//!
//! The gateway never owns registry data; it reads through
//! [`QuotaRegistry`] and appends through [`UsageStore`]. Both seams are
//! trait objects so the request path can be exercised against in-memory
//! fakes in tests.

use async_trait::async_trait;

use super::entities::{ResolvedCredential, UsageLogEntry, UsageSummary};
use super::errors::{RegistryError, UsageStoreError};

/// Read-only lookup of credential → tier → rate rule → endpoint
#[async_trait]
pub trait QuotaRegistry: Send + Sync {
    /// Resolve a presented credential value. `Ok(None)` means unknown
    /// or disabled at the credential level.
    async fn resolve(&self, credential: &str) -> Result<Option<ResolvedCredential>, RegistryError>;
}

/// Append-only durable usage storage
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Insert one per-request audit record
    async fn insert_usage_log(&self, entry: &UsageLogEntry) -> Result<(), UsageStoreError>;

    /// Insert one per-window summary row
    async fn insert_usage_summary(&self, summary: &UsageSummary) -> Result<(), UsageStoreError>;
}
