//! Durable per-request usage logging
//!
//! One immutable row per admitted request, written after the response
//! is known. A failed insert must never affect the already-admitted
//! response, so failures are logged and swallowed here.

use std::sync::Arc;

use crate::domain::entities::UsageLogEntry;
use crate::domain::repositories::UsageStore;

/// Appends per-request audit records to the durable store
pub struct UsageLogWriter {
    store: Arc<dyn UsageStore>,
}

impl UsageLogWriter {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    /// Append one record. Fire-and-commit: errors are logged at warn
    /// and dropped.
    pub async fn append(&self, entry: UsageLogEntry) {
        if let Err(e) = self.store.insert_usage_log(&entry).await {
            tracing::warn!(
                credential_id = %entry.credential_id,
                path = %entry.path,
                "Failed to write usage log (non-fatal): {}",
                e
            );
        }
    }
}
