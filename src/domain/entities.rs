//! Core domain entities
//!
//! These are the read-side projections of the provisioning subsystem's
//! records (credentials, tiers, endpoints) plus the usage records this
//! gateway produces. Provisioning CRUD lives outside this service; the
//! gateway only reads the registry and appends usage rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rate ceilings attached to a quota tier.
///
/// Only `requests_per_minute` is enforced; the hour/day ceilings exist
/// in the registry schema and are carried for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub requests_per_minute: u32,
    pub requests_per_hour: Option<u32>,
    pub requests_per_day: Option<u32>,
}

/// The upstream target a credential is scoped to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub method: String,
    pub enabled: bool,
}

/// A credential resolved through the quota registry, with its tier's
/// rate rule and scoped endpoint flattened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub credential_id: Uuid,
    pub user_id: Uuid,
    pub enabled: bool,
    pub tier_name: String,
    pub limits: TierLimits,
    pub endpoint: EndpointDescriptor,
}

/// One observed request outcome, as fed into usage metering
#[derive(Debug, Clone, Copy)]
pub struct UsageObservation {
    pub endpoint_id: Uuid,
    pub credential_id: Uuid,
    pub status_code: u16,
    pub latency_ms: u64,
    pub rate_limited: bool,
}

impl UsageObservation {
    /// Success/error split follows HTTP semantics: anything below 400
    /// counts as success.
    pub fn is_success(&self) -> bool {
        self.status_code < 400
    }
}

/// Snapshot of a window counter hash as read back from the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowCounterSnapshot {
    pub requests: i64,
    pub success: i64,
    pub errors: i64,
    pub rate_limited: i64,
    pub total_latency_ms: i64,
    pub max_latency_ms: i64,
}

/// Durable per-window summary, the terminal form of a window counter.
/// Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub endpoint_id: Uuid,
    pub credential_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub request_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub rate_limited_count: i64,
    pub avg_latency_ms: i64,
    pub max_latency_ms: i64,
}

/// Durable per-request audit record. Independent lifecycle from
/// summaries; never touched by aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    pub endpoint_id: Uuid,
    pub credential_id: Uuid,
    pub user_id: Uuid,
    pub path: String,
    pub method: String,
    pub status_code: u16,
    pub latency_ms: u64,
    pub occurred_at: DateTime<Utc>,
}
