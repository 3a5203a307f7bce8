//! Presentation-layer response models

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Machine-readable error envelope returned on every rejection
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Stable reason code, e.g. `RATE_LIMITED`
    pub code: String,
    /// Human-readable detail
    pub message: String,
    /// Optional structured context (retry hints etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Health probe response body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
