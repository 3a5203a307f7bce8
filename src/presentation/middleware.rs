//! HTTP middleware implementing the request cycle:
//! admit → forward → meter → log
//!
//! Only paths under the configured protected prefix go through
//! admission; everything else is passed straight to the host's
//! handlers. Accounting for admitted requests is protected by a drop
//! guard so that a request cancelled mid-flight still lands in
//! metering and the usage log as an error outcome.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use uuid::Uuid;

use crate::application::{AdmissionController, AdmissionDecision, CallerContext};
use crate::application::{UsageLogWriter, UsageMetering};
use crate::config::GatewayConfig;
use crate::domain::entities::{UsageLogEntry, UsageObservation};
use crate::domain::errors::RejectReason;
use crate::presentation::models::ErrorResponse;

/// Header that skips admission and all accounting when the stress-test
/// bypass is enabled in configuration
const STRESS_TEST_HEADER: &str = "x-stress-test";

/// Conventional status recorded for requests cancelled by the client
/// before a response was produced
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Shared state for the admission middleware
pub struct GatewayState {
    pub admission: Arc<AdmissionController>,
    pub metering: Arc<UsageMetering>,
    pub usage_log: Arc<UsageLogWriter>,
    pub config: GatewayConfig,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("protected_prefix", &self.config.protected_prefix)
            .field("fail_open", &self.config.fail_open)
            .finish()
    }
}

/// Admission middleware: the full request cycle for protected paths
pub async fn admission_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    // Only the protected namespace is admission-controlled
    if !path.starts_with(&state.config.protected_prefix) {
        return next.run(request).await;
    }

    // Stress-test bypass: no limits, no counters, no durable rows, so
    // load tests do not pollute production accounting
    if state.config.allow_stress_bypass && has_stress_bypass(&request) {
        return next.run(request).await;
    }

    let credential = request
        .headers()
        .get(state.config.credential_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let started = Instant::now();

    let context = match state.admission.check(credential.as_deref()).await {
        AdmissionDecision::Admitted(context) => context,
        AdmissionDecision::Rejected { reason, .. } => {
            return reject_response(&reason, state.config.rate_limit_window_seconds);
        }
    };

    let method = request.method().to_string();
    let mut guard = AccountingGuard::new(PendingAccounting {
        state: Arc::clone(&state),
        context,
        method,
        path,
        started,
    });

    let response = next.run(request).await;

    if let Some(pending) = guard.take() {
        pending.record(response.status().as_u16()).await;
    }

    response
}

fn has_stress_bypass(request: &Request) -> bool {
    request
        .headers()
        .get(STRESS_TEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Map a rejection to its HTTP response. Store outages keep the
/// externally observable 429 but are logged with their real cause.
fn reject_response(reason: &RejectReason, window_secs: u64) -> Response {
    let (status, message) = match reason {
        RejectReason::MissingCredential => (StatusCode::UNAUTHORIZED, "API key missing"),
        RejectReason::InvalidCredential => (StatusCode::UNAUTHORIZED, "Invalid API key"),
        RejectReason::EndpointDisabled => (StatusCode::FORBIDDEN, "Endpoint is disabled"),
        RejectReason::RateLimited { .. } | RejectReason::StoreUnavailable => {
            (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")
        }
    };

    let retry_after = match reason {
        RejectReason::RateLimited { retry_after_secs } => Some(*retry_after_secs),
        // Same window as a genuine throttle: retry once it has rolled
        RejectReason::StoreUnavailable => Some(window_secs),
        _ => None,
    };

    if matches!(reason, RejectReason::StoreUnavailable) {
        tracing::warn!(
            cause = "counter_store_unavailable",
            "Request rejected by fail-closed policy"
        );
    }

    let mut response = (
        status,
        Json(ErrorResponse {
            code: reason.code().to_string(),
            message: message.to_string(),
            details: retry_after.map(|secs| serde_json::json!({ "retry_after": secs })),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }),
    )
        .into_response();

    if let Some(secs) = retry_after {
        if let Ok(val) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert("retry-after", val);
        }
    }

    response
}

/// Accounting work owed for one admitted request
struct PendingAccounting {
    state: Arc<GatewayState>,
    context: CallerContext,
    method: String,
    path: String,
    started: Instant,
}

impl PendingAccounting {
    /// Meter and log the outcome. Durable failures never propagate to
    /// the response.
    async fn record(self, status_code: u16) {
        let latency_ms = self.started.elapsed().as_millis() as u64;

        let obs = UsageObservation {
            endpoint_id: self.context.endpoint_id,
            credential_id: self.context.credential_id,
            status_code,
            latency_ms,
            rate_limited: false,
        };
        if let Err(e) = self.state.metering.record(&obs).await {
            tracing::warn!(
                credential_id = %self.context.credential_id,
                "Failed to meter request (non-fatal): {}",
                e
            );
        }

        self.state
            .usage_log
            .append(UsageLogEntry {
                endpoint_id: self.context.endpoint_id,
                credential_id: self.context.credential_id,
                user_id: self.context.user_id,
                path: self.path,
                method: self.method,
                status_code,
                latency_ms,
                occurred_at: Utc::now(),
            })
            .await;
    }
}

/// Ensures admitted requests are accounted even when the request future
/// is dropped (client timeout or disconnect after admission). The
/// happy path takes the accounting out and awaits it inline; the drop
/// path spawns it with an error status.
struct AccountingGuard {
    pending: Option<PendingAccounting>,
}

impl AccountingGuard {
    fn new(pending: PendingAccounting) -> Self {
        Self {
            pending: Some(pending),
        }
    }

    fn take(&mut self) -> Option<PendingAccounting> {
        self.pending.take()
    }
}

impl Drop for AccountingGuard {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            tracing::debug!(
                credential_id = %pending.context.credential_id,
                "Request cancelled after admission, recording as error"
            );
            tokio::spawn(async move {
                pending.record(CLIENT_CLOSED_REQUEST).await;
            });
        }
    }
}
