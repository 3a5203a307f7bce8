//! Admission controller: the request-path state machine
//!
//! For each inbound request: resolve the credential through the quota
//! registry, enforce the endpoint enabled-flag, then enforce the
//! fixed-window per-minute ceiling with a store-native atomic
//! increment. Rejections for quota reasons are still metered so that
//! throttled traffic is visible in analytics.

use std::sync::Arc;

use uuid::Uuid;

use crate::application::metering::UsageMetering;
use crate::domain::entities::UsageObservation;
use crate::domain::errors::RejectReason;
use crate::domain::repositories::QuotaRegistry;
use crate::infrastructure::counter_store::CounterStore;

/// Caller identity established during admission, carried through the
/// request so metering and logging key on the same ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub credential_id: Uuid,
    pub user_id: Uuid,
    pub endpoint_id: Uuid,
    pub tier_name: String,
    pub requests_per_minute: u32,
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Forward the request upstream
    Admitted(CallerContext),
    /// Refuse the request. The context is present when the credential
    /// resolved before the rejection (quota rejections), absent for
    /// credential-level failures.
    Rejected {
        reason: RejectReason,
        context: Option<CallerContext>,
    },
}

impl AdmissionDecision {
    fn rejected(reason: RejectReason) -> Self {
        AdmissionDecision::Rejected {
            reason,
            context: None,
        }
    }
}

/// Admission controller configuration knobs
#[derive(Debug, Clone)]
pub struct AdmissionSettings {
    /// Key prefix for rate-limit counters
    pub rate_limit_key_prefix: String,
    /// Fixed window length in seconds
    pub window_secs: u64,
    /// When true, an unreachable counter store admits the request
    /// uncounted instead of rejecting. Fail-closed (false) is the
    /// default for a metering gateway.
    pub fail_open: bool,
}

/// The request-path admission state machine
pub struct AdmissionController {
    registry: Arc<dyn QuotaRegistry>,
    store: Arc<dyn CounterStore>,
    metering: Arc<UsageMetering>,
    settings: AdmissionSettings,
}

impl AdmissionController {
    pub fn new(
        registry: Arc<dyn QuotaRegistry>,
        store: Arc<dyn CounterStore>,
        metering: Arc<UsageMetering>,
        settings: AdmissionSettings,
    ) -> Self {
        Self {
            registry,
            store,
            metering,
            settings,
        }
    }

    /// Run the admission check for a presented credential value.
    pub async fn check(&self, credential: Option<&str>) -> AdmissionDecision {
        // Step 1: a credential must be presented at all
        let Some(credential) = credential.filter(|c| !c.is_empty()) else {
            return AdmissionDecision::rejected(RejectReason::MissingCredential);
        };

        // Step 2: resolve through the registry. A registry outage is
        // fail-closed as well: we cannot establish identity or limits,
        // and the reject keeps the distinct internal cause.
        let resolved = match self.registry.resolve(credential).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                return AdmissionDecision::rejected(RejectReason::InvalidCredential);
            }
            Err(e) => {
                tracing::error!("Quota registry unavailable during admission: {}", e);
                return AdmissionDecision::rejected(RejectReason::StoreUnavailable);
            }
        };

        if !resolved.enabled {
            return AdmissionDecision::rejected(RejectReason::InvalidCredential);
        }

        // Step 3: endpoint kill-switch wins over any quota state
        if !resolved.endpoint.enabled {
            return AdmissionDecision::rejected(RejectReason::EndpointDisabled);
        }

        let context = CallerContext {
            credential_id: resolved.credential_id,
            user_id: resolved.user_id,
            endpoint_id: resolved.endpoint.id,
            tier_name: resolved.tier_name,
            requests_per_minute: resolved.limits.requests_per_minute,
        };

        // Step 4: atomic increment on the credential's window counter.
        // The rate-limit counter is keyed by credential only, not by
        // endpoint, and self-expires.
        let rate_key = format!(
            "{}:{}",
            self.settings.rate_limit_key_prefix, context.credential_id
        );

        let count = match self.store.increment(&rate_key).await {
            Ok(count) => count,
            Err(e) => {
                if self.settings.fail_open {
                    tracing::warn!(
                        credential_id = %context.credential_id,
                        "Counter store unavailable, fail-open policy admits uncounted: {}",
                        e
                    );
                    return AdmissionDecision::Admitted(context);
                }
                tracing::error!(
                    credential_id = %context.credential_id,
                    "Counter store unavailable, fail-closed policy rejects: {}",
                    e
                );
                // Externally a 429; internally distinct from quota
                // exhaustion. No metering increment: the same store
                // holds the metering counters.
                return AdmissionDecision::Rejected {
                    reason: RejectReason::StoreUnavailable,
                    context: Some(context),
                };
            }
        };

        if count == 1 {
            // Window-open race: two concurrent first requests can both
            // observe 1 and both set the TTL. The set is idempotent, so
            // this is benign and intentionally left unguarded.
            if let Err(e) = self.store.expire(&rate_key, self.settings.window_secs).await {
                tracing::warn!(
                    credential_id = %context.credential_id,
                    "Failed to set rate-limit window TTL: {}",
                    e
                );
            }
        }

        // Step 5: ceiling check on the post-increment value
        if count > context.requests_per_minute as i64 {
            // Step 6: throttled requests must still show up in
            // analytics; metering failure does not change the verdict.
            let obs = UsageObservation {
                endpoint_id: context.endpoint_id,
                credential_id: context.credential_id,
                status_code: 429,
                latency_ms: 0,
                rate_limited: true,
            };
            if let Err(e) = self.metering.record(&obs).await {
                tracing::warn!(
                    credential_id = %context.credential_id,
                    "Failed to meter rate-limited request: {}",
                    e
                );
            }

            tracing::debug!(
                credential_id = %context.credential_id,
                tier = %context.tier_name,
                count,
                limit = context.requests_per_minute,
                "Request rate limited"
            );

            return AdmissionDecision::Rejected {
                reason: RejectReason::RateLimited {
                    retry_after_secs: self.settings.window_secs,
                },
                context: Some(context),
            };
        }

        AdmissionDecision::Admitted(context)
    }
}
