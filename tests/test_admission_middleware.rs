//! Tests for the admission middleware at the HTTP boundary
//!
//! These tests run real requests through the router and verify status
//! codes, rejection bodies, the retry-after header, and that admitted
//! requests land in metering and the usage log.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::StatusCode,
    routing::get,
};
use tower::ServiceExt;
use uuid::Uuid;

use quotagate::application::metering::fields;
use quotagate::application::{
    AdmissionController, AdmissionSettings, UsageLogWriter, UsageMetering,
};
use quotagate::config::GatewayConfig;
use quotagate::domain::entities::{
    EndpointDescriptor, ResolvedCredential, TierLimits, UsageLogEntry, UsageSummary,
};
use quotagate::domain::errors::{RegistryError, StoreError, UsageStoreError};
use quotagate::domain::repositories::{QuotaRegistry, UsageStore};
use quotagate::infrastructure::counter_store::{CounterStore, InMemoryCounterStore};
use quotagate::presentation::{GatewayState, build_router};

// Mock stores for testing
mod mocks {
    use super::*;
    use async_trait::async_trait;

    pub struct StaticQuotaRegistry {
        entries: HashMap<String, ResolvedCredential>,
    }

    impl StaticQuotaRegistry {
        pub fn new() -> Self {
            Self {
                entries: HashMap::new(),
            }
        }

        pub fn with_credential(mut self, key: &str, resolved: ResolvedCredential) -> Self {
            self.entries.insert(key.to_string(), resolved);
            self
        }
    }

    #[async_trait]
    impl QuotaRegistry for StaticQuotaRegistry {
        async fn resolve(
            &self,
            credential: &str,
        ) -> Result<Option<ResolvedCredential>, RegistryError> {
            Ok(self.entries.get(credential).cloned())
        }
    }

    #[derive(Default)]
    pub struct RecordingUsageStore {
        pub logs: Mutex<Vec<UsageLogEntry>>,
        pub fail_logs: AtomicBool,
    }

    #[async_trait]
    impl UsageStore for RecordingUsageStore {
        async fn insert_usage_log(&self, entry: &UsageLogEntry) -> Result<(), UsageStoreError> {
            if self.fail_logs.load(Ordering::SeqCst) {
                return Err(UsageStoreError::Database {
                    message: "insert failed".to_string(),
                });
            }
            self.logs.lock().unwrap().push(entry.clone());
            Ok(())
        }

        async fn insert_usage_summary(
            &self,
            _summary: &UsageSummary,
        ) -> Result<(), UsageStoreError> {
            Ok(())
        }
    }

    /// Counter store that is unreachable for every operation
    pub struct UnavailableCounterStore;

    fn down() -> StoreError {
        StoreError::Unavailable {
            message: "connection refused".to_string(),
        }
    }

    #[async_trait]
    impl CounterStore for UnavailableCounterStore {
        async fn increment(&self, _key: &str) -> Result<i64, StoreError> {
            Err(down())
        }

        async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<(), StoreError> {
            Err(down())
        }

        async fn hash_increment_many(
            &self,
            _key: &str,
            _fields: &[(&str, i64)],
            _ttl_secs: u64,
        ) -> Result<(), StoreError> {
            Err(down())
        }

        async fn hash_get(&self, _key: &str, _field: &str) -> Result<Option<i64>, StoreError> {
            Err(down())
        }

        async fn hash_set(&self, _key: &str, _field: &str, _value: i64) -> Result<(), StoreError> {
            Err(down())
        }

        async fn hash_get_all(
            &self,
            _key: &str,
        ) -> Result<HashMap<String, i64>, StoreError> {
            Err(down())
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(down())
        }

        async fn scan_keys(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            Err(down())
        }
    }
}

use mocks::{RecordingUsageStore, StaticQuotaRegistry, UnavailableCounterStore};

fn resolved_credential(requests_per_minute: u32) -> ResolvedCredential {
    ResolvedCredential {
        credential_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        enabled: true,
        tier_name: "standard".to_string(),
        limits: TierLimits {
            requests_per_minute,
            requests_per_hour: None,
            requests_per_day: None,
        },
        endpoint: EndpointDescriptor {
            id: Uuid::new_v4(),
            name: "billing".to_string(),
            address: "http://billing.internal".to_string(),
            method: "GET".to_string(),
            enabled: true,
        },
    }
}

struct TestGateway {
    router: Router,
    store: Arc<InMemoryCounterStore>,
    usage: Arc<RecordingUsageStore>,
}

fn build_router_with(
    registry: StaticQuotaRegistry,
    config: GatewayConfig,
    counter_store: Arc<dyn CounterStore>,
    usage: Arc<RecordingUsageStore>,
    upstream: Router,
) -> Router {
    let metering = Arc::new(UsageMetering::new(
        Arc::clone(&counter_store),
        config.metering_key_prefix.clone(),
        config.counter_ttl_seconds,
    ));
    let admission = Arc::new(AdmissionController::new(
        Arc::new(registry),
        counter_store,
        Arc::clone(&metering),
        AdmissionSettings {
            rate_limit_key_prefix: config.rate_limit_key_prefix.clone(),
            window_secs: config.rate_limit_window_seconds,
            fail_open: config.fail_open,
        },
    ));
    let usage_log = Arc::new(UsageLogWriter::new(usage));

    let state = Arc::new(GatewayState {
        admission,
        metering,
        usage_log,
        config,
    });

    build_router(state, upstream)
}

fn build_gateway(registry: StaticQuotaRegistry, config: GatewayConfig) -> TestGateway {
    let store = Arc::new(InMemoryCounterStore::new());
    let usage = Arc::new(RecordingUsageStore::default());
    let upstream = Router::new().route("/internal/widgets", get(|| async { "widgets" }));

    TestGateway {
        router: build_router_with(registry, config, store.clone(), usage.clone(), upstream),
        store,
        usage,
    }
}

fn request(path: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_bypasses_admission() {
    let gateway = build_gateway(StaticQuotaRegistry::new(), GatewayConfig::default());

    let response = gateway
        .router
        .oneshot(request("/health", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_key_returns_401() {
    let gateway = build_gateway(StaticQuotaRegistry::new(), GatewayConfig::default());

    let response = gateway
        .router
        .oneshot(request("/internal/widgets", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["code"], "MISSING_CREDENTIAL");
    assert_eq!(body["message"], "API key missing");
}

#[tokio::test]
async fn test_unknown_key_returns_401() {
    let gateway = build_gateway(StaticQuotaRegistry::new(), GatewayConfig::default());

    let response = gateway
        .router
        .oneshot(request("/internal/widgets", Some("bogus")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["code"], "INVALID_CREDENTIAL");
}

#[tokio::test]
async fn test_disabled_endpoint_returns_403() {
    let mut resolved = resolved_credential(10);
    resolved.endpoint.enabled = false;
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved);
    let gateway = build_gateway(registry, GatewayConfig::default());

    let response = gateway
        .router
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["code"], "ENDPOINT_DISABLED");
}

#[tokio::test]
async fn test_throttled_returns_429_with_retry_after() {
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved_credential(1));
    let gateway = build_gateway(registry, GatewayConfig::default());

    let response = gateway
        .router
        .clone()
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = gateway
        .router
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("retry-after").unwrap().to_str().unwrap(),
        "60"
    );

    let body = body_json(response).await;
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["details"]["retry_after"], 60);
}

#[tokio::test]
async fn test_admitted_request_is_metered_and_logged() {
    let resolved = resolved_credential(10);
    let endpoint_id = resolved.endpoint.id;
    let credential_id = resolved.credential_id;
    let user_id = resolved.user_id;
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved);
    let gateway = build_gateway(registry, GatewayConfig::default());

    let response = gateway
        .router
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Accounting runs before the response is returned
    let logs = gateway.usage.logs.lock().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].endpoint_id, endpoint_id);
    assert_eq!(logs[0].credential_id, credential_id);
    assert_eq!(logs[0].user_id, user_id);
    assert_eq!(logs[0].path, "/internal/widgets");
    assert_eq!(logs[0].method, "GET");
    assert_eq!(logs[0].status_code, 200);
    drop(logs);

    let keys = gateway.store.scan_keys("usage").await.unwrap();
    assert_eq!(keys.len(), 1);
    let counters = gateway.store.hash_get_all(&keys[0]).await.unwrap();
    assert_eq!(counters.get(fields::REQUESTS), Some(&1));
    assert_eq!(counters.get(fields::SUCCESS), Some(&1));
}

#[tokio::test]
async fn test_usage_log_failure_does_not_change_response() {
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved_credential(10));
    let gateway = build_gateway(registry, GatewayConfig::default());
    gateway.usage.fail_logs.store(true, Ordering::SeqCst);

    let response = gateway
        .router
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(gateway.usage.logs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stress_bypass_skips_all_accounting() {
    let registry = StaticQuotaRegistry::new();
    let config = GatewayConfig {
        allow_stress_bypass: true,
        ..GatewayConfig::default()
    };
    let gateway = build_gateway(registry, config);

    let mut req = request("/internal/widgets", None);
    req.headers_mut()
        .insert("x-stress-test", "true".parse().unwrap());

    let response = gateway.router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(gateway.usage.logs.lock().unwrap().is_empty());
    assert!(gateway.store.scan_keys("usage").await.unwrap().is_empty());
    assert!(gateway.store.scan_keys("rate_limit").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_after_follows_configured_window() {
    let config = GatewayConfig {
        rate_limit_window_seconds: 15,
        ..GatewayConfig::default()
    };

    // Genuine throttle: second request over a limit of 1
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved_credential(1));
    let gateway = build_gateway(registry, config.clone());
    gateway
        .router
        .clone()
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    let response = gateway
        .router
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("retry-after").unwrap().to_str().unwrap(),
        "15"
    );

    // Counter-store outage under fail-closed: same window, same header
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved_credential(1));
    let router = build_router_with(
        registry,
        config,
        Arc::new(UnavailableCounterStore),
        Arc::new(RecordingUsageStore::default()),
        Router::new().route("/internal/widgets", get(|| async { "widgets" })),
    );
    let response = router
        .oneshot(request("/internal/widgets", Some("key-1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.headers().get("retry-after").unwrap().to_str().unwrap(),
        "15"
    );

    let body = body_json(response).await;
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["details"]["retry_after"], 15);
}

#[tokio::test]
async fn test_cancelled_request_recorded_as_error() {
    let resolved = resolved_credential(10);
    let endpoint_id = resolved.endpoint.id;
    let credential_id = resolved.credential_id;
    let registry = StaticQuotaRegistry::new().with_credential("key-1", resolved);

    let store = Arc::new(InMemoryCounterStore::new());
    let usage = Arc::new(RecordingUsageStore::default());
    let upstream = Router::new().route(
        "/internal/hang",
        get(|| async {
            std::future::pending::<()>().await;
            "unreachable"
        }),
    );
    let router = build_router_with(
        registry,
        GatewayConfig::default(),
        store.clone(),
        usage.clone(),
        upstream,
    );

    let in_flight = tokio::spawn(router.oneshot(request("/internal/hang", Some("key-1"))));

    // Wait for admission: the rate-limit counter appears once the
    // request is past the ceiling check and parked in the handler
    let mut admitted = false;
    for _ in 0..100 {
        if !store.scan_keys("rate_limit").await.unwrap().is_empty() {
            admitted = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(admitted, "request never reached admission");

    // Client goes away: the request future is dropped mid-flight
    in_flight.abort();

    // The drop guard records asynchronously
    let mut logged = false;
    for _ in 0..100 {
        if !usage.logs.lock().unwrap().is_empty() {
            logged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(logged, "cancelled request was never accounted");

    let logs = usage.logs.lock().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, 499);
    assert_eq!(logs[0].endpoint_id, endpoint_id);
    assert_eq!(logs[0].credential_id, credential_id);
    assert_eq!(logs[0].path, "/internal/hang");
    drop(logs);

    // And the outcome is metered as an error
    let keys = store.scan_keys("usage").await.unwrap();
    assert_eq!(keys.len(), 1);
    let counters = store.hash_get_all(&keys[0]).await.unwrap();
    assert_eq!(counters.get(fields::REQUESTS), Some(&1));
    assert_eq!(counters.get(fields::ERRORS), Some(&1));
    assert_eq!(counters.get(fields::SUCCESS), None);
}

#[tokio::test]
async fn test_stress_header_ignored_when_bypass_disabled() {
    let gateway = build_gateway(StaticQuotaRegistry::new(), GatewayConfig::default());

    let mut req = request("/internal/widgets", None);
    req.headers_mut()
        .insert("x-stress-test", "true".parse().unwrap());

    let response = gateway.router.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
