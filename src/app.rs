//! Application setup and wiring

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use crate::application::{
    AdmissionController, AdmissionSettings, Aggregator, UsageLogWriter, UsageMetering,
};
use crate::config::{Config, CounterStoreBackend};
use crate::infrastructure::counter_store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
use crate::infrastructure::{SqlxQuotaRegistry, SqlxUsageStore};
use crate::presentation::{GatewayState, build_router};

/// Handle returned from create_app for graceful shutdown coordination
pub struct AppHandle {
    pub router: Router,
    pub shutdown_token: CancellationToken,
}

/// Wire up stores and services and wrap the host's upstream router with
/// the admission middleware. The upstream router carries the protected
/// handlers; routing to them is the host's concern.
pub async fn create_app(
    config: Config,
    upstream: Router,
) -> Result<AppHandle, Box<dyn std::error::Error + Send + Sync>> {
    let shutdown_token = CancellationToken::new();

    // Durable store (usage logs, summaries, quota registry)
    let db_pool = Arc::new(
        PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(config.database.connect_timeout_seconds))
            .connect(&config.database.url)
            .await?,
    );

    // Ephemeral counter store
    let counter_store: Arc<dyn CounterStore> = match config.counters.backend {
        CounterStoreBackend::Dragonfly => {
            match RedisCounterStore::new(&config.counters.url).await {
                Ok(store) => {
                    tracing::info!(
                        "Counter store using Dragonfly backend at {}",
                        config.counters.url
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to connect to Dragonfly counter store, falling back to in-memory \
                         (rate limits will not be shared across workers): {}",
                        e
                    );
                    Arc::new(InMemoryCounterStore::new())
                }
            }
        }
        CounterStoreBackend::Memory => {
            tracing::info!("Counter store using in-memory backend");
            Arc::new(InMemoryCounterStore::new())
        }
    };

    let registry = Arc::new(SqlxQuotaRegistry::new(Arc::clone(&db_pool)));
    let usage_store = Arc::new(SqlxUsageStore::new(Arc::clone(&db_pool)));

    let metering = Arc::new(UsageMetering::new(
        Arc::clone(&counter_store),
        config.gateway.metering_key_prefix.clone(),
        config.gateway.counter_ttl_seconds,
    ));

    let admission = Arc::new(AdmissionController::new(
        registry,
        Arc::clone(&counter_store),
        Arc::clone(&metering),
        AdmissionSettings {
            rate_limit_key_prefix: config.gateway.rate_limit_key_prefix.clone(),
            window_secs: config.gateway.rate_limit_window_seconds,
            fail_open: config.gateway.fail_open,
        },
    ));

    let usage_log = Arc::new(UsageLogWriter::new(usage_store.clone()));

    // Background aggregation of elapsed window counters
    if config.aggregator.enabled {
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&counter_store),
            usage_store,
            config.gateway.metering_key_prefix.clone(),
        ));
        aggregator.spawn_periodic(
            Duration::from_secs(config.aggregator.interval_seconds),
            shutdown_token.clone(),
        );
        tracing::info!(
            interval_seconds = config.aggregator.interval_seconds,
            "Aggregation worker started"
        );
    } else {
        tracing::warn!("Aggregation worker disabled; window counters will expire unaggregated");
    }

    let state = Arc::new(GatewayState {
        admission,
        metering,
        usage_log,
        config: config.gateway.clone(),
    });

    Ok(AppHandle {
        router: build_router(state, upstream),
        shutdown_token,
    })
}
