//! Route assembly

use std::sync::Arc;

use axum::{Json, Router, middleware, routing::get};

use super::middleware::{GatewayState, admission_middleware};
use super::models::HealthResponse;

/// Wrap the host-provided upstream router with the admission middleware
/// and mount the gateway's own routes. The upstream router carries the
/// actual protected handlers; this gateway only decides whether a
/// request reaches them.
pub fn build_router(state: Arc<GatewayState>, upstream: Router) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(upstream.layer(middleware::from_fn_with_state(state, admission_middleware)))
}

/// Liveness probe; never admission-controlled
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
