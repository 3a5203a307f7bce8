//! Presentation layer: HTTP middleware, routes, and response models

pub mod middleware;
pub mod models;
pub mod routes;

pub use middleware::{GatewayState, admission_middleware};
pub use routes::build_router;
