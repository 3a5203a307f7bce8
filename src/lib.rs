//! Quotagate - admission control and usage metering for internal APIs
//!
//! Sits in front of internal service endpoints and, for every inbound
//! request: identifies the caller by API key, resolves the caller's
//! quota tier, enforces a fixed-window per-minute rate ceiling, and
//! records both ephemeral counters (enforcement) and durable usage
//! rows (reporting).
//!
//! # Architecture
//!
//! ```text
//! quotagate/
//! ├── domain/           # Entities, windows, errors, store interfaces
//! ├── application/      # Admission, metering, usage log, aggregator
//! ├── infrastructure/   # Redis/Dragonfly counters, PostgreSQL stores
//! ├── presentation/     # axum middleware and routes
//! └── config/           # Typed configuration with validation
//! ```
//!
//! # Configuration
//!
//! Environment variables use the `QUOTAGATE__` prefix with double
//! underscore separators:
//!
//! ```bash
//! QUOTAGATE__SERVER__PORT=8080
//! QUOTAGATE__GATEWAY__FAIL_OPEN=false
//! ```

mod app;

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;
pub mod presentation;

pub use app::{AppHandle, create_app};
pub use config::Config;
pub use logging::init_tracing;
