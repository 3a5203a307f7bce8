//! Application layer: the request-path services and the aggregation job

pub mod admission;
pub mod aggregator;
pub mod metering;
pub mod usage_log;

pub use admission::{AdmissionController, AdmissionDecision, AdmissionSettings, CallerContext};
pub use aggregator::Aggregator;
pub use metering::UsageMetering;
pub use usage_log::UsageLogWriter;
