//! Configuration validation

use crate::config::{
    AggregatorConfig, CountersConfig, DatabaseConfig, GatewayConfig, ServerConfig,
};

/// Trait for validating configuration sections
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Server configuration error: {message}")]
    Server { message: String },

    #[error("Gateway configuration error: {message}")]
    Gateway { message: String },

    #[error("Counter store configuration error: {message}")]
    Counters { message: String },

    #[error("Database configuration error: {message}")]
    Database { message: String },

    #[error("Aggregator configuration error: {message}")]
    Aggregator { message: String },
}

impl ValidationError {
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    pub fn counters(message: impl Into<String>) -> Self {
        Self::Counters {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn aggregator(message: impl Into<String>) -> Self {
        Self::Aggregator {
            message: message.into(),
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::server("Port must be in range 1-65535"));
        }
        if self.host.is_empty() {
            return Err(ValidationError::server("Host must not be empty"));
        }
        Ok(())
    }
}

impl Validate for GatewayConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.credential_header.is_empty() {
            return Err(ValidationError::gateway(
                "Credential header name must not be empty",
            ));
        }
        if !self.protected_prefix.starts_with('/') {
            return Err(ValidationError::gateway(format!(
                "Protected prefix must start with '/', got '{}'",
                self.protected_prefix
            )));
        }
        if self.rate_limit_window_seconds == 0 {
            return Err(ValidationError::gateway(
                "Rate limit window must be > 0 seconds",
            ));
        }
        if self.counter_ttl_seconds < self.rate_limit_window_seconds {
            return Err(ValidationError::gateway(
                "Window counter TTL must be at least one rate limit window",
            ));
        }
        if self.rate_limit_key_prefix.is_empty() || self.metering_key_prefix.is_empty() {
            return Err(ValidationError::gateway("Key prefixes must not be empty"));
        }
        if self.rate_limit_key_prefix == self.metering_key_prefix {
            // The aggregator scans the metering prefix and deletes what
            // it finds; shared prefixes would let it eat rate counters
            return Err(ValidationError::gateway(
                "Rate limit and metering key prefixes must differ",
            ));
        }
        Ok(())
    }
}

impl Validate for CountersConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.backend == super::CounterStoreBackend::Dragonfly && self.url.is_empty() {
            return Err(ValidationError::counters(
                "Counter store URL required for the dragonfly backend",
            ));
        }
        Ok(())
    }
}

impl Validate for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::database(
                "Database URL must not be empty (set DATABASE_URL)",
            ));
        }
        if self.max_connections == 0 {
            return Err(ValidationError::database("max_connections must be > 0"));
        }
        Ok(())
    }
}

impl Validate for AggregatorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.interval_seconds == 0 {
            return Err(ValidationError::aggregator(
                "Aggregation interval must be > 0 seconds",
            ));
        }
        Ok(())
    }
}
