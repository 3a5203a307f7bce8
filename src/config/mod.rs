//! Configuration management

pub mod validation;

pub use validation::{Validate, ValidationError};

use serde::{Deserialize, Serialize};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub counters: CountersConfig,
    pub database: DatabaseConfig,
    pub aggregator: AggregatorConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Admission and metering behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Request header carrying the caller's credential
    pub credential_header: String,
    /// Only paths under this prefix go through admission; everything
    /// else passes straight to the host's handlers
    pub protected_prefix: String,
    /// Counter-store outage policy at admission time. Fail-closed
    /// (false, the default) rejects with 429; fail-open admits the
    /// request uncounted. This is a deliberate policy choice for a
    /// metering gateway, not incidental behavior.
    pub fail_open: bool,
    /// Fixed rate-limit window length
    pub rate_limit_window_seconds: u64,
    /// TTL for metering window counters; refreshed on every update and
    /// long enough for the aggregator to drain them
    pub counter_ttl_seconds: u64,
    /// Key prefix for rate-limit counters
    pub rate_limit_key_prefix: String,
    /// Key prefix for metering window counters
    pub metering_key_prefix: String,
    /// Honor the stress-test bypass header (skips admission and all
    /// accounting). Keep off outside load-test environments.
    pub allow_stress_bypass: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            credential_header: "x-api-key".to_string(),
            protected_prefix: "/internal".to_string(),
            fail_open: false,
            rate_limit_window_seconds: 60,
            counter_ttl_seconds: 300,
            rate_limit_key_prefix: "rate_limit".to_string(),
            metering_key_prefix: "usage".to_string(),
            allow_stress_bypass: false,
        }
    }
}

/// Backend for the ephemeral counter store
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CounterStoreBackend {
    /// Dragonfly/Redis, shared across gateway workers (production)
    #[default]
    Dragonfly,
    /// In-memory, single process (development and tests)
    Memory,
}

/// Ephemeral counter store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountersConfig {
    pub backend: CounterStoreBackend,
    pub url: String,
}

impl Default for CountersConfig {
    fn default() -> Self {
        Self {
            backend: CounterStoreBackend::Dragonfly,
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// Durable store (PostgreSQL) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout_seconds: 10,
        }
    }
}

/// Aggregation worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.gateway.validate()?;
        self.counters.validate()?;
        self.database.validate()?;
        self.aggregator.validate()?;
        Ok(())
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigLoadError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false));

        // Add environment-specific config if ENV is set
        if let Ok(env) = std::env::var("ENV") {
            builder = builder
                .add_source(config::File::with_name(&format!("config/{}", env)).required(false));
        }

        // Local config and environment variables last (highest priority)
        builder = builder
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("QUOTAGATE").separator("__"));

        let mut config: Config = builder.build()?.try_deserialize()?;

        // DATABASE_URL override (common deployment convention)
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            config.database.url = database_url;
        }

        config.validate()?;

        Ok(config)
    }
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Configuration file error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Validation(#[from] ValidationError),
}
