//! Configuration management for the hospital warehouse service
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with HWM__ prefix

use chrono::{FixedOffset, NaiveDate, Utc};
use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Storage backend selection
    pub store: StoreConfig,

    /// Database configuration, used by the postgres store
    pub database: DatabaseConfig,

    /// Lot ledger rules
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    #[serde(default)]
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct LedgerConfig {
    /// Lots expiring in fewer days than this are flagged NEAR_EXPIRY
    pub near_expiry_threshold_days: i64,

    /// Offset of the warehouse's local time from UTC; defines "today"
    pub utc_offset_hours: i32,
}

impl LedgerConfig {
    /// Today's date in the warehouse's local time
    pub fn today(&self) -> NaiveDate {
        let now = Utc::now();
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => now.with_timezone(&offset).date_naive(),
            None => now.date_naive(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            near_expiry_threshold_days: shared::DEFAULT_NEAR_EXPIRY_DAYS,
            utc_offset_hours: 7,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("HWM_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("store.backend", "memory")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("ledger.near_expiry_threshold_days", shared::DEFAULT_NEAR_EXPIRY_DAYS)?
            .set_default("ledger.utc_offset_hours", 7)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (HWM__ prefix)
            .add_source(
                Environment::with_prefix("HWM")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
