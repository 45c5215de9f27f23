//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::converter::RateTable;
use crate::domain::amount::MAX_SCALE;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// Longest a unit of work waits for a balance row lock
    pub lock_timeout: Duration,

    /// Attempts per operation when storage reports contention
    pub transfer_max_retries: u32,

    pub transfer_retry_backoff: Duration,

    /// Decimal places between major and minor units
    pub minor_unit_scale: u32,

    pub exchange_rates: RateTable,

    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10)?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let lock_timeout = Duration::from_millis(parse_or("LOCK_TIMEOUT_MS", 5000)?);

        let transfer_max_retries: u32 = parse_or("TRANSFER_MAX_RETRIES", 3)?;
        if transfer_max_retries == 0 {
            return Err(ConfigError::InvalidValue("TRANSFER_MAX_RETRIES"));
        }

        let transfer_retry_backoff =
            Duration::from_millis(parse_or("TRANSFER_RETRY_BACKOFF_MS", 50)?);

        let minor_unit_scale: u32 = parse_or("MINOR_UNIT_SCALE", 2)?;
        if minor_unit_scale > MAX_SCALE {
            return Err(ConfigError::InvalidValue("MINOR_UNIT_SCALE"));
        }

        let exchange_rates = match env::var("EXCHANGE_RATES") {
            Ok(rates) if !rates.trim().is_empty() => {
                RateTable::parse(&rates).map_err(|_| ConfigError::InvalidValue("EXCHANGE_RATES"))?
            }
            _ => RateTable::reference_rates(),
        };

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            lock_timeout,
            transfer_max_retries,
            transfer_retry_backoff,
            minor_unit_scale,
            exchange_rates,
            log_format,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
