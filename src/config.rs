//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::Currency;
use crate::store::RetryPolicy;

/// Upper bound for `DORMANCY_DAYS` (one hundred years)
pub const MAX_DORMANCY_DAYS: i64 = 36_500;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    /// `json` or `pretty`
    pub log_format: String,

    /// Ledger currency and its minor-unit scale
    pub currency: Currency,

    /// Per-account lock wait before a unit of work gives up
    pub lock_timeout: Duration,

    /// Attempts (including the first) for a conflicting unit of work
    pub max_conflict_retries: u32,

    pub retry_backoff: Duration,

    pub transaction_number_prefix: String,

    /// Days without activity before an account is flagged dormant
    pub dormancy_days: i64,

    pub profit_sharing_check_interval: Duration,

    pub dormancy_sweep_interval: Duration,
}

/// Settings the ledger core consumes
#[derive(Debug, Clone)]
pub struct LedgerSettings {
    pub currency: Currency,
    pub retry: RetryPolicy,
    pub transaction_number_prefix: String,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            retry: RetryPolicy::default(),
            transaction_number_prefix: "TRX".to_string(),
        }
    }
}

fn check_dormancy_days(days: i64) -> Result<i64, ConfigError> {
    if !(1..=MAX_DORMANCY_DAYS).contains(&days) {
        return Err(ConfigError::InvalidValue("DORMANCY_DAYS"));
    }
    Ok(days)
}

fn parse_or<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", "10")?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
        if log_format != "json" && log_format != "pretty" {
            return Err(ConfigError::InvalidValue("LOG_FORMAT"));
        }

        let currency_code = env::var("CURRENCY_CODE").unwrap_or_else(|_| "IDR".to_string());
        let currency_scale: u32 = parse_or("CURRENCY_SCALE", "2")?;
        let currency = Currency::new(&currency_code, currency_scale)
            .map_err(|_| ConfigError::InvalidValue("CURRENCY_SCALE"))?;

        let lock_timeout = Duration::from_millis(parse_or("LOCK_TIMEOUT_MS", "5000")?);
        let max_conflict_retries: u32 = parse_or("MAX_CONFLICT_RETRIES", "3")?;
        if max_conflict_retries == 0 {
            return Err(ConfigError::InvalidValue("MAX_CONFLICT_RETRIES"));
        }
        let retry_backoff = Duration::from_millis(parse_or("RETRY_BACKOFF_MS", "50")?);

        let transaction_number_prefix =
            env::var("TRANSACTION_NUMBER_PREFIX").unwrap_or_else(|_| "TRX".to_string());

        let dormancy_days = check_dormancy_days(parse_or("DORMANCY_DAYS", "365")?)?;

        let profit_sharing_check_interval =
            Duration::from_secs(parse_or("PROFIT_SHARING_CHECK_SECS", "3600")?);
        let dormancy_sweep_interval =
            Duration::from_secs(parse_or("DORMANCY_SWEEP_SECS", "86400")?);
        if profit_sharing_check_interval.is_zero() {
            return Err(ConfigError::InvalidValue("PROFIT_SHARING_CHECK_SECS"));
        }
        if dormancy_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue("DORMANCY_SWEEP_SECS"));
        }

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            log_format,
            currency,
            lock_timeout,
            max_conflict_retries,
            retry_backoff,
            transaction_number_prefix,
            dormancy_days,
            profit_sharing_check_interval,
            dormancy_sweep_interval,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format == "json"
    }

    /// The part of the configuration the ledger core consumes
    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            currency: self.currency.clone(),
            retry: RetryPolicy::new(self.max_conflict_retries, self.retry_backoff),
            transaction_number_prefix: self.transaction_number_prefix.clone(),
        }
    }
}

/// Configuration error types
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
