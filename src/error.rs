//! Error handling module
//!
//! Centralized error type for every ledger operation.

use crate::config::ConfigError;
use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Domain errors (caller's fault or business rule)
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Infrastructure errors
    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConcurrencyConflict(msg) => {
                AppError::Domain(DomainError::ConcurrencyConflict(msg))
            }
            other => AppError::Store(other),
        }
    }
}

impl From<crate::domain::AmountError> for AppError {
    fn from(err: crate::domain::AmountError) -> Self {
        AppError::Domain(err.into())
    }
}

impl AppError {
    /// Underlying domain error, if any
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Only lock/version contention is worth re-running a unit of work for
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Domain(DomainError::ConcurrencyConflict(_)) => true,
            AppError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Stable machine-readable code for the API layer
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Domain(e) => e.error_code(),
            AppError::Store(StoreError::Duplicate(_)) => "duplicate_entry",
            AppError::Store(_) => "store_error",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}
