//! Store Errors
//!
//! Error types for persistence operations.

use uuid::Uuid;

/// Errors that can occur in a ledger store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Lock wait timed out, serialization failure or deadlock
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// Unique constraint violated
    #[error("Duplicate entry: {0}")]
    Duplicate(String),

    /// A unit of work touched an account it does not hold a lock on
    #[error("Account {0} is not locked by this unit of work")]
    NotLocked(Uuid),

    /// Persisted row could not be mapped to a domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// In-memory state lock poisoned by a panicking writer
    #[error("Store state poisoned")]
    Poisoned,
}

impl StoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict(_))
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConcurrencyConflict(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => {
                    let constraint = db_err.constraint().unwrap_or("unique").to_string();
                    return StoreError::Duplicate(constraint);
                }
                // serialization_failure, deadlock_detected, lock_not_available
                Some("40001") | Some("40P01") | Some("55P03") => {
                    return StoreError::ConcurrencyConflict(db_err.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_is_retryable() {
        let conflict = StoreError::ConcurrencyConflict("lock timeout".to_string());
        assert!(conflict.is_retryable());
        assert!(conflict.is_concurrency_conflict());

        let duplicate = StoreError::Duplicate("transactions_transaction_number_key".to_string());
        assert!(!duplicate.is_retryable());
    }

    #[test]
    fn test_non_database_sqlx_error_maps_to_database() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
