//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::AccountStatus;
use super::amount::AmountError;

/// Ledger error taxonomy.
///
/// These errors represent business rule violations and domain invariant
/// failures. They are independent of the persistence and transport layers;
/// the external API layer maps them with [`DomainError::error_code`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account type not found: {0}")]
    AccountTypeNotFound(String),

    /// Zero, negative, non-finite or badly scaled amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("Account is not active (status {status})")]
    AccountNotActive { status: AccountStatus },

    #[error("Account is dormant")]
    AccountDormant,

    /// Self-transfer or mismatched currencies
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    /// Profit sharing already recorded for this account and period
    #[error("Profit sharing already recorded for period {period}")]
    DuplicatePeriod { period: String },

    /// Lock or version contention that outlived the retry budget
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Opening deposit {provided} is below the product minimum {minimum}")]
    BelowMinimumBalance { minimum: Decimal, provided: Decimal },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: AccountStatus,
        to: AccountStatus,
    },

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("No distributable profit declared for period {0}")]
    ProfitPoolNotDeclared(String),

    #[error("Business rule violation: {0}")]
    BusinessRuleViolation(String),
}

impl DomainError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::AccountTypeNotFound(_)
                | Self::InvalidAmount(_)
                | Self::InsufficientBalance { .. }
                | Self::AccountNotActive { .. }
                | Self::AccountDormant
                | Self::InvalidTransfer(_)
                | Self::BelowMinimumBalance { .. }
                | Self::InvalidStatusTransition { .. }
                | Self::InvalidPeriod(_)
                | Self::BusinessRuleViolation(_)
        )
    }

    /// Check if this is a conflict error (retry may help)
    pub fn is_conflict_error(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict(_) | Self::DuplicatePeriod { .. }
        )
    }

    /// Stable machine-readable code for the API layer
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::AccountNotFound(_) => "account_not_found",
            Self::AccountTypeNotFound(_) => "account_type_not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::AccountNotActive { .. } => "account_not_active",
            Self::AccountDormant => "account_dormant",
            Self::InvalidTransfer(_) => "invalid_transfer",
            Self::DuplicatePeriod { .. } => "duplicate_period",
            Self::ConcurrencyConflict(_) => "concurrency_conflict",
            Self::BelowMinimumBalance { .. } => "below_minimum_balance",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::InvalidPeriod(_) => "invalid_period",
            Self::ProfitPoolNotDeclared(_) => "profit_pool_not_declared",
            Self::BusinessRuleViolation(_) => "business_rule_violation",
        }
    }
}

impl From<AmountError> for DomainError {
    fn from(err: AmountError) -> Self {
        DomainError::InvalidAmount(err.to_string())
    }
}
