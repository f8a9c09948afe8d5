//! Account policy checks
//!
//! Gates every balance-mutating operation and the account-opening deposit.

use rust_decimal::Decimal;

use super::account::{Account, AccountStatus, AccountType};
use super::error::DomainError;

/// Fail unless the account may take part in a balance mutation.
pub fn assert_transactable(account: &Account) -> Result<(), DomainError> {
    if account.status != AccountStatus::Active {
        return Err(DomainError::AccountNotActive {
            status: account.status,
        });
    }
    if account.is_dormant {
        return Err(DomainError::AccountDormant);
    }
    Ok(())
}

/// Opening deposit must cover the product minimum.
pub fn assert_minimum_balance(
    account_type: &AccountType,
    opening_deposit: Decimal,
) -> Result<(), DomainError> {
    if opening_deposit < account_type.minimum_balance {
        return Err(DomainError::BelowMinimumBalance {
            minimum: account_type.minimum_balance,
            provided: opening_deposit,
        });
    }
    Ok(())
}

/// Validate a status change requested through `set_status`.
pub fn assert_status_transition(account: &Account, next: AccountStatus) -> Result<(), DomainError> {
    if !account.status.can_transition_to(next) {
        return Err(DomainError::InvalidStatusTransition {
            from: account.status,
            to: next,
        });
    }
    if next == AccountStatus::Closed && !account.balance.is_zero() {
        return Err(DomainError::BusinessRuleViolation(format!(
            "account {} still holds {} and cannot be closed",
            account.account_number, account.balance
        )));
    }
    Ok(())
}
