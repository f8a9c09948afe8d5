//! Account and product types
//!
//! Accounts are plain data; every balance change goes through
//! [`Account::apply_credit`] / [`Account::apply_debit`], which keep
//! `balance == available_balance` and refuse to go below zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::amount::{Amount, Balance};
use super::error::DomainError;

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Suspended,
    Frozen,
    Closed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Frozen => "frozen",
            AccountStatus::Closed => "closed",
        }
    }

    /// Whether `self -> next` is an allowed lifecycle step.
    pub fn can_transition_to(&self, next: AccountStatus) -> bool {
        use AccountStatus::*;
        matches!(
            (self, next),
            (Active, Suspended)
                | (Active, Frozen)
                | (Active, Closed)
                | (Suspended, Active)
                | (Suspended, Closed)
                | (Frozen, Active)
                | (Frozen, Closed)
        )
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccountStatus::Active => "Active",
            AccountStatus::Suspended => "Suspended",
            AccountStatus::Frozen => "Frozen",
            AccountStatus::Closed => "Closed",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            "frozen" => Ok(AccountStatus::Frozen),
            "closed" => Ok(AccountStatus::Closed),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}

/// Profit-sharing contract of a savings product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfitSharingScheme {
    Mudharabah,
    Musyarakah,
}

impl ProfitSharingScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitSharingScheme::Mudharabah => "mudharabah",
            ProfitSharingScheme::Musyarakah => "musyarakah",
        }
    }
}

impl FromStr for ProfitSharingScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mudharabah" => Ok(ProfitSharingScheme::Mudharabah),
            "musyarakah" => Ok(ProfitSharingScheme::Musyarakah),
            other => Err(format!("unknown profit sharing scheme '{}'", other)),
        }
    }
}

/// Savings product definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountType {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Minimum opening deposit
    pub minimum_balance: Decimal,
    /// `None` for products without profit sharing (e.g. Wadiah)
    pub scheme: Option<ProfitSharingScheme>,
    /// Customer's share of the attributed profit, in percent (0..=100)
    pub sharing_percentage: Decimal,
    pub currency: String,
}

impl AccountType {
    pub fn is_profit_sharing(&self) -> bool {
        self.scheme.is_some()
    }

    /// Customer ratio as a fraction (65% -> 0.65)
    pub fn sharing_ratio(&self) -> Decimal {
        self.sharing_percentage / Decimal::ONE_HUNDRED
    }
}

/// Customer account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub account_number: String,
    pub customer_id: Uuid,
    pub account_type_id: Uuid,
    pub account_name: String,
    pub balance: Balance,
    /// Equal to `balance` at rest; holds are not modelled
    pub available_balance: Balance,
    pub currency: String,
    pub status: AccountStatus,
    pub is_dormant: bool,
    pub dormant_since: Option<DateTime<Utc>>,
    pub last_transaction_at: Option<DateTime<Utc>>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Balance snapshot around a single mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceChange {
    pub before: Balance,
    pub after: Balance,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn is_closed(&self) -> bool {
        self.status == AccountStatus::Closed
    }

    /// Add `amount` to balance and available balance.
    pub fn apply_credit(
        &mut self,
        amount: &Amount,
        at: DateTime<Utc>,
    ) -> Result<BalanceChange, DomainError> {
        let before = self.balance;
        let after = before.credit(amount)?;
        self.set_balance(after, at);
        Ok(BalanceChange { before, after })
    }

    /// Subtract `amount`; fails without touching state when funds are short.
    pub fn apply_debit(
        &mut self,
        amount: &Amount,
        at: DateTime<Utc>,
    ) -> Result<BalanceChange, DomainError> {
        if !self.available_balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_balance(
                amount.value(),
                self.available_balance.value(),
            ));
        }
        let before = self.balance;
        let after = before.debit(amount)?;
        self.set_balance(after, at);
        Ok(BalanceChange { before, after })
    }

    /// Move to `next`, stamping `closed_at` when closing.
    pub fn transition_to(&mut self, next: AccountStatus, at: DateTime<Utc>) {
        self.status = next;
        if next == AccountStatus::Closed {
            self.closed_at = Some(at);
        }
        self.updated_at = at;
    }

    pub fn mark_dormant(&mut self, at: DateTime<Utc>) {
        self.is_dormant = true;
        self.dormant_since = Some(at);
        self.updated_at = at;
    }

    pub fn reactivate(&mut self, at: DateTime<Utc>) {
        self.is_dormant = false;
        self.dormant_since = None;
        self.updated_at = at;
    }

    /// Timestamp dormancy is measured from
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_transaction_at.unwrap_or(self.opened_at)
    }

    fn set_balance(&mut self, balance: Balance, at: DateTime<Utc>) {
        self.balance = balance;
        self.available_balance = balance;
        self.last_transaction_at = Some(at);
        self.updated_at = at;
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_NUMBER: AtomicU64 = AtomicU64::new(9_000_000_001);

    pub fn account_with_balance(balance: i64) -> Account {
        let now = Utc::now();
        let number = NEXT_NUMBER.fetch_add(1, Ordering::Relaxed);
        let balance = Balance::new(Decimal::from(balance)).unwrap();
        Account {
            id: Uuid::new_v4(),
            account_number: format!("{:010}", number),
            customer_id: Uuid::new_v4(),
            account_type_id: Uuid::new_v4(),
            account_name: "Test Saver".to_string(),
            balance,
            available_balance: balance,
            currency: "IDR".to_string(),
            status: AccountStatus::Active,
            is_dormant: false,
            dormant_since: None,
            last_transaction_at: None,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::account_with_balance;
    use super::*;

    #[test]
    fn test_apply_credit_keeps_available_in_sync() {
        let mut account = account_with_balance(100);
        let amount = Amount::from_integer(50).unwrap();

        let change = account.apply_credit(&amount, Utc::now()).unwrap();

        assert_eq!(change.before.value(), Decimal::from(100));
        assert_eq!(change.after.value(), Decimal::from(150));
        assert_eq!(account.balance, account.available_balance);
        assert!(account.last_transaction_at.is_some());
    }

    #[test]
    fn test_apply_debit_insufficient_leaves_state() {
        let mut account = account_with_balance(100);
        let original = account.clone();
        let amount = Amount::from_integer(101).unwrap();

        let result = account.apply_debit(&amount, Utc::now());

        assert!(matches!(
            result,
            Err(DomainError::InsufficientBalance { .. })
        ));
        assert_eq!(account, original);
    }

    #[test]
    fn test_apply_debit_exact_balance() {
        let mut account = account_with_balance(100);
        let amount = Amount::from_integer(100).unwrap();

        let change = account.apply_debit(&amount, Utc::now()).unwrap();
        assert!(change.after.is_zero());
    }

    #[test]
    fn test_status_transitions() {
        use AccountStatus::*;
        assert!(Active.can_transition_to(Frozen));
        assert!(Frozen.can_transition_to(Active));
        assert!(Suspended.can_transition_to(Closed));
        assert!(!Closed.can_transition_to(Active));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn test_close_stamps_closed_at() {
        let mut account = account_with_balance(0);
        account.transition_to(AccountStatus::Closed, Utc::now());
        assert!(account.closed_at.is_some());
        assert!(account.is_closed());
    }

    #[test]
    fn test_status_round_trip_str() {
        for status in [
            AccountStatus::Active,
            AccountStatus::Suspended,
            AccountStatus::Frozen,
            AccountStatus::Closed,
        ] {
            assert_eq!(status.as_str().parse::<AccountStatus>(), Ok(status));
        }
    }
}
