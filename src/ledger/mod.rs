//! Account Ledger
//!
//! Balance mutations and account lifecycle. `credit` and `debit` run inside
//! a caller-supplied unit of work that already holds the account's lock, so
//! the check-then-mutate sequence is atomic per account.

mod recorder;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::policy;
use crate::domain::{Account, AccountStatus, Amount, Balance, BalanceChange, DomainError};
use crate::error::AppResult;
use crate::store::{LedgerStore, RetryPolicy, UnitOfWork};

pub use recorder::{TransactionNumberGenerator, TransactionRecorder};

/// Account state after a balance mutation
#[derive(Debug, Clone)]
pub struct Posting {
    pub account: Account,
    pub change: BalanceChange,
}

/// Outcome of a status change
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub account: Account,
    pub from: AccountStatus,
}

/// Owns account balance state
pub struct AccountLedger {
    store: Arc<dyn LedgerStore>,
    retry: RetryPolicy,
}

async fn load_locked(uow: &mut dyn UnitOfWork, account_id: Uuid) -> AppResult<Account> {
    uow.load_account(account_id)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(account_id.to_string()).into())
}

impl AccountLedger {
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    // =========================================================================
    // Balance mutations (inside a unit of work)
    // =========================================================================

    /// Add `amount` to the account's balance.
    pub async fn credit(
        &self,
        uow: &mut dyn UnitOfWork,
        account_id: Uuid,
        amount: &Amount,
        at: DateTime<Utc>,
    ) -> AppResult<Posting> {
        let mut account = load_locked(uow, account_id).await?;
        policy::assert_transactable(&account)?;

        let change = account.apply_credit(amount, at)?;
        uow.save_account(&account).await?;

        Ok(Posting { account, change })
    }

    /// Subtract `amount`; fails with `InsufficientBalance` under the lock.
    pub async fn debit(
        &self,
        uow: &mut dyn UnitOfWork,
        account_id: Uuid,
        amount: &Amount,
        at: DateTime<Utc>,
    ) -> AppResult<Posting> {
        let mut account = load_locked(uow, account_id).await?;
        policy::assert_transactable(&account)?;

        let change = account.apply_debit(amount, at)?;
        uow.save_account(&account).await?;

        Ok(Posting { account, change })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_balance(&self, account_id: Uuid) -> AppResult<Balance> {
        let account = self
            .store
            .find_account(account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(account_id.to_string()))?;
        Ok(account.balance)
    }

    // =========================================================================
    // Lifecycle (own unit of work, retried on conflict)
    // =========================================================================

    /// Policy-gated status transition; closing stamps `closed_at`.
    pub async fn set_status(&self, account_id: Uuid, next: AccountStatus) -> AppResult<StatusChange> {
        let change = self
            .retry
            .run(|| self.try_set_status(account_id, next))
            .await?;

        tracing::info!(
            account_id = %account_id,
            from = change.from.as_str(),
            to = next.as_str(),
            "Account status changed"
        );
        Ok(change)
    }

    async fn try_set_status(&self, account_id: Uuid, next: AccountStatus) -> AppResult<StatusChange> {
        let mut uow = self.store.begin(&[account_id]).await?;
        let mut account = load_locked(uow.as_mut(), account_id).await?;

        policy::assert_status_transition(&account, next)?;
        let from = account.status;
        account.transition_to(next, Utc::now());

        uow.save_account(&account).await?;
        uow.commit().await?;
        Ok(StatusChange { account, from })
    }

    /// Flag the account dormant if it is still inactive since `inactive_since`.
    ///
    /// Returns `None` when activity or a status change happened in the
    /// meantime and the account was left alone.
    pub async fn mark_dormant(
        &self,
        account_id: Uuid,
        inactive_since: DateTime<Utc>,
    ) -> AppResult<Option<Account>> {
        self.retry
            .run(|| self.try_mark_dormant(account_id, inactive_since))
            .await
    }

    async fn try_mark_dormant(
        &self,
        account_id: Uuid,
        inactive_since: DateTime<Utc>,
    ) -> AppResult<Option<Account>> {
        let mut uow = self.store.begin(&[account_id]).await?;
        let mut account = load_locked(uow.as_mut(), account_id).await?;

        if !account.is_active() || account.is_dormant || account.last_activity_at() >= inactive_since {
            return Ok(None);
        }

        account.mark_dormant(Utc::now());
        uow.save_account(&account).await?;
        uow.commit().await?;

        tracing::info!(
            account_id = %account_id,
            account_number = %account.account_number,
            "Account flagged dormant"
        );
        Ok(Some(account))
    }

    /// Clear the dormancy flag.
    pub async fn reactivate(&self, account_id: Uuid) -> AppResult<Account> {
        self.retry.run(|| self.try_reactivate(account_id)).await
    }

    async fn try_reactivate(&self, account_id: Uuid) -> AppResult<Account> {
        let mut uow = self.store.begin(&[account_id]).await?;
        let mut account = load_locked(uow.as_mut(), account_id).await?;

        if account.is_closed() {
            return Err(DomainError::AccountNotActive {
                status: account.status,
            }
            .into());
        }
        if !account.is_dormant {
            return Ok(account);
        }

        account.reactivate(Utc::now());
        uow.save_account(&account).await?;
        uow.commit().await?;

        tracing::info!(account_id = %account_id, "Dormant account reactivated");
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::fixtures::account_with_balance;
    use crate::error::AppError;
    use crate::store::InMemoryStore;
    use rust_decimal::Decimal;

    fn ledger_with(account: &Account) -> (Arc<InMemoryStore>, AccountLedger) {
        let store = Arc::new(InMemoryStore::new());
        store.seed_account(account.clone()).unwrap();
        let ledger = AccountLedger::new(store.clone(), RetryPolicy::default());
        (store, ledger)
    }

    #[tokio::test]
    async fn test_debit_beyond_balance_fails_without_mutation() {
        let account = account_with_balance(100);
        let (store, ledger) = ledger_with(&account);

        let mut uow = store.begin(&[account.id]).await.unwrap();
        let result = ledger
            .debit(uow.as_mut(), account.id, &Amount::from_integer(150).unwrap(), Utc::now())
            .await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InsufficientBalance { .. }))
        ));
        drop(uow);

        assert_eq!(
            ledger.get_balance(account.id).await.unwrap().value(),
            Decimal::from(100)
        );
    }

    #[tokio::test]
    async fn test_credit_on_dormant_account_fails() {
        let mut account = account_with_balance(100);
        account.mark_dormant(Utc::now());
        let (store, ledger) = ledger_with(&account);

        let mut uow = store.begin(&[account.id]).await.unwrap();
        let result = ledger
            .credit(uow.as_mut(), account.id, &Amount::from_integer(1).unwrap(), Utc::now())
            .await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::AccountDormant))));
    }

    #[tokio::test]
    async fn test_missing_account() {
        let store = Arc::new(InMemoryStore::new());
        let ledger = AccountLedger::new(store, RetryPolicy::default());

        let result = ledger.get_balance(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::AccountNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_close_requires_zero_balance() {
        let account = account_with_balance(100);
        let (_store, ledger) = ledger_with(&account);

        let result = ledger.set_status(account.id, AccountStatus::Closed).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::BusinessRuleViolation(_)))
        ));

        let empty = account_with_balance(0);
        let (_store, ledger) = ledger_with(&empty);
        let change = ledger.set_status(empty.id, AccountStatus::Closed).await.unwrap();
        assert_eq!(change.from, AccountStatus::Active);
        assert!(change.account.closed_at.is_some());

        let reopen = ledger.set_status(empty.id, AccountStatus::Active).await;
        assert!(matches!(
            reopen,
            Err(AppError::Domain(DomainError::InvalidStatusTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_dormancy_round_trip() {
        let mut account = account_with_balance(10);
        account.last_transaction_at = Some(Utc::now() - chrono::Duration::days(400));
        let (_store, ledger) = ledger_with(&account);
        let cutoff = Utc::now() - chrono::Duration::days(365);

        let flagged = ledger.mark_dormant(account.id, cutoff).await.unwrap();
        assert!(flagged.unwrap().is_dormant);

        // Already dormant: left alone
        assert!(ledger.mark_dormant(account.id, cutoff).await.unwrap().is_none());

        let reactivated = ledger.reactivate(account.id).await.unwrap();
        assert!(!reactivated.is_dormant);
        assert!(reactivated.dormant_since.is_none());
    }
}
