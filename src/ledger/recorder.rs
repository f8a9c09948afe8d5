//! Transaction Recorder
//!
//! Appends immutable transaction rows inside the unit of work that changed
//! the balance, and serves the per-account history.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{DomainError, NewTransaction, Transaction, TransactionStatus};
use crate::error::{AppError, AppResult};
use crate::store::{HistoryCursor, LedgerStore, Page, UnitOfWork};

/// Produces unique, time-ordered transaction numbers
#[derive(Debug, Clone)]
pub struct TransactionNumberGenerator {
    prefix: String,
}

impl TransactionNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// `prefix` followed by a UUIDv7 in uppercase hex
    pub fn next_number(&self) -> String {
        format!("{}{}", self.prefix, Uuid::now_v7().simple()).to_uppercase()
    }
}

impl Default for TransactionNumberGenerator {
    fn default() -> Self {
        Self::new("TRX")
    }
}

/// Writes and reads the append-only transaction history
pub struct TransactionRecorder {
    store: Arc<dyn LedgerStore>,
    numbers: TransactionNumberGenerator,
}

impl TransactionRecorder {
    pub fn new(store: Arc<dyn LedgerStore>, numbers: TransactionNumberGenerator) -> Self {
        Self { store, numbers }
    }

    /// Persist one transaction in the caller's unit of work.
    ///
    /// The snapshot pair must match the amount and direction; a mismatch is
    /// a bug in the caller and nothing is written.
    pub async fn record(
        &self,
        uow: &mut dyn UnitOfWork,
        new: NewTransaction,
    ) -> AppResult<Transaction> {
        let transaction = Transaction {
            id: Uuid::new_v4(),
            transaction_number: self.numbers.next_number(),
            account_id: new.account_id,
            category: new.category,
            direction: new.direction,
            amount: new.amount.value(),
            description: new.description,
            balance_before: new.change.before.value(),
            balance_after: new.change.after.value(),
            status: TransactionStatus::Completed,
            channel: new.channel,
            counterparty: new.counterparty,
            transaction_at: new.transaction_at,
            value_date: new.transaction_at.date_naive(),
        };

        if !transaction.is_consistent() {
            return Err(AppError::Internal(format!(
                "inconsistent snapshots for {} of {}: {} -> {}",
                transaction.direction.as_str(),
                transaction.amount,
                transaction.balance_before,
                transaction.balance_after
            )));
        }

        uow.insert_transaction(&transaction).await?;

        tracing::debug!(
            account_id = %transaction.account_id,
            transaction_number = %transaction.transaction_number,
            category = transaction.category.as_str(),
            "Transaction recorded"
        );

        Ok(transaction)
    }

    /// Newest first
    pub async fn list_by_account(
        &self,
        account_id: Uuid,
        page: Page,
    ) -> AppResult<Vec<Transaction>> {
        Ok(self.store.list_transactions(account_id, page).await?)
    }

    /// Oldest first, resuming after `after`
    pub async fn list_by_account_after(
        &self,
        account_id: Uuid,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> AppResult<Vec<Transaction>> {
        Ok(self
            .store
            .list_transactions_after(account_id, after, limit)
            .await?)
    }

    /// Oldest first; `start` inclusive, `end` exclusive
    pub async fn list_by_account_and_date_range(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<Transaction>> {
        if start > end {
            return Err(DomainError::BusinessRuleViolation(format!(
                "date range start {} is after end {}",
                start, end
            ))
            .into());
        }
        Ok(self
            .store
            .list_transactions_in_range(account_id, start, end)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::fixtures::account_with_balance;
    use crate::domain::{Amount, BalanceChange, Channel, Direction, TransactionCategory};
    use crate::store::InMemoryStore;
    use std::collections::HashSet;

    fn deposit(account_id: Uuid, change: BalanceChange, amount: i64) -> NewTransaction {
        NewTransaction {
            account_id,
            category: TransactionCategory::Deposit,
            direction: Direction::Credit,
            amount: Amount::from_integer(amount).unwrap(),
            description: "Cash deposit".to_string(),
            change,
            channel: Channel::Teller,
            counterparty: None,
            transaction_at: Utc::now(),
        }
    }

    #[test]
    fn test_transaction_numbers_are_unique_and_prefixed() {
        let generator = TransactionNumberGenerator::new("trx");
        let numbers: HashSet<String> = (0..10_000).map(|_| generator.next_number()).collect();

        assert_eq!(numbers.len(), 10_000);
        assert!(numbers.iter().all(|n| n.starts_with("TRX") && n.len() == 35));
    }

    #[tokio::test]
    async fn test_record_rejects_inconsistent_snapshots() {
        let store = Arc::new(InMemoryStore::new());
        let mut account = account_with_balance(100);
        store.seed_account(account.clone()).unwrap();
        let recorder = TransactionRecorder::new(store.clone(), TransactionNumberGenerator::default());

        let mut change = account
            .apply_credit(&Amount::from_integer(50).unwrap(), Utc::now())
            .unwrap();
        change.after = account_with_balance(500).balance;

        let mut uow = store.begin(&[account.id]).await.unwrap();
        let result = recorder
            .record(uow.as_mut(), deposit(account.id, change, 50))
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let store = Arc::new(InMemoryStore::new());
        let mut account = account_with_balance(100);
        store.seed_account(account.clone()).unwrap();
        let recorder = TransactionRecorder::new(store.clone(), TransactionNumberGenerator::default());

        let change = account
            .apply_credit(&Amount::from_integer(50).unwrap(), Utc::now())
            .unwrap();
        let mut uow = store.begin(&[account.id]).await.unwrap();
        let recorded = recorder
            .record(uow.as_mut(), deposit(account.id, change, 50))
            .await
            .unwrap();
        uow.commit().await.unwrap();

        let history = recorder
            .list_by_account(account.id, Page::default())
            .await
            .unwrap();
        assert_eq!(history, vec![recorded.clone()]);
        assert_eq!(recorded.value_date, recorded.transaction_at.date_naive());

        let start = recorded.transaction_at;
        let in_range = recorder
            .list_by_account_and_date_range(account.id, start, start + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);

        let reversed = recorder
            .list_by_account_and_date_range(account.id, start, start - chrono::Duration::days(1))
            .await;
        assert!(reversed.is_err());
    }
}
