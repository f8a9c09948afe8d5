//! Store module
//!
//! Persistence seam of the ledger. A [`LedgerStore`] hands out
//! [`UnitOfWork`]s: one atomic unit that holds exclusive locks on the
//! accounts it mutates and commits all of its writes or none of them.

mod error;
pub mod memory;
pub mod postgres;
mod retry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    Account, AccountType, Period, ProfitSharingRecord, ProfitSharingStatus, Transaction,
};

pub use error::StoreError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use retry::RetryPolicy;

/// Page of a reverse-chronological listing (zero-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number,
            size: size.max(1),
        }
    }

    pub fn first(size: u32) -> Self {
        Self::new(0, size)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number) * u64::from(self.size)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::first(50)
    }
}

/// Position in an account's oldest-first history: the last row already read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryCursor {
    pub transaction_at: DateTime<Utc>,
    pub transaction_number: String,
}

impl From<&Transaction> for HistoryCursor {
    fn from(transaction: &Transaction) -> Self {
        Self {
            transaction_at: transaction.transaction_at,
            transaction_number: transaction.transaction_number.clone(),
        }
    }
}

/// Data needed to open an account; the store assigns id and number.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub customer_id: Uuid,
    pub account_type_id: Uuid,
    pub account_name: String,
    pub currency: String,
    pub opened_at: DateTime<Utc>,
}

/// Shared store handle
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open an atomic unit holding exclusive locks on `lock_ids`.
    ///
    /// Locks are acquired in ascending id order regardless of the order given.
    async fn begin(&self, lock_ids: &[Uuid]) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_number(&self, number: &str) -> Result<Option<Account>, StoreError>;

    async fn find_account_type(&self, id: Uuid) -> Result<Option<AccountType>, StoreError>;

    /// Active accounts of profit-sharing products opened before `opened_before`
    async fn list_profit_sharing_accounts(
        &self,
        opened_before: DateTime<Utc>,
    ) -> Result<Vec<(Account, AccountType)>, StoreError>;

    /// Active, non-dormant accounts with no activity since `inactive_since`
    async fn list_dormancy_candidates(
        &self,
        inactive_since: DateTime<Utc>,
    ) -> Result<Vec<Account>, StoreError>;

    /// Newest first
    async fn list_transactions(
        &self,
        account_id: Uuid,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Oldest first, strictly after `after` in `(transaction_at,
    /// transaction_number)` order. Rows posted later never shift a cursor.
    async fn list_transactions_after(
        &self,
        account_id: Uuid,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<Transaction>, StoreError>;

    /// Oldest first; `start` inclusive, `end` exclusive
    async fn list_transactions_in_range(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError>;

    async fn last_transaction_before(
        &self,
        account_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn first_transaction_from(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError>;

    async fn find_profit_record(
        &self,
        account_id: Uuid,
        period: Period,
    ) -> Result<Option<ProfitSharingRecord>, StoreError>;

    async fn list_profit_records(
        &self,
        period: Period,
        status: Option<ProfitSharingStatus>,
    ) -> Result<Vec<ProfitSharingRecord>, StoreError>;

    /// Total profit the bank declared distributable for `period`
    async fn distributable_profit(&self, period: Period) -> Result<Option<Decimal>, StoreError>;
}

/// One atomic unit of ledger writes.
///
/// Dropping a unit without calling [`UnitOfWork::commit`] discards every
/// write made through it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn insert_account(&mut self, account: NewAccount) -> Result<Account, StoreError>;

    /// Load an account this unit holds a lock on (or created itself).
    async fn load_account(&mut self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError>;

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError>;

    async fn insert_profit_record(&mut self, record: &ProfitSharingRecord) -> Result<(), StoreError>;

    /// Load a record for an account this unit holds a lock on.
    async fn load_profit_record(
        &mut self,
        account_id: Uuid,
        period: Period,
    ) -> Result<Option<ProfitSharingRecord>, StoreError>;

    async fn save_profit_record(&mut self, record: &ProfitSharingRecord) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
