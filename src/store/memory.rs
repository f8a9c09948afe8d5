//! In-memory ledger store
//!
//! Same contract as the Postgres store: per-account async locks taken in
//! ascending id order, writes staged inside the unit of work and applied in
//! one step on commit. Used by tests, the stress tool and embedded setups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, AccountType, Balance, Period, ProfitSharingRecord,
    ProfitSharingStatus, Transaction,
};

use super::{HistoryCursor, LedgerStore, NewAccount, Page, StoreError, UnitOfWork};

const FIRST_ACCOUNT_NUMBER: u64 = 1_000_000_001;
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct MemoryState {
    account_types: HashMap<Uuid, AccountType>,
    accounts: HashMap<Uuid, Account>,
    account_numbers: HashMap<String, Uuid>,
    /// Per account, in insertion order
    transactions: HashMap<Uuid, Vec<Transaction>>,
    transaction_numbers: HashSet<String>,
    profit_records: HashMap<(Uuid, Period), ProfitSharingRecord>,
    profit_pools: HashMap<Period, Decimal>,
}

struct Inner {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    state: RwLock<MemoryState>,
    account_sequence: AtomicU64,
    lock_timeout: Duration,
}

impl Inner {
    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    fn lock_for(&self, account_id: Uuid) -> Result<Arc<tokio::sync::Mutex<()>>, StoreError> {
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks
            .entry(account_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}

/// Ledger store kept entirely in process memory
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Lock waits longer than `lock_timeout` fail with a concurrency conflict.
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                locks: Mutex::new(HashMap::new()),
                state: RwLock::new(MemoryState::default()),
                account_sequence: AtomicU64::new(FIRST_ACCOUNT_NUMBER),
                lock_timeout,
            }),
        }
    }

    /// Register a savings product.
    pub fn add_account_type(&self, account_type: AccountType) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        state.account_types.insert(account_type.id, account_type);
        Ok(())
    }

    /// Declare the bank's distributable profit for a period.
    pub fn declare_profit(&self, period: Period, amount: Decimal) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        state.profit_pools.insert(period, amount);
        Ok(())
    }

    /// Import an existing account as-is (migration / fixtures).
    pub fn seed_account(&self, account: Account) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        if let Some(existing) = state.account_numbers.get(&account.account_number) {
            if *existing != account.id {
                return Err(StoreError::Duplicate(format!(
                    "account number {}",
                    account.account_number
                )));
            }
        }
        state
            .account_numbers
            .insert(account.account_number.clone(), account.id);
        state.accounts.insert(account.id, account);
        Ok(())
    }

    /// Import a historical transaction as-is (migration / fixtures).
    pub fn seed_transaction(&self, transaction: Transaction) -> Result<(), StoreError> {
        let mut state = self.inner.write()?;
        if !state
            .transaction_numbers
            .insert(transaction.transaction_number.clone())
        {
            return Err(StoreError::Duplicate(format!(
                "transaction number {}",
                transaction.transaction_number
            )));
        }
        state
            .transactions
            .entry(transaction.account_id)
            .or_default()
            .push(transaction);
        Ok(())
    }

    /// Every account, in no particular order
    pub fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.inner.read()?.accounts.values().cloned().collect())
    }

    /// Every transaction of an account, in insertion order
    pub fn transactions_of(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .inner
            .read()?
            .transactions
            .get(&account_id)
            .cloned()
            .unwrap_or_default())
    }

    fn sorted_transactions(&self, account_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions = self.transactions_of(account_id)?;
        transactions.sort_by(|a, b| {
            (a.transaction_at, &a.transaction_number).cmp(&(b.transaction_at, &b.transaction_number))
        });
        Ok(transactions)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn begin(&self, lock_ids: &[Uuid]) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let ids: BTreeSet<Uuid> = lock_ids.iter().copied().collect();
        let mut guards = Vec::with_capacity(ids.len());

        for id in &ids {
            let lock = self.inner.lock_for(*id)?;
            let guard = tokio::time::timeout(self.inner.lock_timeout, lock.lock_owned())
                .await
                .map_err(|_| {
                    StoreError::ConcurrencyConflict(format!(
                        "timed out waiting for lock on account {}",
                        id
                    ))
                })?;
            guards.push(guard);
        }

        tracing::debug!(accounts = ids.len(), "Account locks acquired");

        Ok(Box::new(MemoryUnit {
            inner: self.inner.clone(),
            locked: ids,
            _guards: guards,
            created: HashSet::new(),
            accounts: HashMap::new(),
            transactions: Vec::new(),
            profit_records: HashMap::new(),
        }))
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.read()?.accounts.get(&id).cloned())
    }

    async fn find_account_by_number(&self, number: &str) -> Result<Option<Account>, StoreError> {
        let state = self.inner.read()?;
        Ok(state
            .account_numbers
            .get(number)
            .and_then(|id| state.accounts.get(id))
            .cloned())
    }

    async fn find_account_type(&self, id: Uuid) -> Result<Option<AccountType>, StoreError> {
        Ok(self.inner.read()?.account_types.get(&id).cloned())
    }

    async fn list_profit_sharing_accounts(
        &self,
        opened_before: DateTime<Utc>,
    ) -> Result<Vec<(Account, AccountType)>, StoreError> {
        let state = self.inner.read()?;
        let mut eligible: Vec<(Account, AccountType)> = state
            .accounts
            .values()
            .filter(|a| a.status == AccountStatus::Active && a.opened_at < opened_before)
            .filter_map(|a| {
                state
                    .account_types
                    .get(&a.account_type_id)
                    .filter(|t| t.is_profit_sharing())
                    .map(|t| (a.clone(), t.clone()))
            })
            .collect();
        eligible.sort_by(|a, b| a.0.account_number.cmp(&b.0.account_number));
        Ok(eligible)
    }

    async fn list_dormancy_candidates(
        &self,
        inactive_since: DateTime<Utc>,
    ) -> Result<Vec<Account>, StoreError> {
        let state = self.inner.read()?;
        Ok(state
            .accounts
            .values()
            .filter(|a| {
                a.status == AccountStatus::Active
                    && !a.is_dormant
                    && a.last_activity_at() < inactive_since
            })
            .cloned()
            .collect())
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions = self.sorted_transactions(account_id)?;
        transactions.reverse();
        Ok(transactions
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .collect())
    }

    async fn list_transactions_after(
        &self,
        account_id: Uuid,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .sorted_transactions(account_id)?
            .into_iter()
            .filter(|t| match after {
                Some(cursor) => {
                    (t.transaction_at, &t.transaction_number)
                        > (cursor.transaction_at, &cursor.transaction_number)
                }
                None => true,
            })
            .take(limit.max(1) as usize)
            .collect())
    }

    async fn list_transactions_in_range(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .sorted_transactions(account_id)?
            .into_iter()
            .filter(|t| t.transaction_at >= start && t.transaction_at < end)
            .collect())
    }

    async fn last_transaction_before(
        &self,
        account_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .sorted_transactions(account_id)?
            .into_iter()
            .filter(|t| t.transaction_at < before)
            .last())
    }

    async fn first_transaction_from(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        Ok(self
            .sorted_transactions(account_id)?
            .into_iter()
            .find(|t| t.transaction_at >= from))
    }

    async fn find_profit_record(
        &self,
        account_id: Uuid,
        period: Period,
    ) -> Result<Option<ProfitSharingRecord>, StoreError> {
        Ok(self
            .inner
            .read()?
            .profit_records
            .get(&(account_id, period))
            .cloned())
    }

    async fn list_profit_records(
        &self,
        period: Period,
        status: Option<ProfitSharingStatus>,
    ) -> Result<Vec<ProfitSharingRecord>, StoreError> {
        let state = self.inner.read()?;
        let mut records: Vec<ProfitSharingRecord> = state
            .profit_records
            .values()
            .filter(|r| r.period == period && status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.calculated_at);
        Ok(records)
    }

    async fn distributable_profit(&self, period: Period) -> Result<Option<Decimal>, StoreError> {
        Ok(self.inner.read()?.profit_pools.get(&period).copied())
    }
}

/// Staged writes of one in-memory unit of work
struct MemoryUnit {
    inner: Arc<Inner>,
    locked: BTreeSet<Uuid>,
    _guards: Vec<OwnedMutexGuard<()>>,
    created: HashSet<Uuid>,
    accounts: HashMap<Uuid, Account>,
    transactions: Vec<Transaction>,
    /// Staged record and whether it is a new insert
    profit_records: HashMap<(Uuid, Period), (ProfitSharingRecord, bool)>,
}

impl MemoryUnit {
    fn ensure_owned(&self, account_id: Uuid) -> Result<(), StoreError> {
        if self.locked.contains(&account_id) || self.created.contains(&account_id) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(account_id))
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn insert_account(&mut self, new: NewAccount) -> Result<Account, StoreError> {
        let sequence = self.inner.account_sequence.fetch_add(1, Ordering::SeqCst);
        let account = Account {
            id: Uuid::new_v4(),
            account_number: format!("{:010}", sequence),
            customer_id: new.customer_id,
            account_type_id: new.account_type_id,
            account_name: new.account_name,
            balance: Balance::zero(),
            available_balance: Balance::zero(),
            currency: new.currency,
            status: AccountStatus::Active,
            is_dormant: false,
            dormant_since: None,
            last_transaction_at: None,
            opened_at: new.opened_at,
            closed_at: None,
            updated_at: new.opened_at,
        };
        self.created.insert(account.id);
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn load_account(&mut self, id: Uuid) -> Result<Option<Account>, StoreError> {
        self.ensure_owned(id)?;
        if let Some(staged) = self.accounts.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.read()?.accounts.get(&id).cloned())
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.ensure_owned(account.id)?;
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        self.ensure_owned(transaction.account_id)?;
        let number = &transaction.transaction_number;
        let staged_duplicate = self
            .transactions
            .iter()
            .any(|t| &t.transaction_number == number);
        if staged_duplicate || self.inner.read()?.transaction_numbers.contains(number) {
            return Err(StoreError::Duplicate(format!("transaction number {}", number)));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    async fn insert_profit_record(&mut self, record: &ProfitSharingRecord) -> Result<(), StoreError> {
        self.ensure_owned(record.account_id)?;
        let key = (record.account_id, record.period);
        if self.profit_records.contains_key(&key)
            || self.inner.read()?.profit_records.contains_key(&key)
        {
            return Err(StoreError::Duplicate(format!(
                "profit sharing for account {} period {}",
                record.account_id, record.period
            )));
        }
        self.profit_records.insert(key, (record.clone(), true));
        Ok(())
    }

    async fn load_profit_record(
        &mut self,
        account_id: Uuid,
        period: Period,
    ) -> Result<Option<ProfitSharingRecord>, StoreError> {
        self.ensure_owned(account_id)?;
        if let Some((staged, _)) = self.profit_records.get(&(account_id, period)) {
            return Ok(Some(staged.clone()));
        }
        Ok(self
            .inner
            .read()?
            .profit_records
            .get(&(account_id, period))
            .cloned())
    }

    async fn save_profit_record(&mut self, record: &ProfitSharingRecord) -> Result<(), StoreError> {
        self.ensure_owned(record.account_id)?;
        let key = (record.account_id, record.period);
        let is_new = self
            .profit_records
            .get(&key)
            .map_or(false, |(_, is_new)| *is_new);
        if !is_new && !self.inner.read()?.profit_records.contains_key(&key) {
            return Err(StoreError::InvalidData(format!(
                "no profit sharing record for account {} period {}",
                record.account_id, record.period
            )));
        }
        self.profit_records.insert(key, (record.clone(), is_new));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let unit = *self;
        let mut state = unit.inner.write()?;

        // Constraints are re-checked here: units without a shared lock may
        // have committed in between.
        for transaction in &unit.transactions {
            if state
                .transaction_numbers
                .contains(&transaction.transaction_number)
            {
                return Err(StoreError::Duplicate(format!(
                    "transaction number {}",
                    transaction.transaction_number
                )));
            }
        }
        for (key, (_, is_new)) in &unit.profit_records {
            if *is_new && state.profit_records.contains_key(key) {
                return Err(StoreError::Duplicate(format!(
                    "profit sharing for account {} period {}",
                    key.0, key.1
                )));
            }
        }

        for (id, account) in unit.accounts {
            state
                .account_numbers
                .insert(account.account_number.clone(), id);
            state.accounts.insert(id, account);
        }
        for transaction in unit.transactions {
            state
                .transaction_numbers
                .insert(transaction.transaction_number.clone());
            state
                .transactions
                .entry(transaction.account_id)
                .or_default()
                .push(transaction);
        }
        for (key, (record, _)) in unit.profit_records {
            state.profit_records.insert(key, record);
        }

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        // Staged writes and lock guards are dropped with the unit.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::fixtures::account_with_balance;
    use crate::domain::Amount;

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = InMemoryStore::new();
        let account = account_with_balance(100);
        store.seed_account(account.clone()).unwrap();

        let mut unit = store.begin(&[account.id]).await.unwrap();
        let mut loaded = unit.load_account(account.id).await.unwrap().unwrap();
        loaded
            .apply_credit(&Amount::from_integer(50).unwrap(), Utc::now())
            .unwrap();
        unit.save_account(&loaded).await.unwrap();

        let outside = store.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(outside.balance.value(), Decimal::from(100));

        drop(unit);
        let after_drop = store.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(after_drop.balance.value(), Decimal::from(100));
    }

    #[tokio::test]
    async fn test_commit_applies_writes() {
        let store = InMemoryStore::new();
        let account = account_with_balance(100);
        store.seed_account(account.clone()).unwrap();

        let mut unit = store.begin(&[account.id]).await.unwrap();
        let mut loaded = unit.load_account(account.id).await.unwrap().unwrap();
        loaded
            .apply_debit(&Amount::from_integer(40).unwrap(), Utc::now())
            .unwrap();
        unit.save_account(&loaded).await.unwrap();
        unit.commit().await.unwrap();

        let committed = store.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(committed.balance.value(), Decimal::from(60));
    }

    #[tokio::test]
    async fn test_unlocked_account_is_rejected() {
        let store = InMemoryStore::new();
        let account = account_with_balance(100);
        store.seed_account(account.clone()).unwrap();

        let mut unit = store.begin(&[]).await.unwrap();
        let result = unit.load_account(account.id).await;
        assert!(matches!(result, Err(StoreError::NotLocked(id)) if id == account.id));
    }

    #[tokio::test]
    async fn test_lock_timeout_is_a_conflict() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(20));
        let id = Uuid::new_v4();

        let _held = store.begin(&[id]).await.unwrap();
        let result = store.begin(&[id]).await;
        assert!(matches!(result, Err(StoreError::ConcurrencyConflict(_))));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let store = InMemoryStore::with_lock_timeout(Duration::from_millis(20));
        let id = Uuid::new_v4();

        let held = store.begin(&[id]).await.unwrap();
        drop(held);
        assert!(store.begin(&[id, id]).await.is_ok());
    }

    #[tokio::test]
    async fn test_account_numbers_are_sequential() {
        let store = InMemoryStore::new();
        let mut unit = store.begin(&[]).await.unwrap();
        let new = || NewAccount {
            customer_id: Uuid::new_v4(),
            account_type_id: Uuid::new_v4(),
            account_name: "Saver".to_string(),
            currency: "IDR".to_string(),
            opened_at: Utc::now(),
        };
        let first = unit.insert_account(new()).await.unwrap();
        let second = unit.insert_account(new()).await.unwrap();
        unit.commit().await.unwrap();

        assert_eq!(first.account_number, "1000000001");
        assert_eq!(second.account_number, "1000000002");
        assert!(store
            .find_account_by_number("1000000002")
            .await
            .unwrap()
            .is_some());
    }
}
