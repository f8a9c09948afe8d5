//! Postgres ledger store
//!
//! One database transaction per unit of work. Account rows in the lock set
//! are taken with `SELECT ... ORDER BY id FOR UPDATE` under a
//! `SET LOCAL lock_timeout`, so contention surfaces as SQLSTATE 55P03 and is
//! mapped to a concurrency conflict.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Account, AccountStatus, AccountType, Balance, Counterparty, Period, ProfitSharingRecord,
    ProfitSharingScheme, ProfitSharingStatus, Transaction,
};

use super::{HistoryCursor, LedgerStore, NewAccount, Page, StoreError, UnitOfWork};

const ACCOUNT_COLUMNS: &str = "id, account_number, customer_id, account_type_id, account_name, \
     balance, available_balance, currency, status, is_dormant, dormant_since, \
     last_transaction_at, opened_at, closed_at, updated_at";

const ACCOUNT_TYPE_COLUMNS: &str =
    "id, code, name, minimum_balance, profit_sharing_scheme, sharing_percentage, currency";

const TRANSACTION_COLUMNS: &str = "id, transaction_number, account_id, category, direction, \
     amount, description, balance_before, balance_after, status, channel, \
     counterparty_account_id, counterparty_account_number, counterparty_name, \
     transaction_at, value_date";

const PROFIT_COLUMNS: &str = "id, account_id, period_year, period_month, average_balance, \
     total_profit, sharing_percentage, customer_share, bank_share, status, calculated_at, \
     distribution_date, transaction_id";

// =========================================================================
// Row mapping
// =========================================================================

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    account_number: String,
    customer_id: Uuid,
    account_type_id: Uuid,
    account_name: String,
    balance: Decimal,
    available_balance: Decimal,
    currency: String,
    status: String,
    is_dormant: bool,
    dormant_since: Option<DateTime<Utc>>,
    last_transaction_at: Option<DateTime<Utc>>,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let status: AccountStatus = row.status.parse().map_err(StoreError::InvalidData)?;
        let balance = Balance::new(row.balance)
            .map_err(|e| StoreError::InvalidData(format!("account {}: {}", row.id, e)))?;
        let available_balance = Balance::new(row.available_balance)
            .map_err(|e| StoreError::InvalidData(format!("account {}: {}", row.id, e)))?;

        Ok(Account {
            id: row.id,
            account_number: row.account_number,
            customer_id: row.customer_id,
            account_type_id: row.account_type_id,
            account_name: row.account_name,
            balance,
            available_balance,
            currency: row.currency,
            status,
            is_dormant: row.is_dormant,
            dormant_since: row.dormant_since,
            last_transaction_at: row.last_transaction_at,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AccountTypeRow {
    id: Uuid,
    code: String,
    name: String,
    minimum_balance: Decimal,
    profit_sharing_scheme: Option<String>,
    sharing_percentage: Decimal,
    currency: String,
}

impl TryFrom<AccountTypeRow> for AccountType {
    type Error = StoreError;

    fn try_from(row: AccountTypeRow) -> Result<Self, Self::Error> {
        let scheme = row
            .profit_sharing_scheme
            .as_deref()
            .map(str::parse::<ProfitSharingScheme>)
            .transpose()
            .map_err(StoreError::InvalidData)?;

        Ok(AccountType {
            id: row.id,
            code: row.code,
            name: row.name,
            minimum_balance: row.minimum_balance,
            scheme,
            sharing_percentage: row.sharing_percentage,
            currency: row.currency,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    transaction_number: String,
    account_id: Uuid,
    category: String,
    direction: String,
    amount: Decimal,
    description: String,
    balance_before: Decimal,
    balance_after: Decimal,
    status: String,
    channel: String,
    counterparty_account_id: Option<Uuid>,
    counterparty_account_number: Option<String>,
    counterparty_name: Option<String>,
    transaction_at: DateTime<Utc>,
    value_date: NaiveDate,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let counterparty = match (
            row.counterparty_account_id,
            row.counterparty_account_number,
        ) {
            (Some(account_id), Some(account_number)) => Some(Counterparty {
                account_id,
                account_number,
                name: row.counterparty_name.unwrap_or_default(),
            }),
            _ => None,
        };

        Ok(Transaction {
            id: row.id,
            transaction_number: row.transaction_number,
            account_id: row.account_id,
            category: row.category.parse().map_err(StoreError::InvalidData)?,
            direction: row.direction.parse().map_err(StoreError::InvalidData)?,
            amount: row.amount,
            description: row.description,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            status: row.status.parse().map_err(StoreError::InvalidData)?,
            channel: row.channel.parse().map_err(StoreError::InvalidData)?,
            counterparty,
            transaction_at: row.transaction_at,
            value_date: row.value_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfitRow {
    id: Uuid,
    account_id: Uuid,
    period_year: i32,
    period_month: i32,
    average_balance: Decimal,
    total_profit: Decimal,
    sharing_percentage: Decimal,
    customer_share: Decimal,
    bank_share: Decimal,
    status: String,
    calculated_at: DateTime<Utc>,
    distribution_date: Option<NaiveDate>,
    transaction_id: Option<Uuid>,
}

impl TryFrom<ProfitRow> for ProfitSharingRecord {
    type Error = StoreError;

    fn try_from(row: ProfitRow) -> Result<Self, Self::Error> {
        let month = u32::try_from(row.period_month)
            .map_err(|_| StoreError::InvalidData(format!("month {}", row.period_month)))?;
        let period = Period::new(row.period_year, month)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;

        Ok(ProfitSharingRecord {
            id: row.id,
            account_id: row.account_id,
            period,
            average_balance: row.average_balance,
            total_profit: row.total_profit,
            sharing_percentage: row.sharing_percentage,
            customer_share: row.customer_share,
            bank_share: row.bank_share,
            status: row.status.parse().map_err(StoreError::InvalidData)?,
            calculated_at: row.calculated_at,
            distribution_date: row.distribution_date,
            transaction_id: row.transaction_id,
        })
    }
}

fn collect<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// =========================================================================
// Store
// =========================================================================

/// Ledger store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_account_types(
        &self,
        ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, AccountType>, StoreError> {
        let sql = format!(
            "SELECT {} FROM account_types WHERE id = ANY($1)",
            ACCOUNT_TYPE_COLUMNS
        );
        let rows: Vec<AccountTypeRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        let types: Vec<AccountType> = collect(rows)?;
        Ok(types.into_iter().map(|t| (t.id, t)).collect())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self, lock_ids: &[Uuid]) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let locked: BTreeSet<Uuid> = lock_ids.iter().copied().collect();
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters
        let timeout = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&timeout).execute(&mut *tx).await?;

        if !locked.is_empty() {
            let ids: Vec<Uuid> = locked.iter().copied().collect();
            sqlx::query("SELECT id FROM accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE")
                .bind(ids)
                .fetch_all(&mut *tx)
                .await?;
            tracing::debug!(accounts = locked.len(), "Account rows locked");
        }

        Ok(Box::new(PgUnit {
            tx,
            locked,
            created: HashSet::new(),
        }))
    }

    async fn find_account(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Account::try_from).transpose()
    }

    async fn find_account_by_number(&self, number: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE account_number = $1",
            ACCOUNT_COLUMNS
        );
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Account::try_from).transpose()
    }

    async fn find_account_type(&self, id: Uuid) -> Result<Option<AccountType>, StoreError> {
        let sql = format!(
            "SELECT {} FROM account_types WHERE id = $1",
            ACCOUNT_TYPE_COLUMNS
        );
        let row: Option<AccountTypeRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AccountType::try_from).transpose()
    }

    async fn list_profit_sharing_accounts(
        &self,
        opened_before: DateTime<Utc>,
    ) -> Result<Vec<(Account, AccountType)>, StoreError> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.account_number, a.customer_id, a.account_type_id, a.account_name,
                   a.balance, a.available_balance, a.currency, a.status, a.is_dormant,
                   a.dormant_since, a.last_transaction_at, a.opened_at, a.closed_at, a.updated_at
            FROM accounts a
            JOIN account_types t ON t.id = a.account_type_id
            WHERE a.status = 'active'
              AND a.opened_at < $1
              AND t.profit_sharing_scheme IS NOT NULL
            ORDER BY a.account_number
            "#,
        )
        .bind(opened_before)
        .fetch_all(&self.pool)
        .await?;

        let accounts: Vec<Account> = collect(rows)?;
        let type_ids: Vec<Uuid> = accounts
            .iter()
            .map(|a| a.account_type_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let types = self.load_account_types(type_ids).await?;

        accounts
            .into_iter()
            .map(|account| {
                let account_type = types.get(&account.account_type_id).cloned().ok_or_else(|| {
                    StoreError::InvalidData(format!(
                        "account {} references missing account type {}",
                        account.id, account.account_type_id
                    ))
                })?;
                Ok((account, account_type))
            })
            .collect()
    }

    async fn list_dormancy_candidates(
        &self,
        inactive_since: DateTime<Utc>,
    ) -> Result<Vec<Account>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM accounts
            WHERE status = 'active'
              AND NOT is_dormant
              AND COALESCE(last_transaction_at, opened_at) < $1
            "#,
            ACCOUNT_COLUMNS
        );
        let rows: Vec<AccountRow> = sqlx::query_as(&sql)
            .bind(inactive_since)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn list_transactions(
        &self,
        account_id: Uuid,
        page: Page,
    ) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1
            ORDER BY transaction_at DESC, transaction_number DESC
            LIMIT $2 OFFSET $3
            "#,
            TRANSACTION_COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(i64::from(page.size))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn list_transactions_after(
        &self,
        account_id: Uuid,
        after: Option<&HistoryCursor>,
        limit: u32,
    ) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR (transaction_at, transaction_number) > ($2, $3::text))
            ORDER BY transaction_at ASC, transaction_number ASC
            LIMIT $4
            "#,
            TRANSACTION_COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(after.map(|c| c.transaction_at))
            .bind(after.map(|c| c.transaction_number.clone()))
            .bind(i64::from(limit.max(1)))
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn list_transactions_in_range(
        &self,
        account_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1 AND transaction_at >= $2 AND transaction_at < $3
            ORDER BY transaction_at ASC, transaction_number ASC
            "#,
            TRANSACTION_COLUMNS
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn last_transaction_before(
        &self,
        account_id: Uuid,
        before: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1 AND transaction_at < $2
            ORDER BY transaction_at DESC, transaction_number DESC
            LIMIT 1
            "#,
            TRANSACTION_COLUMNS
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(before)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn first_transaction_from(
        &self,
        account_id: Uuid,
        from: DateTime<Utc>,
    ) -> Result<Option<Transaction>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM transactions
            WHERE account_id = $1 AND transaction_at >= $2
            ORDER BY transaction_at ASC, transaction_number ASC
            LIMIT 1
            "#,
            TRANSACTION_COLUMNS
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(from)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn find_profit_record(
        &self,
        account_id: Uuid,
        period: Period,
    ) -> Result<Option<ProfitSharingRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM profit_sharing
            WHERE account_id = $1 AND period_year = $2 AND period_month = $3
            "#,
            PROFIT_COLUMNS
        );
        let row: Option<ProfitRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(period.year())
            .bind(period.month() as i32)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ProfitSharingRecord::try_from).transpose()
    }

    async fn list_profit_records(
        &self,
        period: Period,
        status: Option<ProfitSharingStatus>,
    ) -> Result<Vec<ProfitSharingRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM profit_sharing
            WHERE period_year = $1 AND period_month = $2
              AND ($3::text IS NULL OR status = $3)
            ORDER BY calculated_at
            "#,
            PROFIT_COLUMNS
        );
        let rows: Vec<ProfitRow> = sqlx::query_as(&sql)
            .bind(period.year())
            .bind(period.month() as i32)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        collect(rows)
    }

    async fn distributable_profit(&self, period: Period) -> Result<Option<Decimal>, StoreError> {
        let amount: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT distributable_profit FROM profit_pools
            WHERE period_year = $1 AND period_month = $2
            "#,
        )
        .bind(period.year())
        .bind(period.month() as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(amount)
    }
}

// =========================================================================
// Unit of work
// =========================================================================

struct PgUnit {
    tx: sqlx::Transaction<'static, Postgres>,
    locked: BTreeSet<Uuid>,
    created: HashSet<Uuid>,
}

impl PgUnit {
    fn ensure_owned(&self, account_id: Uuid) -> Result<(), StoreError> {
        if self.locked.contains(&account_id) || self.created.contains(&account_id) {
            Ok(())
        } else {
            Err(StoreError::NotLocked(account_id))
        }
    }
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn insert_account(&mut self, new: NewAccount) -> Result<Account, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO accounts (
                id, account_number, customer_id, account_type_id, account_name,
                balance, available_balance, currency, status, is_dormant,
                opened_at, updated_at
            )
            VALUES (
                $1, LPAD(nextval('account_number_seq')::text, 10, '0'), $2, $3, $4,
                0, 0, $5, 'active', FALSE, $6, $6
            )
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        let row: AccountRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(new.customer_id)
            .bind(new.account_type_id)
            .bind(&new.account_name)
            .bind(&new.currency)
            .bind(new.opened_at)
            .fetch_one(&mut *self.tx)
            .await?;

        let account = Account::try_from(row)?;
        self.created.insert(account.id);
        Ok(account)
    }

    async fn load_account(&mut self, id: Uuid) -> Result<Option<Account>, StoreError> {
        self.ensure_owned(id)?;
        let sql = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Account::try_from).transpose()
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.ensure_owned(account.id)?;
        sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, available_balance = $3, status = $4, is_dormant = $5,
                dormant_since = $6, last_transaction_at = $7, closed_at = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(account.balance.value())
        .bind(account.available_balance.value())
        .bind(account.status.as_str())
        .bind(account.is_dormant)
        .bind(account.dormant_since)
        .bind(account.last_transaction_at)
        .bind(account.closed_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        self.ensure_owned(transaction.account_id)?;
        let counterparty = transaction.counterparty.as_ref();
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, transaction_number, account_id, category, direction, amount, description,
                balance_before, balance_after, status, channel,
                counterparty_account_id, counterparty_account_number, counterparty_name,
                transaction_at, value_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(transaction.id)
        .bind(&transaction.transaction_number)
        .bind(transaction.account_id)
        .bind(transaction.category.as_str())
        .bind(transaction.direction.as_str())
        .bind(transaction.amount)
        .bind(&transaction.description)
        .bind(transaction.balance_before)
        .bind(transaction.balance_after)
        .bind(transaction.status.as_str())
        .bind(transaction.channel.as_str())
        .bind(counterparty.map(|c| c.account_id))
        .bind(counterparty.map(|c| c.account_number.clone()))
        .bind(counterparty.map(|c| c.name.clone()))
        .bind(transaction.transaction_at)
        .bind(transaction.value_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_profit_record(&mut self, record: &ProfitSharingRecord) -> Result<(), StoreError> {
        self.ensure_owned(record.account_id)?;
        sqlx::query(
            r#"
            INSERT INTO profit_sharing (
                id, account_id, period_year, period_month, average_balance, total_profit,
                sharing_percentage, customer_share, bank_share, status, calculated_at,
                distribution_date, transaction_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(record.id)
        .bind(record.account_id)
        .bind(record.period.year())
        .bind(record.period.month() as i32)
        .bind(record.average_balance)
        .bind(record.total_profit)
        .bind(record.sharing_percentage)
        .bind(record.customer_share)
        .bind(record.bank_share)
        .bind(record.status.as_str())
        .bind(record.calculated_at)
        .bind(record.distribution_date)
        .bind(record.transaction_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn load_profit_record(
        &mut self,
        account_id: Uuid,
        period: Period,
    ) -> Result<Option<ProfitSharingRecord>, StoreError> {
        self.ensure_owned(account_id)?;
        let sql = format!(
            r#"
            SELECT {} FROM profit_sharing
            WHERE account_id = $1 AND period_year = $2 AND period_month = $3
            "#,
            PROFIT_COLUMNS
        );
        let row: Option<ProfitRow> = sqlx::query_as(&sql)
            .bind(account_id)
            .bind(period.year())
            .bind(period.month() as i32)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(ProfitSharingRecord::try_from).transpose()
    }

    async fn save_profit_record(&mut self, record: &ProfitSharingRecord) -> Result<(), StoreError> {
        self.ensure_owned(record.account_id)?;
        let result = sqlx::query(
            r#"
            UPDATE profit_sharing
            SET status = $2, distribution_date = $3, transaction_id = $4
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.distribution_date)
        .bind(record.transaction_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::InvalidData(format!(
                "no profit sharing record for account {} period {}",
                record.account_id, record.period
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
