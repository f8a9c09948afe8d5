//! Profit-Sharing Engine
//!
//! Monthly batch: split the bank's declared profit pool across eligible
//! accounts by time-weighted average balance, then credit each customer
//! share exactly once. Every account is its own unit of work, so one
//! failing account never blocks the others.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::LedgerSettings;
use crate::domain::{
    Account, AccountType, Amount, AmountError, Channel, Currency, Direction, DomainError, LedgerEvent,
    NewTransaction, OperationContext, Period, ProfitSharingRecord, ProfitSharingStatus,
    Transaction, TransactionCategory,
};
use crate::error::{AppError, AppResult};
use crate::ledger::{AccountLedger, TransactionNumberGenerator, TransactionRecorder};
use crate::notification::NotificationDispatcher;
use crate::store::{LedgerStore, RetryPolicy, StoreError};

use super::average_balance::time_weighted_average;

/// A record whose customer share could not be credited
#[derive(Debug, Clone, Serialize)]
pub struct DistributionFailure {
    pub record_id: Uuid,
    pub account_id: Uuid,
    pub error: String,
}

/// Outcome of one distribution pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct DistributionReport {
    pub distributed: usize,
    /// Already distributed by a concurrent pass
    pub skipped: usize,
    /// These records stay `Calculated` and are retried by the next pass
    pub failures: Vec<DistributionFailure>,
    /// Stopped early on shutdown
    pub cancelled: bool,
}

/// Outcome of `run`
#[derive(Debug, Clone, Serialize)]
pub struct ProfitSharingRun {
    pub period: Period,
    pub calculated: usize,
    pub distribution: DistributionReport,
    /// Every record of the period was already settled; nothing was done
    pub duplicate_period: bool,
}

/// Calculates and distributes profit shares per period
pub struct ProfitSharingEngine {
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    recorder: TransactionRecorder,
    currency: Currency,
    retry: RetryPolicy,
    notifications: NotificationDispatcher,
}

impl ProfitSharingEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        settings: &LedgerSettings,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            ledger: AccountLedger::new(store.clone(), settings.retry),
            recorder: TransactionRecorder::new(
                store.clone(),
                TransactionNumberGenerator::new(settings.transaction_number_prefix.clone()),
            ),
            store,
            currency: settings.currency.clone(),
            retry: settings.retry,
            notifications,
        }
    }

    // =========================================================================
    // Calculation
    // =========================================================================

    /// Create a `Calculated` record for every eligible account that has none
    /// for `period` yet. Safe to re-run; returns only the new records.
    pub async fn calculate_for_period(&self, period: Period) -> AppResult<Vec<ProfitSharingRecord>> {
        let today = Utc::now().date_naive();
        if period.first_day() > today {
            return Err(DomainError::InvalidPeriod(format!("{} has not started", period)).into());
        }

        let pool = self
            .store
            .distributable_profit(period)
            .await?
            .ok_or_else(|| DomainError::ProfitPoolNotDeclared(period.to_string()))?;

        // Shares already attributed are final; only the rest of the pool is
        // split, and only across accounts that have no record yet.
        let existing = self.store.list_profit_records(period, None).await?;
        let attributed: Decimal = existing.iter().map(|r| r.total_profit).sum();
        let settled: HashSet<Uuid> = existing.iter().map(|r| r.account_id).collect();

        let eligible = self.store.list_profit_sharing_accounts(period.end()).await?;

        let mut total_average = Decimal::ZERO;
        let mut pending = Vec::new();
        for (account, account_type) in eligible {
            if settled.contains(&account.id) {
                continue;
            }

            let average = self.average_balance(&account, period, today).await?;
            if average.is_zero() {
                continue;
            }
            total_average += average;
            pending.push((account, account_type, average));
        }

        if pending.is_empty() || total_average.is_zero() {
            tracing::info!(period = %period, "No new profit sharing records");
            return Ok(Vec::new());
        }

        let remaining = match Amount::new(pool - attributed) {
            Ok(remaining) => remaining,
            Err(AmountError::NotPositive(_)) => {
                tracing::warn!(
                    period = %period,
                    pool = %pool,
                    attributed = %attributed,
                    accounts = pending.len(),
                    "Profit pool already fully attributed"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(DomainError::from(e).into()),
        };

        let mut unallocated = remaining.value();
        let mut created = Vec::with_capacity(pending.len());
        for (account, account_type, average) in pending {
            let weight = average.checked_div(total_average).ok_or_else(|| {
                AppError::Internal(format!("profit weight overflow for account {}", account.id))
            })?;
            // Half-up rounding must not overshoot what is left
            let account_share = remaining
                .mul_ratio(weight, &self.currency)
                .map_err(DomainError::from)?
                .min(unallocated);
            unallocated -= account_share;

            let record = self.build_record(&account, &account_type, period, average, account_share)?;

            match self.retry.run(|| self.insert_record(&record)).await {
                Ok(()) => created.push(record),
                Err(AppError::Domain(DomainError::DuplicatePeriod { .. })) => {
                    tracing::debug!(
                        account_id = %account.id,
                        period = %period,
                        "Record created concurrently, skipping"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            period = %period,
            records = created.len(),
            pool = %pool,
            "Profit sharing calculated"
        );
        Ok(created)
    }

    /// Time-weighted average of daily closing balances, up to today.
    async fn average_balance(
        &self,
        account: &Account,
        period: Period,
        today: NaiveDate,
    ) -> AppResult<Decimal> {
        let opening = match self
            .store
            .last_transaction_before(account.id, period.start())
            .await?
        {
            Some(txn) => txn.balance_after,
            None => match self
                .store
                .first_transaction_from(account.id, period.start())
                .await?
            {
                Some(txn) => txn.balance_before,
                None => account.balance.value(),
            },
        };

        let transactions = self
            .store
            .list_transactions_in_range(account.id, period.start(), period.end())
            .await?;

        let last_day = period.last_day().min(today);
        let average = time_weighted_average(opening, &transactions, period.first_day(), last_day);
        Ok(self.currency.round(average))
    }

    fn build_record(
        &self,
        account: &Account,
        account_type: &AccountType,
        period: Period,
        average: Decimal,
        account_share: Decimal,
    ) -> AppResult<ProfitSharingRecord> {
        let customer_share = match Amount::new(account_share) {
            Ok(share) => share
                .mul_ratio(account_type.sharing_ratio(), &self.currency)
                .map_err(DomainError::from)?,
            Err(_) => Decimal::ZERO,
        };
        // Rounding remainder stays with the bank
        let bank_share = account_share - customer_share;

        Ok(ProfitSharingRecord {
            id: Uuid::new_v4(),
            account_id: account.id,
            period,
            average_balance: average,
            total_profit: account_share,
            sharing_percentage: account_type.sharing_percentage,
            customer_share,
            bank_share,
            status: ProfitSharingStatus::Calculated,
            calculated_at: Utc::now(),
            distribution_date: None,
            transaction_id: None,
        })
    }

    async fn insert_record(&self, record: &ProfitSharingRecord) -> AppResult<()> {
        let lift = |e: StoreError| -> AppError {
            match e {
                StoreError::Duplicate(_) => DomainError::DuplicatePeriod {
                    period: record.period.to_string(),
                }
                .into(),
                other => other.into(),
            }
        };

        let mut uow = self.store.begin(&[record.account_id]).await?;
        uow.insert_profit_record(record).await.map_err(lift)?;
        uow.commit().await.map_err(lift)?;
        Ok(())
    }

    // =========================================================================
    // Distribution
    // =========================================================================

    /// Credit every `Calculated` record of `period`. Checks `cancel` between
    /// accounts; failures are reported and leave the record `Calculated`.
    pub async fn distribute(
        &self,
        period: Period,
        cancel: &CancellationToken,
    ) -> AppResult<DistributionReport> {
        let records = self
            .store
            .list_profit_records(period, Some(ProfitSharingStatus::Calculated))
            .await?;
        let mut report = DistributionReport::default();
        let context = OperationContext::system();

        for record in records {
            if cancel.is_cancelled() {
                tracing::warn!(period = %period, "Profit distribution cancelled");
                report.cancelled = true;
                break;
            }

            match self
                .retry
                .run(|| self.distribute_one(record.account_id, period))
                .await
            {
                Ok(Some((distributed, _))) => {
                    report.distributed += 1;
                    self.notifications.publish(
                        LedgerEvent::ProfitDistributed {
                            account_id: distributed.account_id,
                            period: period.to_string(),
                            customer_share: distributed.customer_share,
                            distribution_date: distributed
                                .distribution_date
                                .unwrap_or_else(|| Utc::now().date_naive()),
                        },
                        &context,
                    );
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(
                        record_id = %record.id,
                        account_id = %record.account_id,
                        period = %period,
                        error = %e,
                        "Profit distribution failed"
                    );
                    report.failures.push(DistributionFailure {
                        record_id: record.id,
                        account_id: record.account_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            period = %period,
            distributed = report.distributed,
            skipped = report.skipped,
            failed = report.failures.len(),
            "Profit distribution finished"
        );
        Ok(report)
    }

    /// Credit one account's share and settle its record in one unit.
    async fn distribute_one(
        &self,
        account_id: Uuid,
        period: Period,
    ) -> AppResult<Option<(ProfitSharingRecord, Option<Transaction>)>> {
        let mut uow = self.store.begin(&[account_id]).await?;

        let mut record = match uow.load_profit_record(account_id, period).await? {
            Some(r) if r.status == ProfitSharingStatus::Calculated => r,
            _ => return Ok(None),
        };

        let today = Utc::now().date_naive();
        let transaction = if record.customer_share > Decimal::ZERO {
            let amount = Amount::for_currency(record.customer_share, &self.currency)?;
            let now = Utc::now();
            let posting = self.ledger.credit(uow.as_mut(), account_id, &amount, now).await?;
            let txn = self
                .recorder
                .record(
                    uow.as_mut(),
                    NewTransaction {
                        account_id,
                        category: TransactionCategory::Profit,
                        direction: Direction::Credit,
                        amount,
                        description: format!("Profit sharing {}", period),
                        change: posting.change,
                        channel: Channel::System,
                        counterparty: None,
                        transaction_at: now,
                    },
                )
                .await?;
            Some(txn)
        } else {
            None
        };

        record.mark_distributed(today, transaction.as_ref().map(|t| t.id));
        uow.save_profit_record(&record).await?;
        uow.commit().await?;

        Ok(Some((record, transaction)))
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Calculate then distribute. A period with nothing left to settle is a
    /// no-op reported as `duplicate_period`.
    pub async fn run(&self, period: Period, cancel: &CancellationToken) -> AppResult<ProfitSharingRun> {
        let created = self.calculate_for_period(period).await?;
        let records = self.store.list_profit_records(period, None).await?;

        let unsettled = records
            .iter()
            .any(|r| r.status == ProfitSharingStatus::Calculated);
        if created.is_empty() && !records.is_empty() && !unsettled {
            let duplicate = DomainError::DuplicatePeriod {
                period: period.to_string(),
            };
            tracing::info!(period = %period, "{}; nothing to do", duplicate);
            return Ok(ProfitSharingRun {
                period,
                calculated: 0,
                distribution: DistributionReport::default(),
                duplicate_period: true,
            });
        }

        let distribution = self.distribute(period, cancel).await?;
        Ok(ProfitSharingRun {
            period,
            calculated: created.len(),
            distribution,
            duplicate_period: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::fixtures::account_with_balance;
    use crate::domain::ProfitSharingScheme;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    fn mudharabah(percentage: Decimal) -> AccountType {
        AccountType {
            id: Uuid::new_v4(),
            code: "MDH".to_string(),
            name: "Tabungan Mudharabah".to_string(),
            minimum_balance: Decimal::ZERO,
            scheme: Some(ProfitSharingScheme::Mudharabah),
            sharing_percentage: percentage,
            currency: "IDR".to_string(),
        }
    }

    fn setup() -> (Arc<InMemoryStore>, ProfitSharingEngine) {
        let store = Arc::new(InMemoryStore::new());
        let engine = ProfitSharingEngine::new(
            store.clone(),
            &LedgerSettings::default(),
            NotificationDispatcher::logging(),
        );
        (store, engine)
    }

    #[tokio::test]
    async fn test_missing_pool_is_reported() {
        let (_store, engine) = setup();
        let period = Period::new(2024, 1).unwrap();

        let result = engine.calculate_for_period(period).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::ProfitPoolNotDeclared(_)))
        ));
    }

    #[tokio::test]
    async fn test_future_period_rejected() {
        let (_store, engine) = setup();
        let next = Period::containing(Utc::now()).next();

        let result = engine.calculate_for_period(next).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InvalidPeriod(_)))
        ));
    }

    #[tokio::test]
    async fn test_remainder_goes_to_bank() {
        let (store, engine) = setup();
        let product = mudharabah(dec!(33.33));
        store.add_account_type(product.clone()).unwrap();

        let period = Period::new(2024, 1).unwrap();
        let mut account = account_with_balance(100_000);
        account.account_type_id = product.id;
        account.opened_at = period.start() - chrono::Duration::days(30);
        store.seed_account(account.clone()).unwrap();
        store.declare_profit(period, dec!(1000.01)).unwrap();

        let records = engine.calculate_for_period(period).await.unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.total_profit, dec!(1000.01));
        // 1000.01 * 0.3333 = 333.303333 -> 333.30
        assert_eq!(record.customer_share, dec!(333.30));
        assert_eq!(record.bank_share, dec!(666.71));
        assert_eq!(record.customer_share + record.bank_share, record.total_profit);
    }

    #[tokio::test]
    async fn test_zero_customer_share_settles_without_credit() {
        let (store, engine) = setup();
        let product = mudharabah(Decimal::ZERO);
        store.add_account_type(product.clone()).unwrap();

        let period = Period::new(2024, 1).unwrap();
        let mut account = account_with_balance(100_000);
        account.account_type_id = product.id;
        account.opened_at = period.start() - chrono::Duration::days(30);
        store.seed_account(account.clone()).unwrap();
        store.declare_profit(period, dec!(500)).unwrap();

        let run = engine.run(period, &CancellationToken::new()).await.unwrap();
        assert_eq!(run.distribution.distributed, 1);

        let record = store.find_profit_record(account.id, period).await.unwrap().unwrap();
        assert!(record.is_distributed());
        assert!(record.transaction_id.is_none());
        assert!(store.transactions_of(account.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_distribution_stops_before_first_account() {
        let (store, engine) = setup();
        let product = mudharabah(dec!(50));
        store.add_account_type(product.clone()).unwrap();

        let period = Period::new(2024, 1).unwrap();
        let mut account = account_with_balance(100_000);
        account.account_type_id = product.id;
        account.opened_at = period.start() - chrono::Duration::days(30);
        store.seed_account(account.clone()).unwrap();
        store.declare_profit(period, dec!(500)).unwrap();

        engine.calculate_for_period(period).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine.distribute(period, &cancel).await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.distributed, 0);

        let record = store.find_profit_record(account.id, period).await.unwrap().unwrap();
        assert_eq!(record.status, ProfitSharingStatus::Calculated);
    }
}
