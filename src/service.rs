//! Banking Service
//!
//! The narrow contract the core exposes to an outer API layer: open an
//! account, post cash, transfer, read balances and history, and run the
//! monthly profit sharing. Everything is addressed by account number.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::LedgerSettings;
use crate::domain::{
    Account, AccountStatus, Balance, LedgerEvent, OperationContext, Period, Transaction,
};
use crate::error::AppResult;
use crate::handlers::{
    find_by_number, DepositCommand, DepositHandler, OpenAccountCommand, OpenAccountHandler,
    TransferCommand, TransferHandler, WithdrawCommand, WithdrawHandler,
};
use crate::jobs::{ProfitSharingEngine, ProfitSharingRun};
use crate::ledger::{AccountLedger, TransactionNumberGenerator, TransactionRecorder};
use crate::notification::{NotificationDispatcher, Notifier};
use crate::store::{HistoryCursor, LedgerStore};

const HISTORY_PAGE_SIZE: u32 = 500;

/// Half-open `[start, end)` window over transaction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The whole calendar month
    pub fn of_period(period: Period) -> Self {
        Self::new(period.start(), period.end())
    }
}

pub struct BankingService {
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    recorder: TransactionRecorder,
    open_account: OpenAccountHandler,
    deposit: DepositHandler,
    withdraw: WithdrawHandler,
    transfer: TransferHandler,
    profit_sharing: ProfitSharingEngine,
    notifications: NotificationDispatcher,
}

impl BankingService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        settings: LedgerSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let notifications = NotificationDispatcher::new(notifier);
        Self {
            ledger: AccountLedger::new(store.clone(), settings.retry),
            recorder: TransactionRecorder::new(
                store.clone(),
                TransactionNumberGenerator::new(settings.transaction_number_prefix.clone()),
            ),
            open_account: OpenAccountHandler::new(
                store.clone(),
                settings.clone(),
                notifications.clone(),
            ),
            deposit: DepositHandler::new(store.clone(), settings.clone(), notifications.clone()),
            withdraw: WithdrawHandler::new(store.clone(), settings.clone(), notifications.clone()),
            transfer: TransferHandler::new(store.clone(), settings.clone(), notifications.clone()),
            profit_sharing: ProfitSharingEngine::new(
                store.clone(),
                &settings,
                notifications.clone(),
            ),
            store,
            notifications,
        }
    }

    pub async fn open_account(
        &self,
        command: OpenAccountCommand,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let result = self.open_account.execute(command, context).await?;
        Ok(result.account)
    }

    pub async fn deposit(
        &self,
        command: DepositCommand,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        self.deposit.execute(command, context).await
    }

    pub async fn withdraw(
        &self,
        command: WithdrawCommand,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        self.withdraw.execute(command, context).await
    }

    /// Returns the debit leg; the credit leg is in the destination's history.
    pub async fn transfer(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        let result = self.transfer.execute(command, context).await?;
        Ok(result.debit)
    }

    pub async fn get_balance(&self, account_number: &str) -> AppResult<Balance> {
        let account = find_by_number(self.store.as_ref(), account_number).await?;
        self.ledger.get_balance(account.id).await
    }

    /// Oldest first. Without a range the full history is returned.
    pub async fn list_transactions(
        &self,
        account_number: &str,
        range: Option<DateRange>,
    ) -> AppResult<Vec<Transaction>> {
        let account = find_by_number(self.store.as_ref(), account_number).await?;

        if let Some(range) = range {
            return self
                .recorder
                .list_by_account_and_date_range(account.id, range.start, range.end)
                .await;
        }

        let mut history: Vec<Transaction> = Vec::new();
        loop {
            let cursor = history.last().map(HistoryCursor::from);
            let batch = self
                .recorder
                .list_by_account_after(account.id, cursor.as_ref(), HISTORY_PAGE_SIZE)
                .await?;
            let done = batch.len() < HISTORY_PAGE_SIZE as usize;
            history.extend(batch);
            if done {
                break;
            }
        }
        Ok(history)
    }

    /// Calculate and distribute the profit of `period`. Re-running a
    /// distributed period is a no-op reported as `duplicate_period`.
    pub async fn run_profit_sharing(
        &self,
        period: Period,
        cancel: &CancellationToken,
    ) -> AppResult<ProfitSharingRun> {
        self.profit_sharing.run(period, cancel).await
    }

    pub async fn set_status(
        &self,
        account_number: &str,
        status: AccountStatus,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let account = find_by_number(self.store.as_ref(), account_number).await?;
        let change = self.ledger.set_status(account.id, status).await?;

        self.notifications.publish(
            LedgerEvent::AccountStatusChanged {
                account_id: account.id,
                from: change.from,
                to: status,
                changed_at: change.account.updated_at,
            },
            context,
        );

        Ok(change.account)
    }

    /// Clear the dormancy flag after the customer shows up again
    pub async fn reactivate(&self, account_number: &str) -> AppResult<Account> {
        let account = find_by_number(self.store.as_ref(), account_number).await?;
        self.ledger.reactivate(account.id).await
    }
}
