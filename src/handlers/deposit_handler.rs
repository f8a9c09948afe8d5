//! Deposit Handler
//!
//! Credits cash to an account and records the Deposit transaction in the
//! same unit of work.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::LedgerSettings;
use crate::domain::policy;
use crate::domain::{
    Amount, Channel, Direction, LedgerEvent, NewTransaction, OperationContext, Transaction,
    TransactionCategory,
};
use crate::error::AppResult;
use crate::ledger::{AccountLedger, TransactionNumberGenerator, TransactionRecorder};
use crate::notification::NotificationDispatcher;
use crate::store::LedgerStore;

use super::{find_by_number, parse_amount, DepositCommand};

/// Handler for cash deposits
pub struct DepositHandler {
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    recorder: TransactionRecorder,
    settings: LedgerSettings,
    notifications: NotificationDispatcher,
}

impl DepositHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        settings: LedgerSettings,
        notifications: NotificationDispatcher,
    ) -> Self {
        Self {
            ledger: AccountLedger::new(store.clone(), settings.retry),
            recorder: TransactionRecorder::new(
                store.clone(),
                TransactionNumberGenerator::new(settings.transaction_number_prefix.clone()),
            ),
            store,
            settings,
            notifications,
        }
    }

    /// Execute the deposit command
    pub async fn execute(
        &self,
        command: DepositCommand,
        context: &OperationContext,
    ) -> AppResult<Transaction> {
        let amount = parse_amount(&command.amount, &self.settings.currency)?;
        let account = find_by_number(self.store.as_ref(), &command.account_number).await?;

        // Fail fast; re-checked under the lock
        policy::assert_transactable(&account)?;

        let description = command
            .description
            .unwrap_or_else(|| "Cash deposit".to_string());
        let transaction = self
            .settings
            .retry
            .run(|| self.post(account.id, amount, &description, context.channel))
            .await?;

        tracing::info!(
            account_id = %account.id,
            transaction_number = %transaction.transaction_number,
            amount = %transaction.amount,
            correlation_id = ?context.correlation_id,
            "Deposit posted"
        );
        self.notifications
            .publish(LedgerEvent::posted(&transaction), context);

        Ok(transaction)
    }

    async fn post(
        &self,
        account_id: Uuid,
        amount: Amount,
        description: &str,
        channel: Channel,
    ) -> AppResult<Transaction> {
        let mut uow = self.store.begin(&[account_id]).await?;
        let now = Utc::now();

        let posting = self.ledger.credit(uow.as_mut(), account_id, &amount, now).await?;
        let transaction = self
            .recorder
            .record(
                uow.as_mut(),
                NewTransaction {
                    account_id,
                    category: TransactionCategory::Deposit,
                    direction: Direction::Credit,
                    amount,
                    description: description.to_string(),
                    change: posting.change,
                    channel,
                    counterparty: None,
                    transaction_at: now,
                },
            )
            .await?;

        uow.commit().await?;
        Ok(transaction)
    }
}
