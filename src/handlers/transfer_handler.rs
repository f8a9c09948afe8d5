//! Transfer Handler
//!
//! Transfer orchestration: validate both accounts, lock them in ascending id
//! order, debit the source, credit the destination and record both legs in
//! one unit of work. Any failure after the debit rolls the whole unit back.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::LedgerSettings;
use crate::domain::policy;
use crate::domain::{
    Account, Amount, Channel, Counterparty, Direction, DomainError, LedgerEvent, NewTransaction,
    OperationContext, TransactionCategory,
};
use crate::error::AppResult;
use crate::ledger::{AccountLedger, TransactionNumberGenerator, TransactionRecorder};
use crate::notification::NotificationDispatcher;
use crate::store::LedgerStore;

use super::{find_by_number, parse_amount, TransferCommand, TransferResult};

/// Handler for account-to-account transfers
pub struct TransferHandler {
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    recorder: TransactionRecorder,
    settings: LedgerSettings,
    notifications: NotificationDispatcher,
}

impl TransferHandler {
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

    /// Execute the transfer command (account numbers)
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> AppResult<TransferResult> {
        let amount = parse_amount(&command.amount, &self.settings.currency)?;
        if command.from_account_number == command.to_account_number {
            return Err(self_transfer().into());
        }

        let from = find_by_number(self.store.as_ref(), &command.from_account_number).await?;
        let to = find_by_number(self.store.as_ref(), &command.to_account_number).await?;

        self.transfer_between(from, to, amount, command.description, context)
            .await
    }

    /// Transfer by account id
    pub async fn transfer(
        &self,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Amount,
        description: Option<String>,
        context: &OperationContext,
    ) -> AppResult<TransferResult> {
        if from_account_id == to_account_id {
            return Err(self_transfer().into());
        }

        let from = self.find(from_account_id).await?;
        let to = self.find(to_account_id).await?;

        self.transfer_between(from, to, amount, description, context)
            .await
    }

    async fn find(&self, account_id: Uuid) -> AppResult<Account> {
        self.store
            .find_account(account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound(account_id.to_string()).into())
    }

    async fn transfer_between(
        &self,
        from: Account,
        to: Account,
        amount: Amount,
        description: Option<String>,
        context: &OperationContext,
    ) -> AppResult<TransferResult> {
        if from.currency != to.currency {
            return Err(DomainError::InvalidTransfer(format!(
                "currency mismatch: {} -> {}",
                from.currency, to.currency
            ))
            .into());
        }

        // Advisory checks without locks; all of them repeat inside the unit
        policy::assert_transactable(&from)?;
        policy::assert_transactable(&to)?;
        if !from.available_balance.is_sufficient_for(&amount) {
            return Err(DomainError::insufficient_balance(
                amount.value(),
                from.available_balance.value(),
            )
            .into());
        }

        let result = self
            .settings
            .retry
            .run(|| self.try_transfer(from.id, to.id, amount, description.as_deref(), context.channel))
            .await?;

        tracing::info!(
            from_account_id = %from.id,
            to_account_id = %to.id,
            amount = %amount,
            debit_transaction = %result.debit.transaction_number,
            credit_transaction = %result.credit.transaction_number,
            correlation_id = ?context.correlation_id,
            "Transfer completed"
        );

        self.notifications.publish(
            LedgerEvent::TransferCompleted {
                debit_transaction_number: result.debit.transaction_number.clone(),
                credit_transaction_number: result.credit.transaction_number.clone(),
                from_account_id: from.id,
                to_account_id: to.id,
                amount: amount.value(),
                completed_at: result.debit.transaction_at,
            },
            context,
        );

        Ok(result)
    }

    async fn try_transfer(
        &self,
        from_id: Uuid,
        to_id: Uuid,
        amount: Amount,
        description: Option<&str>,
        channel: Channel,
    ) -> AppResult<TransferResult> {
        let mut uow = self.store.begin(&[from_id, to_id]).await?;
        let now = Utc::now();

        let debit = self.ledger.debit(uow.as_mut(), from_id, &amount, now).await?;
        let credit = self.ledger.credit(uow.as_mut(), to_id, &amount, now).await?;

        let debit_description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Transfer to {}", credit.account.account_number));
        let credit_description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Transfer from {}", debit.account.account_number));

        let debit_txn = self
            .recorder
            .record(
                uow.as_mut(),
                NewTransaction {
                    account_id: from_id,
                    category: TransactionCategory::TransferOut,
                    direction: Direction::Debit,
                    amount,
                    description: debit_description,
                    change: debit.change,
                    channel,
                    counterparty: Some(counterparty_of(&credit.account)),
                    transaction_at: now,
                },
            )
            .await?;

        let credit_txn = self
            .recorder
            .record(
                uow.as_mut(),
                NewTransaction {
                    account_id: to_id,
                    category: TransactionCategory::TransferIn,
                    direction: Direction::Credit,
                    amount,
                    description: credit_description,
                    change: credit.change,
                    channel,
                    counterparty: Some(counterparty_of(&debit.account)),
                    transaction_at: now,
                },
            )
            .await?;

        uow.commit().await?;

        Ok(TransferResult {
            debit: debit_txn,
            credit: credit_txn,
        })
    }
}

fn self_transfer() -> DomainError {
    DomainError::InvalidTransfer("cannot transfer to the same account".to_string())
}

fn counterparty_of(account: &Account) -> Counterparty {
    Counterparty {
        account_id: account.id,
        account_number: account.account_number.clone(),
        name: account.account_name.clone(),
    }
}
