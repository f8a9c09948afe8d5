//! Open Account Handler
//!
//! Creates the account and, when an opening deposit is given, credits it and
//! records the "Initial Deposit" transaction in the same unit of work.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::config::LedgerSettings;
use crate::domain::policy;
use crate::domain::{
    Amount, AccountType, Direction, DomainError, LedgerEvent, NewTransaction, OperationContext,
    TransactionCategory,
};
use crate::error::AppResult;
use crate::ledger::{AccountLedger, TransactionNumberGenerator, TransactionRecorder};
use crate::notification::NotificationDispatcher;
use crate::store::{LedgerStore, NewAccount};

use super::{parse_amount, OpenAccountCommand, OpenAccountResult};

const INITIAL_DEPOSIT: &str = "Initial Deposit";

/// Handler for account opening
pub struct OpenAccountHandler {
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    recorder: TransactionRecorder,
    settings: LedgerSettings,
    notifications: NotificationDispatcher,
}

impl OpenAccountHandler {
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

    /// Execute the open account command
    pub async fn execute(
        &self,
        command: OpenAccountCommand,
        context: &OperationContext,
    ) -> AppResult<OpenAccountResult> {
        let account_name = command.account_name.trim().to_string();
        if account_name.is_empty() {
            return Err(DomainError::BusinessRuleViolation(
                "account name is required".to_string(),
            )
            .into());
        }

        let account_type = self
            .store
            .find_account_type(command.account_type_id)
            .await?
            .ok_or_else(|| DomainError::AccountTypeNotFound(command.account_type_id.to_string()))?;

        if account_type.currency != self.settings.currency.code {
            return Err(DomainError::BusinessRuleViolation(format!(
                "product {} is booked in {}, ledger currency is {}",
                account_type.code, account_type.currency, self.settings.currency.code
            ))
            .into());
        }

        let initial_deposit = self.opening_deposit(command.initial_deposit.as_deref())?;
        let opening_value = initial_deposit.map_or(Decimal::ZERO, |a| a.value());
        policy::assert_minimum_balance(&account_type, opening_value)?;

        let new_account = NewAccount {
            customer_id: command.customer_id,
            account_type_id: account_type.id,
            account_name,
            currency: self.settings.currency.code.clone(),
            opened_at: Utc::now(),
        };

        let result = self
            .settings
            .retry
            .run(|| self.open(&account_type, new_account.clone(), initial_deposit, context))
            .await?;

        tracing::info!(
            account_id = %result.account.id,
            account_number = %result.account.account_number,
            product = %account_type.code,
            opening_balance = %result.account.balance,
            correlation_id = ?context.correlation_id,
            "Account opened"
        );

        self.notifications.publish(
            LedgerEvent::AccountOpened {
                account_id: result.account.id,
                account_number: result.account.account_number.clone(),
                customer_id: result.account.customer_id,
                opened_at: result.account.opened_at,
            },
            context,
        );
        if let Some(transaction) = &result.initial_deposit {
            self.notifications
                .publish(LedgerEvent::posted(transaction), context);
        }

        Ok(result)
    }

    /// Missing or zero means no opening deposit; negatives are rejected.
    fn opening_deposit(&self, raw: Option<&str>) -> Result<Option<Amount>, DomainError> {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(None);
        };
        match raw.parse::<Decimal>() {
            Ok(value) if value.is_zero() => Ok(None),
            Ok(_) => parse_amount(raw, &self.settings.currency).map(Some),
            Err(_) => Err(DomainError::InvalidAmount(format!(
                "'{}' is not a decimal number",
                raw
            ))),
        }
    }

    async fn open(
        &self,
        account_type: &AccountType,
        new_account: NewAccount,
        initial_deposit: Option<Amount>,
        context: &OperationContext,
    ) -> AppResult<OpenAccountResult> {
        let mut uow = self.store.begin(&[]).await?;
        let mut account = uow.insert_account(new_account).await?;

        let mut transaction = None;
        if let Some(amount) = initial_deposit {
            let now = Utc::now();
            let posting = self.ledger.credit(uow.as_mut(), account.id, &amount, now).await?;
            let recorded = self
                .recorder
                .record(
                    uow.as_mut(),
                    NewTransaction {
                        account_id: account.id,
                        category: TransactionCategory::Deposit,
                        direction: Direction::Credit,
                        amount,
                        description: INITIAL_DEPOSIT.to_string(),
                        change: posting.change,
                        channel: context.channel,
                        counterparty: None,
                        transaction_at: now,
                    },
                )
                .await?;
            account = posting.account;
            transaction = Some(recorded);
        }

        uow.commit().await?;

        tracing::debug!(
            account_id = %account.id,
            product = %account_type.code,
            "Account row created"
        );

        Ok(OpenAccountResult {
            account,
            initial_deposit: transaction,
        })
    }
}
