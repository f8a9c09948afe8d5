//! Ledger Events
//!
//! Facts published to notification channels after a unit of work commits.
//! They are informational only; the ledger state never depends on them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountStatus;
use super::transaction::{Direction, Transaction, TransactionCategory};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    AccountOpened {
        account_id: Uuid,
        account_number: String,
        customer_id: Uuid,
        opened_at: DateTime<Utc>,
    },

    TransactionPosted {
        account_id: Uuid,
        transaction_number: String,
        category: TransactionCategory,
        direction: Direction,
        amount: Decimal,
        balance_after: Decimal,
        posted_at: DateTime<Utc>,
    },

    TransferCompleted {
        debit_transaction_number: String,
        credit_transaction_number: String,
        from_account_id: Uuid,
        to_account_id: Uuid,
        amount: Decimal,
        completed_at: DateTime<Utc>,
    },

    ProfitDistributed {
        account_id: Uuid,
        period: String,
        customer_share: Decimal,
        distribution_date: NaiveDate,
    },

    AccountStatusChanged {
        account_id: Uuid,
        from: AccountStatus,
        to: AccountStatus,
        changed_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::AccountOpened { .. } => "AccountOpened",
            LedgerEvent::TransactionPosted { .. } => "TransactionPosted",
            LedgerEvent::TransferCompleted { .. } => "TransferCompleted",
            LedgerEvent::ProfitDistributed { .. } => "ProfitDistributed",
            LedgerEvent::AccountStatusChanged { .. } => "AccountStatusChanged",
        }
    }

    pub fn posted(txn: &Transaction) -> Self {
        LedgerEvent::TransactionPosted {
            account_id: txn.account_id,
            transaction_number: txn.transaction_number.clone(),
            category: txn.category,
            direction: txn.direction,
            amount: txn.amount,
            balance_after: txn.balance_after,
            posted_at: txn.transaction_at,
        }
    }
}
