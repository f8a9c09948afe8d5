//! Command definitions
//!
//! Commands represent intentions to change ledger state. Amounts travel as
//! decimal strings and are parsed by the handler against the ledger currency.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Account, Transaction};

// =========================================================================
// OpenAccountCommand
// =========================================================================

/// Command to open a savings account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountCommand {
    pub customer_id: Uuid,
    pub account_type_id: Uuid,
    pub account_name: String,
    /// Opening deposit (as string for precise decimal); none or zero opens empty
    pub initial_deposit: Option<String>,
}

impl OpenAccountCommand {
    pub fn new(customer_id: Uuid, account_type_id: Uuid, account_name: String) -> Self {
        Self {
            customer_id,
            account_type_id,
            account_name,
            initial_deposit: None,
        }
    }

    pub fn with_initial_deposit(mut self, amount: impl Into<String>) -> Self {
        self.initial_deposit = Some(amount.into());
        self
    }
}

/// Result of opening an account
#[derive(Debug, Clone, Serialize)]
pub struct OpenAccountResult {
    pub account: Account,
    /// "Initial Deposit" transaction, when one was made
    pub initial_deposit: Option<Transaction>,
}

// =========================================================================
// DepositCommand / WithdrawCommand
// =========================================================================

/// Command to credit cash to an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account_number: String,
    pub amount: String,
    pub description: Option<String>,
}

impl DepositCommand {
    pub fn new(account_number: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            amount: amount.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Command to pay cash out of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCommand {
    pub account_number: String,
    pub amount: String,
    pub description: Option<String>,
}

impl WithdrawCommand {
    pub fn new(account_number: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            amount: amount.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// =========================================================================
// TransferCommand
// =========================================================================

/// Command to move money between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_number: String,
    pub to_account_number: String,
    pub amount: String,
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(
        from_account_number: impl Into<String>,
        to_account_number: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            from_account_number: from_account_number.into(),
            to_account_number: to_account_number.into(),
            amount: amount.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Both legs of a completed transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub debit: Transaction,
    pub credit: Transaction,
}
