//! Transaction records
//!
//! A transaction is written exactly once per ledger mutation and never
//! changed afterwards; a reversal is a new offsetting transaction.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::account::BalanceChange;
use super::amount::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionCategory {
    Deposit,
    Withdrawal,
    TransferIn,
    TransferOut,
    Profit,
    Fee,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::Deposit => "deposit",
            TransactionCategory::Withdrawal => "withdrawal",
            TransactionCategory::TransferIn => "transfer_in",
            TransactionCategory::TransferOut => "transfer_out",
            TransactionCategory::Profit => "profit",
            TransactionCategory::Fee => "fee",
        }
    }
}

impl FromStr for TransactionCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionCategory::Deposit),
            "withdrawal" => Ok(TransactionCategory::Withdrawal),
            "transfer_in" => Ok(TransactionCategory::TransferIn),
            "transfer_out" => Ok(TransactionCategory::TransferOut),
            "profit" => Ok(TransactionCategory::Profit),
            "fee" => Ok(TransactionCategory::Fee),
            other => Err(format!("unknown transaction category '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Settlement status. Only `Completed` exists: there is no async settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        "completed"
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(TransactionStatus::Completed),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Where a mutation originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Teller,
    Atm,
    Mobile,
    Internet,
    System,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Teller => "teller",
            Channel::Atm => "atm",
            Channel::Mobile => "mobile",
            Channel::Internet => "internet",
            Channel::System => "system",
        }
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::Teller
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teller" => Ok(Channel::Teller),
            "atm" => Ok(Channel::Atm),
            "mobile" => Ok(Channel::Mobile),
            "internet" => Ok(Channel::Internet),
            "system" => Ok(Channel::System),
            other => Err(format!("unknown channel '{}'", other)),
        }
    }
}

/// Other side of a transfer leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub account_id: Uuid,
    pub account_number: String,
    pub name: String,
}

/// Immutable ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub transaction_number: String,
    pub account_id: Uuid,
    pub category: TransactionCategory,
    pub direction: Direction,
    pub amount: Decimal,
    pub description: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub status: TransactionStatus,
    pub channel: Channel,
    pub counterparty: Option<Counterparty>,
    pub transaction_at: DateTime<Utc>,
    pub value_date: NaiveDate,
}

impl Transaction {
    /// `balance_after - balance_before` must equal the signed amount.
    pub fn is_consistent(&self) -> bool {
        if self.amount <= Decimal::ZERO {
            return false;
        }
        match self.direction {
            Direction::Credit => self.balance_after == self.balance_before + self.amount,
            Direction::Debit => self.balance_after == self.balance_before - self.amount,
        }
    }

    /// Signed effect on the balance
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Input to the recorder: everything except the generated identity.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: Uuid,
    pub category: TransactionCategory,
    pub direction: Direction,
    pub amount: Amount,
    pub description: String,
    pub change: BalanceChange,
    pub channel: Channel,
    pub counterparty: Option<Counterparty>,
    pub transaction_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(direction: Direction, before: i64, amount: i64, after: i64) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            transaction_number: "TRX1".to_string(),
            account_id: Uuid::new_v4(),
            category: TransactionCategory::Deposit,
            direction,
            amount: Decimal::from(amount),
            description: String::new(),
            balance_before: Decimal::from(before),
            balance_after: Decimal::from(after),
            status: TransactionStatus::Completed,
            channel: Channel::Teller,
            counterparty: None,
            transaction_at: now,
            value_date: now.date_naive(),
        }
    }

    #[test]
    fn test_consistency_by_direction() {
        assert!(sample(Direction::Credit, 100, 50, 150).is_consistent());
        assert!(sample(Direction::Debit, 100, 50, 50).is_consistent());
        assert!(!sample(Direction::Debit, 100, 50, 150).is_consistent());
        assert!(!sample(Direction::Credit, 100, 0, 100).is_consistent());
    }

    #[test]
    fn test_category_serialization() {
        let json = serde_json::to_string(&TransactionCategory::TransferOut).unwrap();
        assert_eq!(json, r#""transfer_out""#);
        assert_eq!(
            "transfer_out".parse::<TransactionCategory>(),
            Ok(TransactionCategory::TransferOut)
        );
    }
}
