//! Domain module
//!
//! Core domain types and business rules.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod policy;
pub mod profit_sharing;
pub mod transaction;

pub use account::{Account, AccountStatus, AccountType, BalanceChange, ProfitSharingScheme};
pub use amount::{round_half_up, Amount, AmountError, Balance, Currency};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::LedgerEvent;
pub use profit_sharing::{Period, ProfitSharingRecord, ProfitSharingStatus};
pub use transaction::{
    Channel, Counterparty, Direction, NewTransaction, Transaction, TransactionCategory,
    TransactionStatus,
};
