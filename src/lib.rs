//! sharia_ledger Library
//!
//! Core of a Sharia retail savings ledger: accounts, transactions,
//! transfers and monthly profit sharing. Re-exports modules for
//! integration testing and the binaries.

pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod notification;
pub mod service;
pub mod store;

pub use config::{Config, LedgerSettings};
pub use domain::{
    Account, AccountStatus, AccountType, Amount, AmountError, Balance, Currency, DomainError,
    OperationContext, Period, Transaction,
};
pub use error::{AppError, AppResult};
pub use service::{BankingService, DateRange};
pub use store::{InMemoryStore, LedgerStore, PgStore, StoreError, UnitOfWork};
