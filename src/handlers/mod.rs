//! Command Handlers module
//!
//! One handler per external ledger operation. A handler validates the
//! command, opens a unit of work with the account locks it needs, and
//! publishes notifications only after commit.

mod commands;
mod deposit_handler;
mod open_account_handler;
mod transfer_handler;
mod withdraw_handler;


use rust_decimal::Decimal;

use crate::domain::{Account, Amount, Currency, DomainError};
use crate::error::AppResult;
use crate::store::LedgerStore;

pub use commands::*;
pub use deposit_handler::DepositHandler;
pub use open_account_handler::OpenAccountHandler;
pub use transfer_handler::TransferHandler;
pub use withdraw_handler::WithdrawHandler;

/// Parse a raw decimal string into a positive amount of `currency`.
pub(crate) fn parse_amount(raw: &str, currency: &Currency) -> Result<Amount, DomainError> {
    let value: Decimal = raw
        .trim()
        .parse()
        .map_err(|_| DomainError::InvalidAmount(format!("'{}' is not a decimal number", raw)))?;
    Ok(Amount::for_currency(value, currency)?)
}

pub(crate) async fn find_by_number(store: &dyn LedgerStore, number: &str) -> AppResult<Account> {
    store
        .find_account_by_number(number)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(number.to_string()).into())
}
