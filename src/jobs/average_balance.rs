//! Time-weighted average balance over a run of days

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::Transaction;

/// Mean of the daily closing balances from `first_day` to `last_day`
/// inclusive (UTC days).
///
/// `transactions` must be oldest first. A day's closing balance is the
/// `balance_after` of its last transaction, otherwise the previous day's
/// closing; the day before `first_day` closes at `opening`. Not rounded.
pub fn time_weighted_average(
    opening: Decimal,
    transactions: &[Transaction],
    first_day: NaiveDate,
    last_day: NaiveDate,
) -> Decimal {
    if last_day < first_day {
        return opening;
    }

    let mut pending = transactions.iter().peekable();
    let mut closing = opening;
    let mut total = Decimal::ZERO;
    let mut days: u32 = 0;
    let mut day = first_day;

    loop {
        while let Some(txn) = pending.peek() {
            if txn.transaction_at.date_naive() > day {
                break;
            }
            closing = txn.balance_after;
            pending.next();
        }

        total += closing;
        days += 1;

        if day >= last_day {
            break;
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    total / Decimal::from(days)
}
