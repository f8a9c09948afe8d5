//! Profit sharing integration tests against the in-memory store

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sharia_ledger::domain::{
    Channel, Direction, ProfitSharingStatus, TransactionCategory, TransactionStatus,
};
use sharia_ledger::jobs::ProfitSharingEngine;
use sharia_ledger::ledger::AccountLedger;
use sharia_ledger::notification::NotificationDispatcher;
use sharia_ledger::store::RetryPolicy;
use sharia_ledger::{
    Account, AccountStatus, AccountType, DomainError, InMemoryStore, LedgerSettings, LedgerStore, Period,
    Transaction,
};

mod common;

fn january() -> Period {
    Period::new(2024, 1).unwrap()
}

struct Fixture {
    store: Arc<InMemoryStore>,
    engine: ProfitSharingEngine,
    product: AccountType,
}

fn fixture(sharing_percentage: Decimal, pool: Decimal) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let product = common::mudharabah(sharing_percentage);
    store.add_account_type(product.clone()).unwrap();
    store.declare_profit(january(), pool).unwrap();
    let engine = ProfitSharingEngine::new(
        store.clone(),
        &LedgerSettings::default(),
        NotificationDispatcher::logging(),
    );
    Fixture {
        store,
        engine,
        product,
    }
}

/// Account opened well before January 2024 with a flat balance
fn seed_saver(fixture: &Fixture, balance: Decimal) -> Account {
    let mut account = common::account(fixture.product.id, balance);
    account.opened_at = common::utc(2023, 6, 1);
    fixture.store.seed_account(account.clone()).unwrap();
    account
}

fn deposit_on(account: &Account, day: NaiveDate, before: Decimal, after: Decimal) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        transaction_number: format!("TRX{}", Uuid::new_v4().simple()).to_uppercase(),
        account_id: account.id,
        category: TransactionCategory::Deposit,
        direction: Direction::Credit,
        amount: after - before,
        description: "Cash deposit".to_string(),
        balance_before: before,
        balance_after: after,
        status: TransactionStatus::Completed,
        channel: Channel::Teller,
        counterparty: None,
        transaction_at: common::utc(day.year(), day.month(), day.day()) + Duration::hours(9),
        value_date: day,
    }
}

#[tokio::test]
async fn test_shares_follow_average_balance_weights() {
    let fx = fixture(dec!(65), dec!(1000000));
    let small = seed_saver(&fx, dec!(100000));
    let large = seed_saver(&fx, dec!(300000));

    let records = fx.engine.calculate_for_period(january()).await.unwrap();
    assert_eq!(records.len(), 2);

    let of = |account: &Account| {
        records
            .iter()
            .find(|r| r.account_id == account.id)
            .cloned()
            .unwrap()
    };

    let small_record = of(&small);
    assert_eq!(small_record.average_balance, dec!(100000));
    assert_eq!(small_record.total_profit, dec!(250000));
    assert_eq!(small_record.customer_share, dec!(162500));
    assert_eq!(small_record.bank_share, dec!(87500));

    let large_record = of(&large);
    assert_eq!(large_record.total_profit, dec!(750000));
    assert_eq!(large_record.customer_share, dec!(487500));
    assert_eq!(large_record.bank_share, dec!(262500));

    for record in &records {
        assert_eq!(record.customer_share + record.bank_share, record.total_profit);
        assert_eq!(record.status, ProfitSharingStatus::Calculated);
    }
}

#[tokio::test]
async fn test_calculation_is_idempotent() {
    let fx = fixture(dec!(65), dec!(1000000));
    seed_saver(&fx, dec!(100000));
    seed_saver(&fx, dec!(300000));

    let first = fx.engine.calculate_for_period(january()).await.unwrap();
    let second = fx.engine.calculate_for_period(january()).await.unwrap();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    let stored = fx.store.list_profit_records(january(), None).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn test_concurrent_calculations_create_one_record_per_account() {
    let fx = Arc::new(fixture(dec!(50), dec!(500000)));
    for _ in 0..5 {
        seed_saver(&fx, dec!(20000));
    }

    let runs: Vec<_> = (0..3)
        .map(|_| {
            let fx = fx.clone();
            tokio::spawn(async move { fx.engine.calculate_for_period(january()).await })
        })
        .collect();

    let mut created = 0;
    for run in runs {
        created += run.await.unwrap().unwrap().len();
    }

    assert_eq!(created, 5);
    assert_eq!(
        fx.store.list_profit_records(january(), None).await.unwrap().len(),
        5
    );
}

#[tokio::test]
async fn test_mid_month_deposit_is_time_weighted() {
    let fx = fixture(dec!(60), dec!(300000));
    let flat = seed_saver(&fx, dec!(150000));
    let late = seed_saver(&fx, dec!(310000));
    fx.store
        .seed_transaction(deposit_on(
            &late,
            NaiveDate::from_ymd_opt(2024, 1, 17).unwrap(),
            dec!(0),
            dec!(310000),
        ))
        .unwrap();

    let records = fx.engine.calculate_for_period(january()).await.unwrap();
    let late_record = records.iter().find(|r| r.account_id == late.id).unwrap();
    let flat_record = records.iter().find(|r| r.account_id == flat.id).unwrap();

    assert_eq!(late_record.average_balance, dec!(150000));
    assert_eq!(late_record.total_profit, flat_record.total_profit);
    assert_eq!(late_record.customer_share, dec!(90000));
}

#[tokio::test]
async fn test_run_distributes_once() {
    let fx = fixture(dec!(65), dec!(1000000));
    let small = seed_saver(&fx, dec!(100000));
    let large = seed_saver(&fx, dec!(300000));
    let cancel = CancellationToken::new();

    let run = fx.engine.run(january(), &cancel).await.unwrap();
    assert_eq!(run.calculated, 2);
    assert_eq!(run.distribution.distributed, 2);
    assert!(run.distribution.failures.is_empty());
    assert!(!run.duplicate_period);

    let balance = |a: &Account| {
        let store = fx.store.clone();
        let id = a.id;
        async move { store.find_account(id).await.unwrap().unwrap().balance.value() }
    };
    assert_eq!(balance(&small).await, dec!(262500));
    assert_eq!(balance(&large).await, dec!(787500));

    let history = fx.store.transactions_of(small.id).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].category, TransactionCategory::Profit);
    assert_eq!(history[0].amount, dec!(162500));

    let record = fx
        .store
        .find_profit_record(small.id, january())
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_distributed());
    assert_eq!(record.transaction_id, Some(history[0].id));

    let again = fx.engine.run(january(), &cancel).await.unwrap();
    assert!(again.duplicate_period);
    assert_eq!(again.distribution.distributed, 0);
    assert_eq!(balance(&small).await, dec!(262500));
    assert_eq!(fx.store.transactions_of(small.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_dormant_account_failure_does_not_block_others() {
    let fx = fixture(dec!(50), dec!(200000));
    let mut dormant = common::account(fx.product.id, dec!(100000));
    dormant.opened_at = common::utc(2023, 6, 1);
    dormant.mark_dormant(common::utc(2023, 12, 31));
    fx.store.seed_account(dormant.clone()).unwrap();
    let active = seed_saver(&fx, dec!(100000));

    let run = fx
        .engine
        .run(january(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.calculated, 2);
    assert_eq!(run.distribution.distributed, 1);
    assert_eq!(run.distribution.failures.len(), 1);
    assert_eq!(run.distribution.failures[0].account_id, dormant.id);

    let pending = fx
        .store
        .find_profit_record(dormant.id, january())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pending.status, ProfitSharingStatus::Calculated);
    let paid = fx
        .store
        .find_profit_record(active.id, january())
        .await
        .unwrap()
        .unwrap();
    assert!(paid.is_distributed());
}

#[tokio::test]
async fn test_undeclared_pool_is_reported() {
    let fx = fixture(dec!(65), dec!(1000000));
    seed_saver(&fx, dec!(100000));

    let err = fx
        .engine
        .calculate_for_period(Period::new(2024, 2).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(
        err.domain(),
        Some(DomainError::ProfitPoolNotDeclared(_))
    ));
}

#[tokio::test]
async fn test_wadiah_accounts_are_not_eligible() {
    let fx = fixture(dec!(65), dec!(1000000));
    let wadiah = common::wadiah();
    fx.store.add_account_type(wadiah.clone()).unwrap();
    let mut account = common::account(wadiah.id, dec!(500000));
    account.opened_at = common::utc(2023, 6, 1);
    fx.store.seed_account(account).unwrap();

    let records = fx.engine.calculate_for_period(january()).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_late_eligible_account_never_exceeds_pool() {
    let fx = fixture(dec!(100), dec!(1000000));
    let early = seed_saver(&fx, dec!(100000));
    let mut late = common::account(fx.product.id, dec!(100000));
    late.opened_at = common::utc(2023, 6, 1);
    late.status = AccountStatus::Frozen;
    fx.store.seed_account(late.clone()).unwrap();

    let first = fx.engine.calculate_for_period(january()).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].account_id, early.id);
    assert_eq!(first[0].total_profit, dec!(1000000));

    let ledger = AccountLedger::new(fx.store.clone(), RetryPolicy::default());
    ledger.set_status(late.id, AccountStatus::Active).await.unwrap();
    // The first account leaving the eligible set must not free its share
    ledger.set_status(early.id, AccountStatus::Frozen).await.unwrap();

    let second = fx.engine.calculate_for_period(january()).await.unwrap();
    assert!(second.is_empty());

    let stored = fx.store.list_profit_records(january(), None).await.unwrap();
    let attributed: Decimal = stored.iter().map(|r| r.total_profit).sum();
    assert_eq!(attributed, dec!(1000000));
    assert!(fx
        .store
        .find_profit_record(late.id, january())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_rounded_shares_stay_within_pool() {
    // Three equal savers: 100.01 / 3 rounds up to 33.34 each
    let fx = fixture(dec!(50), dec!(100.01));
    for _ in 0..3 {
        seed_saver(&fx, dec!(1000));
    }

    let records = fx.engine.calculate_for_period(january()).await.unwrap();
    assert_eq!(records.len(), 3);

    let attributed: Decimal = records.iter().map(|r| r.total_profit).sum();
    assert!(attributed <= dec!(100.01));
    for record in &records {
        assert_eq!(record.customer_share + record.bank_share, record.total_profit);
    }
}
