//! Common test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use sharia_ledger::domain::ProfitSharingScheme;
use sharia_ledger::notification::LoggingNotifier;
use sharia_ledger::{
    Account, AccountStatus, AccountType, BankingService, Balance, InMemoryStore, LedgerSettings,
};

static NEXT_NUMBER: AtomicU64 = AtomicU64::new(5_000_000_001);

/// Active IDR account with `balance`, not yet stored
pub fn account(account_type_id: Uuid, balance: Decimal) -> Account {
    let now = Utc::now();
    let balance = Balance::new(balance).expect("non-negative balance");
    Account {
        id: Uuid::new_v4(),
        account_number: format!("{:010}", NEXT_NUMBER.fetch_add(1, Ordering::Relaxed)),
        customer_id: Uuid::new_v4(),
        account_type_id,
        account_name: "Nasabah Uji".to_string(),
        balance,
        available_balance: balance,
        currency: "IDR".to_string(),
        status: AccountStatus::Active,
        is_dormant: false,
        dormant_since: None,
        last_transaction_at: None,
        opened_at: now,
        closed_at: None,
        updated_at: now,
    }
}

pub fn wadiah() -> AccountType {
    AccountType {
        id: Uuid::new_v4(),
        code: "TWD".to_string(),
        name: "Tabungan Wadiah".to_string(),
        minimum_balance: Decimal::ZERO,
        scheme: None,
        sharing_percentage: Decimal::ZERO,
        currency: "IDR".to_string(),
    }
}

pub fn mudharabah(sharing_percentage: Decimal) -> AccountType {
    AccountType {
        id: Uuid::new_v4(),
        code: "TMD".to_string(),
        name: "Tabungan Mudharabah".to_string(),
        minimum_balance: Decimal::ZERO,
        scheme: Some(ProfitSharingScheme::Mudharabah),
        sharing_percentage,
        currency: "IDR".to_string(),
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .expect("valid date")
}

/// In-memory store with one Wadiah product registered
pub fn setup_store() -> (Arc<InMemoryStore>, AccountType) {
    let store = Arc::new(InMemoryStore::new());
    let product = wadiah();
    store
        .add_account_type(product.clone())
        .expect("register product");
    (store, product)
}

/// Store and seed one account per balance
pub fn seed_accounts(
    store: &InMemoryStore,
    product: &AccountType,
    balances: &[Decimal],
) -> Vec<Account> {
    balances
        .iter()
        .map(|b| {
            let account = account(product.id, *b);
            store.seed_account(account.clone()).expect("seed account");
            account
        })
        .collect()
}

pub fn service(store: Arc<InMemoryStore>) -> BankingService {
    BankingService::new(store, LedgerSettings::default(), Arc::new(LoggingNotifier))
}

/// Setup test database - truncate ledger tables.
///
/// Returns `None` when `DATABASE_URL` is not set.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query(
        "TRUNCATE TABLE profit_sharing, profit_pools, transactions, accounts, account_types CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    Some(pool)
}
