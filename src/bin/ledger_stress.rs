//! Ledger stress tool
//!
//! Fires concurrent random deposits, withdrawals and transfers at an
//! in-memory ledger and verifies that money is conserved and no balance
//! went negative.
//!
//! Run with: cargo run --bin ledger_stress --release -- --ops 10000 --accounts 20 --workers 8 --seed 42

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use uuid::Uuid;

use sharia_ledger::handlers::{DepositCommand, OpenAccountCommand, TransferCommand, WithdrawCommand};
use sharia_ledger::notification::LoggingNotifier;
use sharia_ledger::{
    AccountType, AppError, BankingService, DomainError, InMemoryStore, LedgerSettings,
    OperationContext,
};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    succeeded: u64,
    rejected: u64,
    conflicts: u64,
    /// Net money added from outside (deposits minus withdrawals)
    net_inflow: Decimal,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.succeeded += other.succeeded;
        self.rejected += other.rejected;
        self.conflicts += other.conflicts;
        self.net_inflow += other.net_inflow;
    }

    fn count_error(&mut self, err: &AppError) -> anyhow::Result<()> {
        match err.domain() {
            Some(DomainError::ConcurrencyConflict(_)) => self.conflicts += 1,
            Some(DomainError::InsufficientBalance { .. }) => self.rejected += 1,
            _ => return Err(anyhow::anyhow!("unexpected failure: {}", err)),
        }
        Ok(())
    }
}

fn arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

async fn worker(
    service: Arc<BankingService>,
    numbers: Arc<Vec<String>>,
    ops: u64,
    seed: u64,
) -> anyhow::Result<Tally> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tally = Tally::default();
    let ctx = OperationContext::new().with_correlation_id(Uuid::new_v4());

    for _ in 0..ops {
        let from = &numbers[rng.gen_range(0..numbers.len())];
        let amount = Decimal::from(rng.gen_range(1..=500_000u64));

        match rng.gen_range(0..3) {
            0 => match service
                .deposit(DepositCommand::new(from, amount.to_string()), &ctx)
                .await
            {
                Ok(_) => {
                    tally.succeeded += 1;
                    tally.net_inflow += amount;
                }
                Err(e) => tally.count_error(&e)?,
            },
            1 => match service
                .withdraw(WithdrawCommand::new(from, amount.to_string()), &ctx)
                .await
            {
                Ok(_) => {
                    tally.succeeded += 1;
                    tally.net_inflow -= amount;
                }
                Err(e) => tally.count_error(&e)?,
            },
            _ => {
                let to = &numbers[rng.gen_range(0..numbers.len())];
                if to == from {
                    continue;
                }
                match service
                    .transfer(TransferCommand::new(from, to, amount.to_string()), &ctx)
                    .await
                {
                    Ok(_) => tally.succeeded += 1,
                    Err(e) => tally.count_error(&e)?,
                }
            }
        }
    }

    Ok(tally)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sharia_ledger=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let ops: u64 = arg(&args, "--ops", 10_000);
    let account_count: usize = arg(&args, "--accounts", 20).max(2);
    let workers: u64 = arg(&args, "--workers", 8).max(1);
    let seed: u64 = arg(&args, "--seed", 42);

    println!(
        "Ledger stress - {} operations over {} accounts, {} workers, seed {}",
        ops, account_count, workers, seed
    );

    let store = Arc::new(InMemoryStore::new());
    let product = AccountType {
        id: Uuid::new_v4(),
        code: "TWD".to_string(),
        name: "Tabungan Wadiah".to_string(),
        minimum_balance: Decimal::ZERO,
        scheme: None,
        sharing_percentage: Decimal::ZERO,
        currency: LedgerSettings::default().currency.code,
    };
    store.add_account_type(product.clone())?;

    let service = Arc::new(BankingService::new(
        store.clone(),
        LedgerSettings::default(),
        Arc::new(LoggingNotifier),
    ));

    let ctx = OperationContext::new();
    let opening = Decimal::from(1_000_000u64);
    let mut numbers = Vec::with_capacity(account_count);
    for i in 0..account_count {
        let account = service
            .open_account(
                OpenAccountCommand::new(Uuid::new_v4(), product.id, format!("Stress {}", i))
                    .with_initial_deposit(opening.to_string()),
                &ctx,
            )
            .await?;
        numbers.push(account.account_number);
    }
    let numbers = Arc::new(numbers);
    let initial_total = opening * Decimal::from(account_count as u64);

    let start = Instant::now();
    let mut handles = Vec::new();
    for w in 0..workers {
        let share = ops / workers + u64::from(w < ops % workers);
        handles.push(tokio::spawn(worker(
            service.clone(),
            numbers.clone(),
            share,
            seed.wrapping_add(w),
        )));
    }

    let mut tally = Tally::default();
    for handle in handles {
        tally.merge(handle.await??);
    }
    let elapsed = start.elapsed();

    let accounts = store.accounts()?;
    let final_total: Decimal = accounts.iter().map(|a| a.balance.value()).sum();
    let negative = accounts
        .iter()
        .filter(|a| a.balance.value() < Decimal::ZERO)
        .count();

    let mut inconsistent = 0usize;
    for account in &accounts {
        inconsistent += store
            .transactions_of(account.id)?
            .iter()
            .filter(|t| !t.is_consistent())
            .count();
    }

    println!("\n=== Ledger Stress Results ===");
    println!("Succeeded: {}", tally.succeeded);
    println!("Rejected (insufficient balance): {}", tally.rejected);
    println!("Conflicts after retries: {}", tally.conflicts);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!(
        "Rate: {:.0} ops/sec",
        ops as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    println!("Initial total: {}", initial_total);
    println!("Net inflow: {}", tally.net_inflow);
    println!("Final total: {}", final_total);

    if final_total != initial_total + tally.net_inflow {
        return Err(anyhow::anyhow!("money not conserved"));
    }
    if negative > 0 {
        return Err(anyhow::anyhow!("{} accounts went negative", negative));
    }
    if inconsistent > 0 {
        return Err(anyhow::anyhow!("{} transactions with bad snapshots", inconsistent));
    }

    println!("Ledger is consistent");
    Ok(())
}
