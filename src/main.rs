//! sharia_ledger - ledger batch process
//!
//! Connects to the ledger database and runs the scheduled jobs (monthly
//! profit sharing and the dormancy sweep) until SIGINT/SIGTERM.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sharia_ledger::jobs::{DormancySweep, JobScheduler, JobSchedulerConfig, ProfitSharingEngine};
use sharia_ledger::notification::NotificationDispatcher;
use sharia_ledger::{db, Config, PgStore};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sharia_ledger=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.json_logs());

    tracing::info!(environment = %config.environment, "Starting sharia_ledger");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let settings = config.ledger_settings();
    let store = Arc::new(PgStore::new(pool.clone(), config.lock_timeout));
    let engine = ProfitSharingEngine::new(
        store.clone(),
        &settings,
        NotificationDispatcher::logging(),
    );
    let sweep = DormancySweep::new(store, settings.retry, config.dormancy_days);

    let cancel = CancellationToken::new();
    let scheduler = JobScheduler::new(
        Arc::new(engine),
        sweep,
        JobSchedulerConfig {
            profit_sharing_interval: config.profit_sharing_check_interval,
            dormancy_sweep_interval: config.dormancy_sweep_interval,
        },
        cancel.clone(),
    );
    let handle = scheduler.start();

    shutdown_signal().await;

    // Jobs stop between accounts; a unit of work in flight still commits
    cancel.cancel();
    if let Err(e) = handle.await {
        tracing::error!(error = %e, "Job scheduler task failed");
    }

    tracing::info!("Shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
