//! Scheduled Jobs
//!
//! Background batch work: monthly profit sharing and the dormancy sweep.
//! Both are idempotent, so the scheduler simply re-runs them on every tick.

mod average_balance;
mod dormancy;
mod profit_sharing;

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use crate::domain::{DomainError, Period};
use crate::error::{AppError, AppResult};

pub use average_balance::time_weighted_average;
pub use dormancy::{DormancyReport, DormancySweep};
pub use profit_sharing::{
    DistributionFailure, DistributionReport, ProfitSharingEngine, ProfitSharingRun,
};

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the profit sharing check (default: 1 hour)
    pub profit_sharing_interval: Duration,
    /// Interval for the dormancy sweep (default: 1 day)
    pub dormancy_sweep_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            profit_sharing_interval: Duration::from_secs(3600),
            dormancy_sweep_interval: Duration::from_secs(86400),
        }
    }
}

/// Job Scheduler - runs the ledger batch jobs until cancelled
pub struct JobScheduler {
    profit_sharing: Arc<ProfitSharingEngine>,
    dormancy: DormancySweep,
    config: JobSchedulerConfig,
    cancel: CancellationToken,
}

impl JobScheduler {
    pub fn new(
        profit_sharing: Arc<ProfitSharingEngine>,
        dormancy: DormancySweep,
        config: JobSchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            profit_sharing,
            dormancy,
            config,
            cancel,
        }
    }

    /// Start the job scheduler in the background.
    /// Cancel the token to stop it between accounts.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut profit_interval = interval(self.config.profit_sharing_interval);
        let mut dormancy_interval = interval(self.config.dormancy_sweep_interval);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::info!("Job scheduler stopped");
                    break;
                }
                _ = profit_interval.tick() => {
                    if let Err(e) = self.run_profit_sharing(Utc::now()).await {
                        log_profit_sharing_error(&e);
                    }
                }
                _ = dormancy_interval.tick() => {
                    if let Err(e) = self.dormancy.run(&self.cancel).await {
                        tracing::error!(error = %e, "Dormancy sweep failed");
                    }
                }
            }
        }
    }

    /// Profit sharing for the calendar month before `now`
    pub async fn run_profit_sharing(&self, now: DateTime<Utc>) -> AppResult<ProfitSharingRun> {
        let period = Period::containing(now).previous();
        self.profit_sharing.run(period, &self.cancel).await
    }

    /// Run all jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport {
            completed_at: Utc::now(),
            ..Default::default()
        };

        match self.run_profit_sharing(Utc::now()).await {
            Ok(run) => report.profit_sharing = Some(run),
            Err(e) => report.errors.push(format!("Profit sharing: {}", e)),
        }

        match self.dormancy.run(&self.cancel).await {
            Ok(dormancy) => report.dormancy = Some(dormancy),
            Err(e) => report.errors.push(format!("Dormancy sweep: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// A missing profit pool just means the bank has not declared it yet
fn log_profit_sharing_error(err: &AppError) {
    match err.domain() {
        Some(DomainError::ProfitPoolNotDeclared(period)) => {
            tracing::info!(period = %period, "Profit pool not declared yet");
        }
        _ => tracing::error!(error = %err, "Profit sharing run failed"),
    }
}

/// Report from running the jobs once
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub profit_sharing: Option<ProfitSharingRun>,
    pub dormancy: Option<DormancyReport>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerSettings;
    use crate::notification::NotificationDispatcher;
    use crate::store::{InMemoryStore, RetryPolicy};

    fn scheduler(store: Arc<InMemoryStore>, cancel: CancellationToken) -> JobScheduler {
        let engine = ProfitSharingEngine::new(
            store.clone(),
            &LedgerSettings::default(),
            NotificationDispatcher::logging(),
        );
        JobScheduler::new(
            Arc::new(engine),
            DormancySweep::new(store, RetryPolicy::default(), 365),
            JobSchedulerConfig::default(),
            cancel,
        )
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.profit_sharing_interval, Duration::from_secs(3600));
        assert_eq!(config.dormancy_sweep_interval, Duration::from_secs(86400));
    }

    #[tokio::test]
    async fn test_run_all_once_reports_undeclared_pool() {
        let store = Arc::new(InMemoryStore::new());
        let report = scheduler(store, CancellationToken::new()).run_all_once().await;

        assert!(report.profit_sharing.is_none());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Profit sharing"));
        assert!(report.dormancy.is_some());
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let cancel = CancellationToken::new();
        let handle = scheduler(store, cancel.clone()).start();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
