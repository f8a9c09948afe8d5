//! Dormancy sweep
//!
//! Flags active accounts with no activity for the configured number of days.
//! One unit of work per account; the inactivity test is repeated under the
//! account lock so a concurrent deposit wins.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;
use crate::error::{AppError, AppResult};
use crate::ledger::AccountLedger;
use crate::store::{LedgerStore, RetryPolicy};

/// Outcome of one sweep
#[derive(Debug, Clone, Default)]
pub struct DormancyReport {
    pub examined: usize,
    pub flagged: usize,
    pub failed: usize,
    pub cancelled: bool,
}

pub struct DormancySweep {
    store: Arc<dyn LedgerStore>,
    ledger: AccountLedger,
    dormancy_days: i64,
}

impl DormancySweep {
    pub fn new(store: Arc<dyn LedgerStore>, retry: RetryPolicy, dormancy_days: i64) -> Self {
        Self {
            ledger: AccountLedger::new(store.clone(), retry),
            store,
            dormancy_days,
        }
    }

    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<DormancyReport> {
        let cutoff = Duration::try_days(self.dormancy_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or(AppError::Config(ConfigError::InvalidValue("DORMANCY_DAYS")))?;
        let candidates = self.store.list_dormancy_candidates(cutoff).await?;
        let mut report = DormancyReport {
            examined: candidates.len(),
            ..Default::default()
        };

        for account in candidates {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            match self.ledger.mark_dormant(account.id, cutoff).await {
                Ok(Some(_)) => report.flagged += 1,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(account_id = %account.id, error = %e, "Dormancy flag failed");
                }
            }
        }

        if report.flagged > 0 || report.failed > 0 {
            tracing::info!(
                examined = report.examined,
                flagged = report.flagged,
                failed = report.failed,
                "Dormancy sweep finished"
            );
        }
        Ok(report)
    }
}
