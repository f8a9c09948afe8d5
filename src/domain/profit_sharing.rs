//! Profit-sharing periods and records

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::DomainError;

/// Calendar month a distribution belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        if !(1..=12).contains(&month) {
            return Err(DomainError::InvalidPeriod(format!(
                "month must be 1-12, got {}",
                month
            )));
        }
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(DomainError::InvalidPeriod(format!(
                "year {} out of range",
                year
            )));
        }
        Ok(Self { year, month })
    }

    /// Period containing `at`
    pub fn containing(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// First day of the period
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the period
    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn days(&self) -> u32 {
        self.last_day().day()
    }

    /// Inclusive start instant (UTC midnight of the first day)
    pub fn start(&self) -> DateTime<Utc> {
        midnight(self.first_day())
    }

    /// Exclusive end instant (UTC midnight of the next period)
    pub fn end(&self) -> DateTime<Utc> {
        midnight(self.next().first_day())
    }
}

pub(crate) fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| DomainError::InvalidPeriod(format!("expected YYYY-MM, got '{}'", s)))?;
        let year = year
            .parse()
            .map_err(|_| DomainError::InvalidPeriod(format!("bad year in '{}'", s)))?;
        let month = month
            .parse()
            .map_err(|_| DomainError::InvalidPeriod(format!("bad month in '{}'", s)))?;
        Period::new(year, month)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitSharingStatus {
    Calculated,
    Distributed,
    Cancelled,
}

impl ProfitSharingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfitSharingStatus::Calculated => "calculated",
            ProfitSharingStatus::Distributed => "distributed",
            ProfitSharingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for ProfitSharingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "calculated" => Ok(ProfitSharingStatus::Calculated),
            "distributed" => Ok(ProfitSharingStatus::Distributed),
            "cancelled" => Ok(ProfitSharingStatus::Cancelled),
            other => Err(format!("unknown profit sharing status '{}'", other)),
        }
    }
}

/// One account's share of one period's profit.
///
/// At most one record exists per (account, period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitSharingRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub period: Period,
    pub average_balance: Decimal,
    /// Profit attributed to the account before the customer/bank split
    pub total_profit: Decimal,
    /// Customer percentage applied (0..=100)
    pub sharing_percentage: Decimal,
    pub customer_share: Decimal,
    pub bank_share: Decimal,
    pub status: ProfitSharingStatus,
    pub calculated_at: DateTime<Utc>,
    pub distribution_date: Option<NaiveDate>,
    /// Credit transaction that paid the customer share
    pub transaction_id: Option<Uuid>,
}

impl ProfitSharingRecord {
    pub fn is_distributed(&self) -> bool {
        self.status == ProfitSharingStatus::Distributed
    }

    pub fn mark_distributed(&mut self, on: NaiveDate, transaction_id: Option<Uuid>) {
        self.status = ProfitSharingStatus::Distributed;
        self.distribution_date = Some(on);
        self.transaction_id = transaction_id;
    }
}
