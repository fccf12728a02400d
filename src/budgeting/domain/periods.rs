use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1_000;

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PeriodStatus {
    Active,
    Closed,
}

impl fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for PeriodStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ACTIVE" => Ok(Self::Active),
            "CLOSED" => Ok(Self::Closed),
            other => Err(anyhow::anyhow!("unknown period status: {}", other)),
        }
    }
}

/// A budgeting period owned by a single user.
///
/// Periods start `ACTIVE` and transition to `CLOSED` exactly once. The close
/// fields (`end_date`, `closed_at`, `duration_days`, `summary_json`) are all
/// `None` while the period is active and are written together, atomically, by
/// the close operation. They are never modified afterwards.
#[derive(Clone, Debug)]
pub struct Period {
    pub id: Uuid,
    pub user_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: PeriodStatus,
    pub duration_days: Option<i32>,
    pub closed_at: Option<DateTime<Utc>>,
    pub summary_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Period {
    pub fn is_active(&self) -> bool {
        self.status == PeriodStatus::Active
    }

    /// Whether an expense dated `date` may be recorded against this period.
    ///
    /// Active periods accept any expense date. Closed periods accept
    /// late-arriving receipts whose date falls inside the period window,
    /// compared at day precision so the time component of the boundaries does
    /// not shrink the window.
    pub fn accepts_expense_dated(&self, date: DateTime<Utc>) -> bool {
        match self.status {
            PeriodStatus::Active => true,
            PeriodStatus::Closed => {
                let end_date = match self.end_date {
                    Some(end) => end,
                    // A closed period always has an end date; treat a missing
                    // one as a zero-width window.
                    None => self.start_date,
                };

                let day = date.date_naive();

                day >= self.start_date.date_naive() && day <= end_date.date_naive()
            }
        }
    }
}

/// The length of a period in whole days, rounded up.
///
/// A period closed any amount of time after it started has lasted at least
/// one day. An end before the start clamps to zero rather than going
/// negative.
pub fn duration_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 0;
    }

    ((millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY) as i32
}
