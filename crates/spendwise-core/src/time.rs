// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Half-open time ranges, symbolic range names, and calendar periods.
//!
//! All calendar arithmetic is UTC. Weeks follow ISO 8601 and start on
//! Monday 00:00 UTC. Every range is half-open: `[start, end)`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SpendwiseError;

/// A half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SpendwiseError> {
        if end < start {
            return Err(SpendwiseError::InvalidQuery(format!(
                "time range end {end} precedes start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Every instant any backend can store: `[1970-01-01, 9999-12-31T23:59:59)`.
    pub fn all() -> Self {
        Self {
            start: DateTime::<Utc>::UNIX_EPOCH,
            end: day_start(far_future_date()) + TimeDelta::seconds(86_399),
        }
    }

    /// The `duration` immediately before `end`.
    pub fn trailing(end: DateTime<Utc>, duration: TimeDelta) -> Self {
        Self {
            start: end - duration,
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

fn far_future_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX)
}

/// Midnight UTC of the given date.
fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// First day of the month containing `date`.
fn month_first(date: NaiveDate) -> NaiveDate {
    date - TimeDelta::days(i64::from(date.day0()))
}

/// Monday of the ISO week containing `date`.
fn week_monday(date: NaiveDate) -> NaiveDate {
    date - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Named ranges relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolicRange {
    /// `[00:00 today, now)`
    Today,
    /// `[00:00 yesterday, 00:00 today)`
    Yesterday,
    /// `[Monday 00:00, now)`
    ThisWeek,
    /// `[1st of month 00:00, now)`
    ThisMonth,
    /// `[now - N days, now)`
    LastDays(u32),
    /// Everything.
    All,
}

impl SymbolicRange {
    pub fn resolve(self, now: DateTime<Utc>) -> TimeRange {
        let today = now.date_naive();
        match self {
            Self::Today => TimeRange {
                start: day_start(today),
                end: now,
            },
            Self::Yesterday => TimeRange {
                start: day_start(today) - TimeDelta::days(1),
                end: day_start(today),
            },
            Self::ThisWeek => TimeRange {
                start: day_start(week_monday(today)),
                end: now,
            },
            Self::ThisMonth => TimeRange {
                start: day_start(month_first(today)),
                end: now,
            },
            Self::LastDays(n) => TimeRange::trailing(now, TimeDelta::days(i64::from(n))),
            Self::All => TimeRange::all(),
        }
    }
}

impl FromStr for SymbolicRange {
    type Err = SpendwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "yesterday" => Ok(Self::Yesterday),
            "this-week" => Ok(Self::ThisWeek),
            "this-month" => Ok(Self::ThisMonth),
            "all" => Ok(Self::All),
            other => other
                .strip_prefix("last-")
                .and_then(|rest| rest.strip_suffix("-days"))
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(Self::LastDays)
                .ok_or_else(|| {
                    SpendwiseError::InvalidQuery(format!(
                        "unknown time range `{other}` (expected today, yesterday, this-week, \
                         this-month, last-N-days, all)"
                    ))
                }),
        }
    }
}

/// A calendar-aligned budgeting/forecasting period.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    /// Start of the period containing `ts`.
    pub fn start_of(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let date = ts.date_naive();
        match self {
            Self::Daily => day_start(date),
            Self::Weekly => day_start(week_monday(date)),
            Self::Monthly => day_start(month_first(date)),
        }
    }

    /// Start of the period following the one that starts at `start`.
    pub fn next_start(self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => start + TimeDelta::days(1),
            Self::Weekly => start + TimeDelta::days(7),
            Self::Monthly => {
                let probe = self.start_of(start) + TimeDelta::days(32);
                self.start_of(probe)
            }
        }
    }

    /// Start of the period preceding the one that starts at `start`.
    pub fn previous_start(self, start: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => start - TimeDelta::days(1),
            Self::Weekly => start - TimeDelta::days(7),
            Self::Monthly => self.start_of(self.start_of(start) - TimeDelta::days(1)),
        }
    }

    /// The full period window containing `ts`.
    pub fn window(self, ts: DateTime<Utc>) -> TimeRange {
        let start = self.start_of(ts);
        TimeRange {
            start,
            end: self.next_start(start),
        }
    }

    /// Fraction of the period containing `now` that has already elapsed, in `[0, 1)`.
    pub fn elapsed_fraction(self, now: DateTime<Utc>) -> f64 {
        let window = self.window(now);
        let total = window.duration().num_milliseconds();
        if total <= 0 {
            return 0.0;
        }
        let elapsed = (now - window.start).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// The `count` complete periods immediately before the one containing `now`,
    /// oldest first.
    pub fn completed_windows(self, now: DateTime<Utc>, count: usize) -> Vec<TimeRange> {
        let mut windows = Vec::with_capacity(count);
        let mut end = self.start_of(now);
        for _ in 0..count {
            let start = self.previous_start(end);
            windows.push(TimeRange { start, end });
            end = start;
        }
        windows.reverse();
        windows
    }
}
