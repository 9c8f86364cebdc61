//! Recurrence specs and the pure next-occurrence computation.
//!
//! `advance` works on the stored UTC epoch seconds. Minute through week
//! granularities are plain duration adds; month and year walk the calendar
//! and clamp to the last valid day when the target month is shorter
//! (Jan 31 + 1 month = Feb 28/29, Feb 29 + 1 year = Feb 28).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::error::RemembotError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrenceKind {
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Minutely => "minutely",
            RecurrenceKind::Hourly => "hourly",
            RecurrenceKind::Daily => "daily",
            RecurrenceKind::Weekly => "weekly",
            RecurrenceKind::Monthly => "monthly",
            RecurrenceKind::Yearly => "yearly",
        }
    }

    /// Allowed `[min, max]` interval per kind, enforced at admission time.
    pub fn interval_limits(&self) -> (u32, u32) {
        match self {
            RecurrenceKind::Minutely => (1, 1440),
            RecurrenceKind::Hourly => (1, 168),
            RecurrenceKind::Daily => (1, 365),
            RecurrenceKind::Weekly => (1, 52),
            RecurrenceKind::Monthly => (1, 24),
            RecurrenceKind::Yearly => (1, 10),
        }
    }
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurrenceKind {
    type Err = RemembotError;

    fn from_str(value: &str) -> Result<Self> {
        Ok(match value {
            "minutely" => RecurrenceKind::Minutely,
            "hourly" => RecurrenceKind::Hourly,
            "daily" => RecurrenceKind::Daily,
            "weekly" => RecurrenceKind::Weekly,
            "monthly" => RecurrenceKind::Monthly,
            "yearly" => RecurrenceKind::Yearly,
            other => {
                return Err(RemembotError::Validation(format!(
                    "unknown recurrence kind: {other}"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub kind: RecurrenceKind,
    pub interval: u32,
    /// Weekly only: 0 = Monday .. 6 = Sunday.
    pub days_of_week: Option<Vec<u8>>,
    /// Optional absolute cutoff (UTC epoch seconds). The series retires on
    /// the first advance that would land past it.
    pub end_at: Option<i64>,
}

impl Recurrence {
    pub fn new(kind: RecurrenceKind, interval: u32) -> Self {
        Self {
            kind,
            interval,
            days_of_week: None,
            end_at: None,
        }
    }

    pub fn with_end_at(mut self, end_at: i64) -> Self {
        self.end_at = Some(end_at);
        self
    }

    /// Checks the interval against the per-kind limits; the descriptive
    /// reason is shown verbatim to the user on rejection.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let (min, max) = self.kind.interval_limits();
        if self.interval < min {
            return Err(format!(
                "interval too short for {} recurrence, minimum is {min}",
                self.kind
            ));
        }
        if self.interval > max {
            return Err(format!(
                "interval too long for {} recurrence, maximum is {max}",
                self.kind
            ));
        }
        if let Some(days) = &self.days_of_week {
            if self.kind != RecurrenceKind::Weekly {
                return Err("days of week only apply to weekly recurrence".to_string());
            }
            if days.iter().any(|d| *d > 6) {
                return Err("days of week must be in 0..=6".to_string());
            }
        }
        Ok(())
    }
}

/// Next occurrence after `due_at`. Pure; assumes the interval already
/// passed `Recurrence::validate` at creation time.
pub fn advance(due_at: i64, kind: RecurrenceKind, interval: u32) -> i64 {
    let interval = i64::from(interval);
    match kind {
        RecurrenceKind::Minutely => due_at + interval * 60,
        RecurrenceKind::Hourly => due_at + interval * 3_600,
        RecurrenceKind::Daily => due_at + interval * 86_400,
        RecurrenceKind::Weekly => due_at + interval * 7 * 86_400,
        RecurrenceKind::Monthly => shift_calendar(due_at, interval, 0),
        RecurrenceKind::Yearly => shift_calendar(due_at, 0, interval),
    }
}

fn shift_calendar(due_at: i64, months: i64, years: i64) -> i64 {
    let current = DateTime::<Utc>::from_timestamp(due_at, 0)
        .unwrap_or_default()
        .naive_utc();

    let total_months = (i64::from(current.year()) * 12 + i64::from(current.month0()))
        + months
        + years * 12;
    let year = total_months.div_euclid(12) as i32;
    let month = (total_months.rem_euclid(12) + 1) as u32;
    let day = current.day().min(days_in_month(year, month));

    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or(current.date());
    date.and_time(current.time()).and_utc().timestamp()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(first), Some(next)) => next.signed_duration_since(first).num_days() as u32,
        _ => 28,
    }
}
