//! Cron schedules and the background task runner that fires them.
//!
//! Expressions use the standard five fields: minute, hour, day-of-month,
//! month, day-of-week. Each field accepts `*`, `N`, `A-B`, `*/S`, `A-B/S`
//! and comma separated lists of those. Day-of-week `0` and `7` are Sunday.
//! All times are UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// How far ahead `next_after` searches before giving up.
const MAX_LOOKAHEAD_YEARS: i32 = 4;

/// Error parsing a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid cron expression '{expression}': {reason}")]
pub struct ScheduleError {
    /// The rejected expression
    pub expression: String,
    /// What was wrong with it
    pub reason: String,
}

/// Set of allowed values for one cron field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn span(min: u32, max: u32) -> Self {
        Self((min..=max).fold(0, |bits, value| bits | (1u64 << value)))
    }

    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }

    fn parse(field: &str, min: u32, max: u32) -> Result<Self, String> {
        let mut bits = 0u64;

        for part in field.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| format!("invalid step '{}'", step))?;
                    if step == 0 {
                        return Err("step must be positive".to_string());
                    }
                    (range, step)
                }
                None => (part, 1),
            };

            let (start, end) = if range == "*" {
                (min, max)
            } else if let Some((a, b)) = range.split_once('-') {
                (parse_value(a, min, max)?, parse_value(b, min, max)?)
            } else {
                let value = parse_value(range, min, max)?;
                // "N/S" runs from N to the end of the field
                if part.contains('/') {
                    (value, max)
                } else {
                    (value, value)
                }
            };

            if start > end {
                return Err(format!("range {}-{} is reversed", start, end));
            }

            for value in (start..=end).step_by(step as usize) {
                bits |= 1u64 << value;
            }
        }

        Ok(Self(bits))
    }
}

fn parse_value(raw: &str, min: u32, max: u32) -> Result<u32, String> {
    let value: u32 = raw.parse().map_err(|_| format!("invalid value '{}'", raw))?;
    if value < min || value > max {
        return Err(format!("value {} outside {}-{}", value, min, max));
    }
    Ok(value)
}

/// A parsed five-field cron schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    /// Every day at 00:00.
    pub const DAILY_MIDNIGHT: &'static str = "0 0 * * *";

    /// Parse a cron expression.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let error = |reason: String| ScheduleError {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(error(format!("expected 5 fields, got {}", fields.len())));
        }

        let mut days_of_week = FieldSet::parse(fields[4], 0, 7).map_err(error)?;
        if days_of_week.contains(7) {
            days_of_week = FieldSet(days_of_week.0 | 1);
        }

        Ok(Self {
            expression: fields.join(" "),
            minutes: FieldSet::parse(fields[0], 0, 59).map_err(error)?,
            hours: FieldSet::parse(fields[1], 0, 23).map_err(error)?,
            days_of_month: FieldSet::parse(fields[2], 1, 31).map_err(error)?,
            months: FieldSet::parse(fields[3], 1, 12).map_err(error)?,
            days_of_week,
            day_of_month_restricted: !fields[2].starts_with('*'),
            day_of_week_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The daily-midnight schedule.
    pub fn daily_midnight() -> Self {
        Self {
            expression: Self::DAILY_MIDNIGHT.to_string(),
            minutes: FieldSet(1),
            hours: FieldSet(1),
            days_of_month: FieldSet::span(1, 31),
            months: FieldSet::span(1, 12),
            days_of_week: FieldSet::span(0, 7),
            day_of_month_restricted: false,
            day_of_week_restricted: false,
        }
    }

    /// The normalized expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching minute strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut candidate = after
            .naive_utc()
            .with_second(0)?
            .with_nanosecond(0)?
            .checked_add_signed(chrono::Duration::minutes(1))?;
        let last_year = candidate.year() + MAX_LOOKAHEAD_YEARS;

        while candidate.year() <= last_year {
            if !self.months.contains(candidate.month()) {
                candidate = first_of_next_month(candidate.date())?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = candidate
                    .with_minute(0)?
                    .checked_add_signed(chrono::Duration::hours(1))?;
                continue;
            }
            if !self.minutes.contains(candidate.minute()) {
                candidate = candidate.checked_add_signed(chrono::Duration::minutes(1))?;
                continue;
            }
            return Some(Utc.from_utc_datetime(&candidate));
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            (true, true) => dom || dow,
            _ => dom && dow,
        }
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Runs recurring tasks on cron schedules.
#[derive(Clone)]
pub struct Scheduler {
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    /// Create a scheduler reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Current time of the underlying clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run `task` every time `schedule` fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn every<F>(&self, schedule: CronSchedule, task: F) -> ScheduledTask
    where
        F: Fn() + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let clock = Arc::clone(&self.clock);

        info!(schedule = %schedule, "Starting scheduled task");

        let handle = tokio::spawn(async move {
            let mut last_fired: Option<DateTime<Utc>> = None;

            loop {
                let now = clock.now();
                let from = match last_fired {
                    Some(fired) if fired > now => fired,
                    _ => now,
                };

                let Some(next) = schedule.next_after(from) else {
                    warn!(schedule = %schedule, "Schedule has no future firings, stopping");
                    break;
                };
                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

                debug!(schedule = %schedule, next = %next, "Waiting for next firing");

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        task();
                        last_fired = Some(next);
                    }
                    _ = shutdown_rx.recv() => {
                        info!(schedule = %schedule, "Scheduled task shutting down");
                        break;
                    }
                }
            }
        });

        ScheduledTask {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running scheduled task. Dropping it aborts the task.
pub struct ScheduledTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Ask the task to stop before its next firing.
    pub fn cancel(&self) {
        let _ = self.shutdown_tx.try_send(());
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
