//! Reminder policy math.
//!
//! A policy is the triple (start time, frequency in days, window length in
//! days). Occurrences land on the cadence grid `start + k * frequency` while
//! inside the window; everything here is pure so the scheduler's timing
//! decisions can be tested without a running clock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When and how often a task's reminders occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPolicy {
    /// First reminder instant. May already be in the past at creation time;
    /// the first occurrence then fires at the next tick (catch-up).
    pub start_at: DateTime<Utc>,
    /// Days between occurrences. 1 = daily, 2 = alternate days, ...
    pub frequency_days: i64,
    /// Reminders stop `window_days` after `start_at`.
    pub window_days: i64,
}

impl ReminderPolicy {
    pub fn new(start_at: DateTime<Utc>, frequency_days: i64, window_days: i64) -> Result<Self> {
        let policy = ReminderPolicy {
            start_at,
            frequency_days,
            window_days,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Policy from operator input, falling back to the configured window
    /// length when none was given.
    pub fn with_default_window(
        start_at: DateTime<Utc>,
        frequency_days: i64,
        window_days: Option<i64>,
        default_window_days: i64,
    ) -> Result<Self> {
        Self::new(
            start_at,
            frequency_days,
            window_days.unwrap_or(default_window_days),
        )
    }

    /// Reject non-positive frequency or window before anything is persisted.
    pub fn validate(&self) -> Result<()> {
        if self.frequency_days < 1 {
            return Err(Error::Policy(format!(
                "frequency must be at least 1 day, got {}",
                self.frequency_days
            )));
        }
        if self.window_days < 1 {
            return Err(Error::Policy(format!(
                "window must be at least 1 day, got {}",
                self.window_days
            )));
        }
        Ok(())
    }

    /// Instant after which no occurrence may fire.
    pub fn end_at(&self) -> DateTime<Utc> {
        self.start_at + Duration::days(self.window_days)
    }

    /// First cadence boundary strictly after `after`, or `None` once the
    /// grid leaves the window.
    ///
    /// Used to advance a job after it fires: passing the current time (not
    /// the consumed boundary) collapses any boundaries missed during
    /// downtime into the single catch-up send that just happened, and
    /// resumes the original cadence afterwards.
    pub fn next_occurrence_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let step = Duration::days(self.frequency_days);
        let mut next = self.start_at;
        if next <= after {
            // Whole steps to land just past `after`, without looping day by day.
            let elapsed = after - self.start_at;
            let steps = elapsed.num_seconds() / step.num_seconds() + 1;
            next = self.start_at + Duration::days(self.frequency_days * steps);
        }
        debug_assert!(next > after);
        (next <= self.end_at()).then_some(next)
    }
}
