//! Reminder job records and their status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::ReminderPolicy;

/// Status of a reminder job.
///
/// `Scheduled -> Scheduled` is the normal re-fire with an advanced next-due;
/// `Scheduled -> Retired` is terminal. `Paused` jobs are skipped by the due
/// query and may resume to `Scheduled`. There is no transition out of
/// `Retired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Scheduled,
    Paused,
    Retired,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Paused => "paused",
            JobStatus::Retired => "retired",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(JobStatus::Scheduled),
            "paused" => Ok(JobStatus::Paused),
            "retired" => Ok(JobStatus::Retired),
            _ => Err(crate::error::Error::Policy(format!(
                "invalid job status: {s}"
            ))),
        }
    }
}

/// Outcome of the most recent occurrence of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastOutcome {
    None,
    Success,
    Failure,
}

impl LastOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LastOutcome::None => "none",
            LastOutcome::Success => "success",
            LastOutcome::Failure => "failure",
        }
    }
}

impl std::fmt::Display for LastOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LastOutcome {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(LastOutcome::None),
            "success" => Ok(LastOutcome::Success),
            "failure" => Ok(LastOutcome::Failure),
            _ => Err(crate::error::Error::Policy(format!(
                "invalid outcome: {s}"
            ))),
        }
    }
}

/// Why a job was retired; recorded for the operator view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    WindowElapsed,
    TaskCompleted,
    TaskCancelled,
    TaskDeleted,
    PolicyReplaced,
}

impl RetireReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetireReason::WindowElapsed => "window elapsed",
            RetireReason::TaskCompleted => "task completed",
            RetireReason::TaskCancelled => "task cancelled",
            RetireReason::TaskDeleted => "task deleted",
            RetireReason::PolicyReplaced => "policy replaced",
        }
    }
}

impl std::fmt::Display for RetireReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted reminder job. The store is the sole source of truth; the
/// scheduler holds no in-memory schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderJob {
    pub id: i64,
    pub task_id: i64,
    pub policy: ReminderPolicy,
    /// Cached `policy.end_at()`; occurrences past this point never fire.
    pub end_at: DateTime<Utc>,
    pub next_due: DateTime<Utc>,
    pub status: JobStatus,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_outcome: LastOutcome,
    /// Raw gateway response (or error text) from the last occurrence.
    pub last_detail: Option<String>,
    pub retired_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}
