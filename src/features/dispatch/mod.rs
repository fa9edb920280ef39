//! # Dispatch Feature
//!
//! Turns a task ping into an outbound message: load the task and its
//! assignee, refuse closed tasks, render the operator template, hand the
//! text to the gateway, and append the attempt to the dispatch log whatever
//! the outcome.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Dispatch log records every attempt, including failures
//! - 1.1.0: Terminal-status guard retires the task's job on the spot
//! - 1.0.0: Initial release
//!
//! ## Submodules
//! - `gateway`: The messaging transport trait and its HTTP implementation

pub mod gateway;

pub use gateway::{HttpGateway, MessageGateway};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::{render_message, Config, DEFAULT_TEMPLATE, MESSAGE_TEMPLATE_KEY};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::features::scheduler::{LastOutcome, ReminderJob, RetireReason};
use crate::features::tasks::TaskStatus;

/// One row of the append-only dispatch log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: i64,
    /// Absent for out-of-band sends triggered by the operator.
    pub job_id: Option<i64>,
    pub task_id: i64,
    pub attempted_at: DateTime<Utc>,
    pub destination: String,
    pub outcome: LastOutcome,
    pub detail: Option<String>,
}

/// Sends task reminders through the configured gateway.
#[derive(Clone)]
pub struct Dispatcher {
    database: Database,
    gateway: Arc<dyn MessageGateway>,
    config: Config,
}

impl Dispatcher {
    pub fn new(database: Database, gateway: Arc<dyn MessageGateway>, config: Config) -> Self {
        Dispatcher {
            database,
            gateway,
            config,
        }
    }

    /// Send the reminder for a job's occurrence and record the outcome on
    /// the job's last-run fields. The job's status and next-due are never
    /// touched here; the scheduler consumed the occurrence before calling.
    pub async fn dispatch_job(&self, job: &ReminderJob) -> Result<String> {
        let now = Utc::now();
        let result = self.send_task_ping(job.task_id, Some(job.id)).await;

        match &result {
            Ok(body) => {
                self.database
                    .record_job_outcome(job.id, now, LastOutcome::Success, body)
                    .await?;
            }
            Err(e) => {
                self.database
                    .record_job_outcome(job.id, now, LastOutcome::Failure, &e.to_string())
                    .await?;
            }
        }
        result
    }

    /// Operator-triggered immediate ping. Goes through the same guard and
    /// template path as scheduled sends but leaves the job's cadence alone.
    pub async fn remind_now(&self, task_id: i64) -> Result<String> {
        self.send_task_ping(task_id, None).await
    }

    async fn send_task_ping(&self, task_id: i64, job_id: Option<i64>) -> Result<String> {
        let task = self.database.get_task(task_id).await?;

        // Closed tasks never get pinged. If a job still points here the
        // lifecycle hook was missed; retire it now rather than next tick.
        if task.status.is_terminal() {
            let reason = match task.status {
                TaskStatus::Cancelled => RetireReason::TaskCancelled,
                _ => RetireReason::TaskCompleted,
            };
            if self.database.retire_job_for_task(task_id, reason).await? {
                warn!(
                    "Task {task_id} is {}; retired its stale reminder job",
                    task.status
                );
            }
            return Err(Error::TaskClosed {
                status: task.status.to_string(),
            });
        }

        let contact = self.database.get_contact(task.assignee_id).await?;
        let template = self
            .database
            .get_setting(MESSAGE_TEMPLATE_KEY)
            .await?
            .unwrap_or_else(|| DEFAULT_TEMPLATE.to_string());
        let text = render_message(&template, &task, &contact, &self.config.tz_offset);

        let attempted_at = Utc::now();
        let result = self.gateway.send_text(&contact.destination, &text).await;

        match &result {
            Ok(body) => {
                info!("📤 Sent reminder for task {task_id} to {}", contact.destination);
                self.database
                    .log_dispatch(
                        job_id,
                        task_id,
                        attempted_at,
                        &contact.destination,
                        LastOutcome::Success,
                        body,
                    )
                    .await?;
            }
            Err(e) => {
                warn!("Failed to send reminder for task {task_id}: {e}");
                self.database
                    .log_dispatch(
                        job_id,
                        task_id,
                        attempted_at,
                        &contact.destination,
                        LastOutcome::Failure,
                        &e.to_string(),
                    )
                    .await?;
            }
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    /// In-memory gateway that records every send and can be told to fail.
    pub struct FakeGateway {
        pub sent: Mutex<Vec<(String, String)>>,
        pub fail_with: Mutex<Option<String>>,
    }

    impl FakeGateway {
        pub fn new() -> Arc<Self> {
            Arc::new(FakeGateway {
                sent: Mutex::new(Vec::new()),
                fail_with: Mutex::new(None),
            })
        }

        pub async fn fail_next(&self, message: &str) {
            *self.fail_with.lock().await = Some(message.to_string());
        }
    }

    #[async_trait]
    impl MessageGateway for FakeGateway {
        async fn send_text(&self, destination: &str, text: &str) -> Result<String> {
            if let Some(message) = self.fail_with.lock().await.take() {
                return Err(Error::Gateway(message));
            }
            self.sent
                .lock()
                .await
                .push((destination.to_string(), text.to_string()));
            Ok(serde_json::json!({ "sent": true }).to_string())
        }
    }
}
