//! Lifecycle coordination between tasks and their reminder jobs.
//!
//! Every task mutation that affects reminders goes through here, so the
//! invariant "a closed or deleted task has no active job" holds by
//! construction rather than by periodic cleanup.

use chrono::{DateTime, Utc};
use log::info;

use crate::core::Config;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::features::dispatch::Dispatcher;
use crate::features::scheduler::{ReminderJob, ReminderPolicy, RetireReason};
use crate::features::tasks::{NewTask, Task, TaskStatus};

/// Keeps reminder jobs consistent with task state.
#[derive(Clone)]
pub struct LifecycleCoordinator {
    database: Database,
    dispatcher: Dispatcher,
    default_window_days: i64,
}

impl LifecycleCoordinator {
    pub fn new(database: Database, dispatcher: Dispatcher, config: &Config) -> Self {
        LifecycleCoordinator {
            database,
            dispatcher,
            default_window_days: config.default_window_days,
        }
    }

    /// Build a policy from operator input. A missing window falls back to
    /// the configured default length.
    pub fn policy(
        &self,
        start_at: DateTime<Utc>,
        frequency_days: i64,
        window_days: Option<i64>,
    ) -> Result<ReminderPolicy> {
        ReminderPolicy::with_default_window(
            start_at,
            frequency_days,
            window_days,
            self.default_window_days,
        )
    }

    /// Create a task together with its reminder job. The policy is validated
    /// before anything is persisted.
    pub async fn create_task(
        &self,
        new: &NewTask,
        policy: ReminderPolicy,
    ) -> Result<(Task, ReminderJob)> {
        policy.validate()?;
        let task = self.database.create_task(new).await?;
        let job = self.database.create_job(task.id, &policy).await?;
        info!(
            "📝 Task {} created with reminders every {}d for {}d",
            task.id, policy.frequency_days, policy.window_days
        );
        Ok((task, job))
    }

    /// Transition a task's status, recording a system comment and retiring
    /// the reminder job when the new status is terminal. Moving between
    /// `open` and `in_progress` leaves the job untouched.
    pub async fn set_status(&self, task_id: i64, next: TaskStatus) -> Result<Task> {
        let task = self.database.get_task(task_id).await?;

        if !task.status.can_transition_to(next) {
            return Err(Error::Policy(format!(
                "cannot move task {task_id} from {} to {next}",
                task.status
            )));
        }
        if task.status == next {
            return Ok(task);
        }

        self.database.set_task_status(task_id, next).await?;
        self.database
            .add_comment(task_id, "system", &format!("Status changed to {next}"))
            .await?;

        if next.is_terminal() {
            let reason = match next {
                TaskStatus::Cancelled => RetireReason::TaskCancelled,
                _ => RetireReason::TaskCompleted,
            };
            if self.database.retire_job_for_task(task_id, reason).await? {
                info!("Task {task_id} is {next}; reminder job retired");
            }
        }

        self.database.get_task(task_id).await
    }

    /// Replace the task's reminder policy. The old job is retired and a new
    /// one created atomically; exactly one active job survives.
    pub async fn replace_policy(&self, task_id: i64, policy: ReminderPolicy) -> Result<ReminderJob> {
        policy.validate()?;
        let task = self.database.get_task(task_id).await?;
        if task.status.is_terminal() {
            return Err(Error::TaskClosed {
                status: task.status.to_string(),
            });
        }
        self.database.create_job(task_id, &policy).await
    }

    /// Delete a task. Its reminder job is retired first and the job row is
    /// kept as history; comments go with the task.
    pub async fn delete_task(&self, task_id: i64) -> Result<bool> {
        self.database
            .retire_job_for_task(task_id, RetireReason::TaskDeleted)
            .await?;
        self.database.delete_task(task_id).await
    }

    /// Operator-triggered immediate ping, bypassing the schedule.
    pub async fn remind_now(&self, task_id: i64) -> Result<String> {
        self.dispatcher.remind_now(task_id).await
    }

    pub async fn pause_reminders(&self, task_id: i64) -> Result<bool> {
        self.database.pause_job_for_task(task_id).await
    }

    pub async fn resume_reminders(&self, task_id: i64) -> Result<bool> {
        self.database.resume_job_for_task(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dispatch::testing::FakeGateway;
    use crate::features::scheduler::JobStatus;
    use crate::features::tasks::Priority;
    use chrono::Duration;
    use std::sync::Arc;

    async fn setup() -> (Database, Arc<FakeGateway>, LifecycleCoordinator) {
        let database = Database::new(":memory:").await.unwrap();
        let gateway = FakeGateway::new();
        let config = Config::for_tests();
        let dispatcher = Dispatcher::new(database.clone(), gateway.clone(), config.clone());
        let coordinator = LifecycleCoordinator::new(database.clone(), dispatcher, &config);
        (database, gateway, coordinator)
    }

    async fn new_task(database: &Database) -> NewTask {
        let contact = database
            .upsert_contact("Asha", "98765 43210", "+919876543210", "", "")
            .await
            .unwrap();
        NewTask {
            title: "write report".into(),
            description: String::new(),
            priority: Priority::Medium,
            due_at: None,
            assignee_id: contact.id,
        }
    }

    fn policy() -> ReminderPolicy {
        ReminderPolicy::new(Utc::now(), 2, 5).unwrap()
    }

    #[tokio::test]
    async fn test_create_task_schedules_first_occurrence_at_start() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;

        let (task, job) = coordinator.create_task(&new, policy()).await.unwrap();
        assert_eq!(job.task_id, task.id);
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.next_due, job.policy.start_at);
    }

    #[tokio::test]
    async fn test_policy_window_defaults_from_config() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;

        let p = coordinator.policy(Utc::now(), 2, None).unwrap();
        assert_eq!(p.window_days, 5);
        assert_eq!(coordinator.policy(Utc::now(), 2, Some(9)).unwrap().window_days, 9);

        let (_task, job) = coordinator.create_task(&new, p).await.unwrap();
        assert_eq!(job.end_at, job.policy.start_at + Duration::days(5));
    }

    #[tokio::test]
    async fn test_invalid_policy_persists_nothing() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let bad = ReminderPolicy {
            start_at: Utc::now(),
            frequency_days: 0,
            window_days: 5,
        };

        assert!(coordinator.create_task(&new, bad).await.is_err());
        assert!(database.list_tasks(&Default::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_retires_job_and_comments() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, job) = coordinator.create_task(&new, policy()).await.unwrap();

        coordinator
            .set_status(task.id, TaskStatus::Completed)
            .await
            .unwrap();

        let job = database.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Retired);
        assert_eq!(job.retired_reason.as_deref(), Some("task completed"));

        let comments = database.comments_for(task.id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "system");
        assert_eq!(comments[0].body, "Status changed to completed");
    }

    #[tokio::test]
    async fn test_cancellation_reason_recorded() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, job) = coordinator.create_task(&new, policy()).await.unwrap();

        coordinator
            .set_status(task.id, TaskStatus::Cancelled)
            .await
            .unwrap();

        let job = database.get_job(job.id).await.unwrap();
        assert_eq!(job.retired_reason.as_deref(), Some("task cancelled"));
    }

    #[tokio::test]
    async fn test_open_in_progress_cycle_keeps_job() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, _job) = coordinator.create_task(&new, policy()).await.unwrap();

        coordinator
            .set_status(task.id, TaskStatus::InProgress)
            .await
            .unwrap();
        coordinator.set_status(task.id, TaskStatus::Open).await.unwrap();

        let job = database.get_active_job(task.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(database.comments_for(task.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_terminal_task_rejects_reopen() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, _job) = coordinator.create_task(&new, policy()).await.unwrap();

        coordinator
            .set_status(task.id, TaskStatus::Completed)
            .await
            .unwrap();
        assert!(coordinator
            .set_status(task.id, TaskStatus::Open)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_replace_policy_leaves_one_active_job() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, old_job) = coordinator.create_task(&new, policy()).await.unwrap();

        let later = ReminderPolicy::new(Utc::now() + Duration::days(1), 1, 3).unwrap();
        let new_job = coordinator.replace_policy(task.id, later).await.unwrap();
        assert_ne!(new_job.id, old_job.id);

        let active = database.get_active_job(task.id).await.unwrap().unwrap();
        assert_eq!(active.id, new_job.id);
        let old = database.get_job(old_job.id).await.unwrap();
        assert_eq!(old.retired_reason.as_deref(), Some("policy replaced"));
    }

    #[tokio::test]
    async fn test_delete_retires_job_and_keeps_history() {
        let (database, _gw, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, job) = coordinator.create_task(&new, policy()).await.unwrap();

        assert!(coordinator.delete_task(task.id).await.unwrap());
        assert!(database.get_task(task.id).await.is_err());

        // The job row survives as history
        let job = database.get_job(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Retired);
        assert_eq!(job.retired_reason.as_deref(), Some("task deleted"));
    }

    #[tokio::test]
    async fn test_remind_now_goes_through_dispatcher() {
        let (database, gateway, coordinator) = setup().await;
        let new = new_task(&database).await;
        let (task, job) = coordinator.create_task(&new, policy()).await.unwrap();

        coordinator.remind_now(task.id).await.unwrap();
        assert_eq!(gateway.sent.lock().await.len(), 1);

        // Cadence untouched by the out-of-band send
        let job_after = database.get_job(job.id).await.unwrap();
        assert_eq!(job_after.next_due, job.next_due);
    }
}
