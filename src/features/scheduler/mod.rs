//! # Scheduler Feature
//!
//! Polls the job store on a fixed tick, fires due reminder jobs through the
//! dispatcher, and advances or retires each job according to its policy.
//!
//! The store is consulted fresh every tick. Nothing about the schedule lives
//! in memory, so a restart resumes exactly where the rows say, and a job
//! retired by the lifecycle coordinator between ticks simply stops showing
//! up in the due query.
//!
//! Each due occurrence is consumed (next-due advanced, or the job retired)
//! before its message is sent. A crash mid-send therefore drops at most one
//! message instead of replaying it, and a concurrent retire always wins over
//! an in-flight occurrence.
//!
//! - **Version**: 2.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.1.0: Silent retire once the window has elapsed during downtime
//! - 2.0.0: Consume-before-dispatch ordering, catch-up on missed boundaries
//! - 1.0.0: Initial polling loop
//!
//! ## Submodules
//! - `policy`: Pure cadence math (start, frequency, window)
//! - `job`: Persisted job records and their status machine

pub mod job;
pub mod policy;

pub use job::{JobStatus, LastOutcome, ReminderJob, RetireReason};
pub use policy::ReminderPolicy;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::core::Config;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::features::dispatch::Dispatcher;

/// The polling scheduler core.
pub struct ReminderScheduler {
    database: Database,
    dispatcher: Dispatcher,
    tick: std::time::Duration,
    shutdown: watch::Receiver<bool>,
}

impl ReminderScheduler {
    pub fn new(
        database: Database,
        dispatcher: Dispatcher,
        config: &Config,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        ReminderScheduler {
            database,
            dispatcher,
            tick: std::time::Duration::from_secs(config.tick_seconds),
            shutdown,
        }
    }

    /// Poll until shutdown is signalled.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("⏰ Reminder scheduler running (tick every {:?})", self.tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick_once(Utc::now()).await {
                        Ok(fired) if fired > 0 => info!("Tick fired {fired} reminder(s)"),
                        Ok(_) => {}
                        Err(e) => error!("Scheduler tick failed: {e}"),
                    }
                }
                _ = self.shutdown.changed() => {
                    info!("Reminder scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Process every job due at `now`. Returns the number of occurrences
    /// dispatched. A failure on one job never blocks the rest.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.database.due_jobs(now).await?;
        let mut fired = 0;

        for job in due {
            match self.process_job(&job, now).await {
                Ok(true) => fired += 1,
                Ok(false) => {}
                Err(e) => warn!("Reminder job {} failed: {e}", job.id),
            }
        }
        Ok(fired)
    }

    async fn process_job(&self, job: &ReminderJob, now: DateTime<Utc>) -> Result<bool> {
        // Past the window the occurrence is stale, not late: retire without
        // sending. Covers downtime that outlasted the whole window.
        if now > job.end_at {
            if self
                .database
                .retire_job(job.id, RetireReason::WindowElapsed)
                .await?
            {
                info!(
                    "Reminder job {} for task {}: window elapsed, retired without sending",
                    job.id, job.task_id
                );
            }
            return Ok(false);
        }

        // Consume the occurrence first. Boundaries missed during downtime
        // collapse into this one send; the grid itself never shifts. If the
        // update touches no row, a concurrent retire or pause won.
        let consumed = match job.policy.next_occurrence_after(now) {
            Some(next_due) => self.database.advance_job(job.id, next_due).await?,
            // Last occurrence inside the window; fire it and stop.
            None => {
                self.database
                    .retire_job(job.id, RetireReason::WindowElapsed)
                    .await?
            }
        };
        if !consumed {
            return Ok(false);
        }

        match self.dispatcher.dispatch_job(job).await {
            Ok(_) => Ok(true),
            // The dispatcher already retired the job; nothing was sent.
            Err(Error::TaskClosed { status }) => {
                info!(
                    "Reminder job {} skipped: task {} is {status}",
                    job.id, job.task_id
                );
                Ok(false)
            }
            // Outcome recorded on the job; the next occurrence stands.
            Err(e) => {
                warn!("Reminder job {} dispatch failed: {e}", job.id);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::dispatch::testing::FakeGateway;
    use crate::features::tasks::{LifecycleCoordinator, NewTask, Priority, TaskStatus};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap() + Duration::days(n)
    }

    struct Harness {
        database: Database,
        gateway: Arc<FakeGateway>,
        scheduler: ReminderScheduler,
        task_id: i64,
    }

    async fn setup(policy: ReminderPolicy) -> Harness {
        let database = Database::new(":memory:").await.unwrap();
        let gateway = FakeGateway::new();
        let config = Config::for_tests();
        let dispatcher = Dispatcher::new(database.clone(), gateway.clone(), config.clone());
        let (_tx, rx) = watch::channel(false);
        let scheduler = ReminderScheduler::new(database.clone(), dispatcher, &config, rx);

        let contact = database
            .upsert_contact("Asha", "98765 43210", "+919876543210", "", "")
            .await
            .unwrap();
        let task = database
            .create_task(&NewTask {
                title: "write report".into(),
                description: String::new(),
                priority: Priority::Medium,
                due_at: None,
                assignee_id: contact.id,
            })
            .await
            .unwrap();
        database.create_job(task.id, &policy).await.unwrap();

        Harness {
            database,
            gateway,
            scheduler,
            task_id: task.id,
        }
    }

    async fn sent_count(h: &Harness) -> usize {
        h.gateway.sent.lock().await.len()
    }

    #[tokio::test]
    async fn test_cadence_grid_fires_then_retires() {
        // start day0, every 2 days, window 5: sends on day0, day2, day4 only
        let h = setup(ReminderPolicy::new(day(0), 2, 5).unwrap()).await;

        assert_eq!(h.scheduler.tick_once(day(0)).await.unwrap(), 1);
        // Same tick window again: the occurrence was consumed
        assert_eq!(h.scheduler.tick_once(day(0)).await.unwrap(), 0);
        assert_eq!(h.scheduler.tick_once(day(1)).await.unwrap(), 0);
        assert_eq!(h.scheduler.tick_once(day(2)).await.unwrap(), 1);
        assert_eq!(h.scheduler.tick_once(day(4)).await.unwrap(), 1);
        assert_eq!(h.scheduler.tick_once(day(6)).await.unwrap(), 0);

        assert_eq!(sent_count(&h).await, 3);
        let job = h.database.get_active_job(h.task_id).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn test_downtime_within_window_fires_once_and_keeps_grid() {
        // Offline across day0 and day2 boundaries; back at day3
        let h = setup(ReminderPolicy::new(day(0), 2, 10).unwrap()).await;

        assert_eq!(h.scheduler.tick_once(day(3)).await.unwrap(), 1);
        assert_eq!(sent_count(&h).await, 1);

        // Cadence resumes on the original grid: next boundary is day4
        let job = h.database.get_active_job(h.task_id).await.unwrap().unwrap();
        assert_eq!(job.next_due, day(4));
        assert_eq!(h.scheduler.tick_once(day(4)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_downtime_past_window_retires_silently() {
        let h = setup(ReminderPolicy::new(day(0), 2, 5).unwrap()).await;

        // Whole window missed; nothing may fire
        assert_eq!(h.scheduler.tick_once(day(9)).await.unwrap(), 0);
        assert_eq!(sent_count(&h).await, 0);

        let jobs = h.database.list_jobs().await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Retired);
        assert_eq!(jobs[0].retired_reason.as_deref(), Some("window elapsed"));
        assert_eq!(jobs[0].last_outcome, LastOutcome::None);
    }

    #[tokio::test]
    async fn test_retired_job_never_fires() {
        let h = setup(ReminderPolicy::new(day(0), 1, 7).unwrap()).await;
        h.database
            .retire_job_for_task(h.task_id, RetireReason::TaskCancelled)
            .await
            .unwrap();

        for n in 0..8 {
            assert_eq!(h.scheduler.tick_once(day(n)).await.unwrap(), 0);
        }
        assert_eq!(sent_count(&h).await, 0);
    }

    #[tokio::test]
    async fn test_closed_task_occurrence_is_dropped() {
        let h = setup(ReminderPolicy::new(day(0), 1, 7).unwrap()).await;
        // Closed directly in the store; the job is still scheduled
        h.database
            .set_task_status(h.task_id, TaskStatus::Completed)
            .await
            .unwrap();

        assert_eq!(h.scheduler.tick_once(day(0)).await.unwrap(), 0);
        assert_eq!(sent_count(&h).await, 0);
        assert!(h.database.get_active_job(h.task_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_job_scheduled() {
        let h = setup(ReminderPolicy::new(day(0), 2, 10).unwrap()).await;
        h.gateway.fail_next("HTTP 503: gateway down").await;

        // The occurrence was consumed even though the send failed
        assert_eq!(h.scheduler.tick_once(day(0)).await.unwrap(), 1);
        let job = h.database.get_active_job(h.task_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.next_due, day(2));
        assert_eq!(job.last_outcome, LastOutcome::Failure);

        // Next boundary sends normally; the failed one is not replayed
        assert_eq!(h.scheduler.tick_once(day(2)).await.unwrap(), 1);
        assert_eq!(sent_count(&h).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_cancel_and_tick_serialize() {
        // Race a tick against a cancel, every interleaving the current-thread
        // runtime produces: at most the one in-flight occurrence goes out,
        // the job always ends retired, and nothing fires afterwards.
        for _ in 0..25 {
            let database = Database::new(":memory:").await.unwrap();
            let gateway = FakeGateway::new();
            let config = Config::for_tests();
            let dispatcher = Dispatcher::new(database.clone(), gateway.clone(), config.clone());
            let coordinator =
                LifecycleCoordinator::new(database.clone(), dispatcher.clone(), &config);
            let (_tx, rx) = watch::channel(false);
            let scheduler = ReminderScheduler::new(database.clone(), dispatcher, &config, rx);

            let contact = database
                .upsert_contact("Asha", "98765 43210", "+919876543210", "", "")
                .await
                .unwrap();
            let task = database
                .create_task(&NewTask {
                    title: "write report".into(),
                    description: String::new(),
                    priority: Priority::Medium,
                    due_at: None,
                    assignee_id: contact.id,
                })
                .await
                .unwrap();
            database
                .create_job(task.id, &ReminderPolicy::new(day(0), 1, 7).unwrap())
                .await
                .unwrap();

            let (tick, cancel) = tokio::join!(
                scheduler.tick_once(day(0)),
                coordinator.set_status(task.id, TaskStatus::Cancelled)
            );
            tick.unwrap();
            cancel.unwrap();

            let sent_during_race = gateway.sent.lock().await.len();
            assert!(sent_during_race <= 1);

            let job = database.list_jobs().await.unwrap().remove(0);
            assert_eq!(job.status, JobStatus::Retired);
            assert_eq!(job.retired_reason.as_deref(), Some("task cancelled"));

            // Retirement is final: no later tick produces another send
            for n in 1..8 {
                assert_eq!(scheduler.tick_once(day(n)).await.unwrap(), 0);
            }
            assert_eq!(gateway.sent.lock().await.len(), sent_during_race);
        }
    }

    #[tokio::test]
    async fn test_fresh_scheduler_resumes_from_store() {
        let h = setup(ReminderPolicy::new(day(0), 2, 10).unwrap()).await;
        assert_eq!(h.scheduler.tick_once(day(0)).await.unwrap(), 1);
        drop(h.scheduler);

        // A new scheduler over the same store sees the same schedule
        let config = Config::for_tests();
        let dispatcher = Dispatcher::new(h.database.clone(), h.gateway.clone(), config.clone());
        let (_tx, rx) = watch::channel(false);
        let scheduler = ReminderScheduler::new(h.database.clone(), dispatcher, &config, rx);

        assert_eq!(scheduler.tick_once(day(1)).await.unwrap(), 0);
        assert_eq!(scheduler.tick_once(day(2)).await.unwrap(), 1);
        assert_eq!(h.gateway.sent.lock().await.len(), 2);
    }
}
