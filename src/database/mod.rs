//! # Database Module
//!
//! Sqlite persistence behind a cloneable handle: contacts, tasks, comments,
//! settings, the reminder job store, and the append-only dispatch log.
//!
//! The job store is the sole source of truth for the schedule. No in-memory
//! schedule is kept anywhere; after a restart the scheduler resumes from
//! these rows alone. Status and next-due always change in a single UPDATE
//! (or inside one transaction), so a crash cannot strand a job between
//! "fired" and "rescheduled".
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Reminder job store with partial unique index on active jobs
//! - 1.0.0: Initial release with contact/task/settings CRUD

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use sqlite::{Connection, ConnectionThreadSafe, State};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::features::contacts::Contact;
use crate::features::dispatch::DispatchRecord;
use crate::features::scheduler::{LastOutcome, ReminderJob, ReminderPolicy, RetireReason};
use crate::features::tasks::{NewTask, Task, TaskComment, TaskFilter, TaskStatus};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS contacts (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    phone_raw   TEXT NOT NULL DEFAULT '',
    phone_e164  TEXT NOT NULL,
    destination TEXT NOT NULL UNIQUE,
    tags        TEXT NOT NULL DEFAULT '',
    note        TEXT NOT NULL DEFAULT '',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS settings (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    title       TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status      TEXT NOT NULL DEFAULT 'open',
    priority    TEXT NOT NULL DEFAULT 'medium',
    due_at      TEXT,
    assignee_id INTEGER NOT NULL REFERENCES contacts(id),
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS task_comments (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id    INTEGER NOT NULL REFERENCES tasks(id),
    author     TEXT NOT NULL DEFAULT 'admin',
    body       TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reminder_jobs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id        INTEGER NOT NULL REFERENCES tasks(id),
    start_at       TEXT NOT NULL,
    frequency_days INTEGER NOT NULL,
    window_days    INTEGER NOT NULL,
    end_at         TEXT NOT NULL,
    next_due       TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'scheduled',
    last_run_at    TEXT,
    last_outcome   TEXT NOT NULL DEFAULT 'none',
    last_detail    TEXT,
    retired_reason TEXT,
    created_at     TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_reminder_jobs_active
    ON reminder_jobs(task_id) WHERE status != 'retired';
CREATE INDEX IF NOT EXISTS ix_reminder_jobs_due
    ON reminder_jobs(next_due) WHERE status = 'scheduled';
CREATE TABLE IF NOT EXISTS dispatch_log (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id       INTEGER,
    task_id      INTEGER NOT NULL,
    attempted_at TEXT NOT NULL,
    destination  TEXT NOT NULL,
    outcome      TEXT NOT NULL,
    detail       TEXT
);
";

/// Serialize a timestamp as fixed-width UTC RFC 3339 so that lexicographic
/// comparison in SQL matches chronological order.
fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

/// Cloneable handle to the sqlite store.
///
/// A single connection guarded by an async mutex: every read-then-write
/// sequence holds the lock for its whole scope, which is the mutual
/// exclusion the scheduler and the lifecycle coordinator rely on.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<ConnectionThreadSafe>>,
}

/// Run `f` inside an immediate transaction, rolling back on error.
fn with_tx<T>(
    conn: &ConnectionThreadSafe,
    f: impl FnOnce(&ConnectionThreadSafe) -> Result<T>,
) -> Result<T> {
    conn.execute("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.execute("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute("ROLLBACK");
            Err(e)
        }
    }
}

fn last_insert_rowid(conn: &ConnectionThreadSafe) -> Result<i64> {
    let mut stmt = conn.prepare("SELECT last_insert_rowid()")?;
    if stmt.next()? == State::Row {
        Ok(stmt.read::<i64, _>(0)?)
    } else {
        Err(Error::Storage("last_insert_rowid returned no row".into()))
    }
}

impl Database {
    /// Open (or create) the database and bootstrap the schema.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open_thread_safe(path)?;
        conn.execute(SCHEMA)?;

        // Seed the default message template on first run
        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")?;
        stmt.bind((1, crate::core::MESSAGE_TEMPLATE_KEY))?;
        stmt.bind((2, crate::core::DEFAULT_TEMPLATE))?;
        stmt.next()?;
        drop(stmt);

        debug!("Database ready at {path}");
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- settings ----

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key = ?")?;
        stmt.bind((1, key))?;
        if stmt.next()? == State::Row {
            Ok(Some(stmt.read::<String, _>(0)?))
        } else {
            Ok(None)
        }
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")?;
        stmt.bind((1, key))?;
        stmt.bind((2, value))?;
        stmt.next()?;
        Ok(())
    }

    // ---- contacts ----

    /// Insert a contact, or update the existing one with the same derived
    /// destination. The destination is always computed from `phone_e164`,
    /// never accepted from a caller. Empty name/tags/note leave the stored
    /// values untouched.
    pub async fn upsert_contact(
        &self,
        name: &str,
        phone_raw: &str,
        phone_e164: &str,
        tags: &str,
        note: &str,
    ) -> Result<Contact> {
        let destination = crate::features::contacts::destination_from_e164(phone_e164);
        let destination = destination.as_str();
        let conn = self.conn.lock().await;
        let now = fmt_ts(&Utc::now());

        let id = with_tx(&conn, |conn| {
            let mut stmt = conn.prepare("SELECT id FROM contacts WHERE destination = ?")?;
            stmt.bind((1, destination))?;
            let existing = if stmt.next()? == State::Row {
                Some(stmt.read::<i64, _>(0)?)
            } else {
                None
            };
            drop(stmt);

            match existing {
                Some(id) => {
                    let mut stmt = conn.prepare(
                        "UPDATE contacts SET
                             name = CASE WHEN ? != '' THEN ? ELSE name END,
                             phone_raw = ?, phone_e164 = ?,
                             tags = CASE WHEN ? != '' THEN ? ELSE tags END,
                             note = CASE WHEN ? != '' THEN ? ELSE note END,
                             updated_at = ?
                         WHERE id = ?",
                    )?;
                    stmt.bind((1, name))?;
                    stmt.bind((2, name))?;
                    stmt.bind((3, phone_raw))?;
                    stmt.bind((4, phone_e164))?;
                    stmt.bind((5, tags))?;
                    stmt.bind((6, tags))?;
                    stmt.bind((7, note))?;
                    stmt.bind((8, note))?;
                    stmt.bind((9, now.as_str()))?;
                    stmt.bind((10, id))?;
                    stmt.next()?;
                    Ok(id)
                }
                None => {
                    let mut stmt = conn.prepare(
                        "INSERT INTO contacts
                             (name, phone_raw, phone_e164, destination, tags, note,
                              created_at, updated_at)
                         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    )?;
                    stmt.bind((1, name))?;
                    stmt.bind((2, phone_raw))?;
                    stmt.bind((3, phone_e164))?;
                    stmt.bind((4, destination))?;
                    stmt.bind((5, tags))?;
                    stmt.bind((6, note))?;
                    stmt.bind((7, now.as_str()))?;
                    stmt.bind((8, now.as_str()))?;
                    stmt.next()?;
                    last_insert_rowid(conn)
                }
            }
        })?;

        Self::contact_by_id(&conn, id)
    }

    pub async fn get_contact(&self, id: i64) -> Result<Contact> {
        let conn = self.conn.lock().await;
        Self::contact_by_id(&conn, id)
    }

    /// Contacts matching a free-text search over name/phone/note and an
    /// optional tag substring, ordered by name.
    pub async fn list_contacts(&self, search: &str, tag: &str) -> Result<Vec<Contact>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, name, phone_raw, phone_e164, destination, tags, note
             FROM contacts
             WHERE (? = '' OR name LIKE '%'||?||'%'
                 OR phone_e164 LIKE '%'||?||'%' OR note LIKE '%'||?||'%')
               AND (? = '' OR tags LIKE '%'||?||'%')
             ORDER BY name ASC",
        )?;
        stmt.bind((1, search))?;
        stmt.bind((2, search))?;
        stmt.bind((3, search))?;
        stmt.bind((4, search))?;
        stmt.bind((5, tag))?;
        stmt.bind((6, tag))?;

        let mut contacts = Vec::new();
        while stmt.next()? == State::Row {
            contacts.push(Self::read_contact(&stmt)?);
        }
        Ok(contacts)
    }

    fn contact_by_id(conn: &ConnectionThreadSafe, id: i64) -> Result<Contact> {
        let mut stmt = conn.prepare(
            "SELECT id, name, phone_raw, phone_e164, destination, tags, note
             FROM contacts WHERE id = ?",
        )?;
        stmt.bind((1, id))?;
        if stmt.next()? == State::Row {
            Self::read_contact(&stmt)
        } else {
            Err(Error::NotFound(format!("contact {id}")))
        }
    }

    fn read_contact(stmt: &sqlite::Statement<'_>) -> Result<Contact> {
        Ok(Contact {
            id: stmt.read::<i64, _>("id")?,
            name: stmt.read::<String, _>("name")?,
            phone_raw: stmt.read::<String, _>("phone_raw")?,
            phone_e164: stmt.read::<String, _>("phone_e164")?,
            destination: stmt.read::<String, _>("destination")?,
            tags: stmt.read::<String, _>("tags")?,
            note: stmt.read::<String, _>("note")?,
        })
    }

    // ---- tasks ----

    pub async fn create_task(&self, new: &NewTask) -> Result<Task> {
        let conn = self.conn.lock().await;
        let now = fmt_ts(&Utc::now());

        let mut stmt = conn.prepare(
            "INSERT INTO tasks
                 (title, description, status, priority, due_at, assignee_id,
                  created_at, updated_at)
             VALUES (?, ?, 'open', ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, new.title.trim()))?;
        stmt.bind((2, new.description.trim()))?;
        stmt.bind((3, new.priority.as_str()))?;
        stmt.bind((4, new.due_at.as_ref().map(fmt_ts).as_deref()))?;
        stmt.bind((5, new.assignee_id))?;
        stmt.bind((6, now.as_str()))?;
        stmt.bind((7, now.as_str()))?;
        stmt.next()?;
        drop(stmt);

        let id = last_insert_rowid(&conn)?;
        Self::task_by_id(&conn, id)
    }

    pub async fn get_task(&self, id: i64) -> Result<Task> {
        let conn = self.conn.lock().await;
        Self::task_by_id(&conn, id)
    }

    /// Update a task's status column. Transition legality is the lifecycle
    /// coordinator's job; the store only writes.
    pub async fn set_task_status(&self, id: i64, status: TaskStatus) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")?;
        stmt.bind((1, status.as_str()))?;
        stmt.bind((2, fmt_ts(&Utc::now()).as_str()))?;
        stmt.bind((3, id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// Delete a task and its comments. Reminder jobs for the task must be
    /// retired by the caller first; their rows are kept as history.
    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        with_tx(&conn, |conn| {
            let mut stmt = conn.prepare("DELETE FROM task_comments WHERE task_id = ?")?;
            stmt.bind((1, id))?;
            stmt.next()?;
            drop(stmt);

            let mut stmt = conn.prepare("DELETE FROM tasks WHERE id = ?")?;
            stmt.bind((1, id))?;
            stmt.next()?;
            Ok(conn.change_count() > 0)
        })
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let conn = self.conn.lock().await;
        let status = filter.status.map(|s| s.as_str()).unwrap_or("");
        let assignee = filter.assignee_id.unwrap_or(0);
        let search = filter.search.as_deref().unwrap_or("");

        let mut stmt = conn.prepare(
            "SELECT id, title, description, status, priority, due_at, assignee_id, created_at
             FROM tasks
             WHERE (? = '' OR status = ?)
               AND (? = 0 OR assignee_id = ?)
               AND (? = '' OR title LIKE '%'||?||'%' OR description LIKE '%'||?||'%')
             ORDER BY created_at DESC",
        )?;
        stmt.bind((1, status))?;
        stmt.bind((2, status))?;
        stmt.bind((3, assignee))?;
        stmt.bind((4, assignee))?;
        stmt.bind((5, search))?;
        stmt.bind((6, search))?;
        stmt.bind((7, search))?;

        let mut tasks = Vec::new();
        while stmt.next()? == State::Row {
            tasks.push(Self::read_task(&stmt)?);
        }
        Ok(tasks)
    }

    fn task_by_id(conn: &ConnectionThreadSafe, id: i64) -> Result<Task> {
        let mut stmt = conn.prepare(
            "SELECT id, title, description, status, priority, due_at, assignee_id, created_at
             FROM tasks WHERE id = ?",
        )?;
        stmt.bind((1, id))?;
        if stmt.next()? == State::Row {
            Self::read_task(&stmt)
        } else {
            Err(Error::NotFound(format!("task {id}")))
        }
    }

    fn read_task(stmt: &sqlite::Statement<'_>) -> Result<Task> {
        Ok(Task {
            id: stmt.read::<i64, _>("id")?,
            title: stmt.read::<String, _>("title")?,
            description: stmt.read::<String, _>("description")?,
            status: stmt.read::<String, _>("status")?.parse()?,
            priority: stmt.read::<String, _>("priority")?.parse()?,
            due_at: parse_opt_ts(stmt.read::<Option<String>, _>("due_at")?)?,
            assignee_id: stmt.read::<i64, _>("assignee_id")?,
            created_at: parse_ts(&stmt.read::<String, _>("created_at")?)?,
        })
    }

    // ---- comments ----

    pub async fn add_comment(&self, task_id: i64, author: &str, body: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO task_comments (task_id, author, body, created_at)
             VALUES (?, ?, ?, ?)",
        )?;
        stmt.bind((1, task_id))?;
        stmt.bind((2, author))?;
        stmt.bind((3, body))?;
        stmt.bind((4, fmt_ts(&Utc::now()).as_str()))?;
        stmt.next()?;
        Ok(())
    }

    pub async fn comments_for(&self, task_id: i64) -> Result<Vec<TaskComment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, author, body, created_at
             FROM task_comments WHERE task_id = ? ORDER BY created_at ASC",
        )?;
        stmt.bind((1, task_id))?;

        let mut comments = Vec::new();
        while stmt.next()? == State::Row {
            comments.push(TaskComment {
                id: stmt.read::<i64, _>("id")?,
                task_id: stmt.read::<i64, _>("task_id")?,
                author: stmt.read::<String, _>("author")?,
                body: stmt.read::<String, _>("body")?,
                created_at: parse_ts(&stmt.read::<String, _>("created_at")?)?,
            });
        }
        Ok(comments)
    }

    // ---- reminder job store ----

    /// Create a reminder job for a task, retiring any prior non-retired job
    /// in the same transaction. The partial unique index on
    /// `reminder_jobs(task_id) WHERE status != 'retired'` makes "one active
    /// job per task" structural rather than conventional.
    pub async fn create_job(&self, task_id: i64, policy: &ReminderPolicy) -> Result<ReminderJob> {
        let conn = self.conn.lock().await;
        let now = fmt_ts(&Utc::now());

        let id = with_tx(&conn, |conn| {
            let mut stmt = conn.prepare(
                "UPDATE reminder_jobs SET status = 'retired', retired_reason = ?
                 WHERE task_id = ? AND status != 'retired'",
            )?;
            stmt.bind((1, RetireReason::PolicyReplaced.as_str()))?;
            stmt.bind((2, task_id))?;
            stmt.next()?;
            drop(stmt);

            let mut stmt = conn.prepare(
                "INSERT INTO reminder_jobs
                     (task_id, start_at, frequency_days, window_days, end_at,
                      next_due, status, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, 'scheduled', ?)",
            )?;
            stmt.bind((1, task_id))?;
            stmt.bind((2, fmt_ts(&policy.start_at).as_str()))?;
            stmt.bind((3, policy.frequency_days))?;
            stmt.bind((4, policy.window_days))?;
            stmt.bind((5, fmt_ts(&policy.end_at()).as_str()))?;
            // First occurrence is the policy start even when it is already in
            // the past; the due query picks it up on the next tick (catch-up).
            stmt.bind((6, fmt_ts(&policy.start_at).as_str()))?;
            stmt.bind((7, now.as_str()))?;
            stmt.next()?;
            last_insert_rowid(conn)
        })?;

        Self::job_by_id(&conn, id)
    }

    pub async fn get_job(&self, id: i64) -> Result<ReminderJob> {
        let conn = self.conn.lock().await;
        Self::job_by_id(&conn, id)
    }

    /// The non-retired job for a task, if any.
    pub async fn get_active_job(&self, task_id: i64) -> Result<Option<ReminderJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM reminder_jobs WHERE task_id = ? AND status != 'retired'",
        )?;
        stmt.bind((1, task_id))?;
        if stmt.next()? == State::Row {
            Ok(Some(Self::read_job(&stmt)?))
        } else {
            Ok(None)
        }
    }

    /// All jobs with `next_due <= now` and status `scheduled`, earliest
    /// first. Paused and retired jobs never appear here.
    pub async fn due_jobs(&self, now: DateTime<Utc>) -> Result<Vec<ReminderJob>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM reminder_jobs
             WHERE status = 'scheduled' AND next_due <= ?
             ORDER BY next_due ASC",
        )?;
        stmt.bind((1, fmt_ts(&now).as_str()))?;

        let mut jobs = Vec::new();
        while stmt.next()? == State::Row {
            jobs.push(Self::read_job(&stmt)?);
        }
        Ok(jobs)
    }

    /// Advance a job to its next occurrence. Returns false when the job was
    /// concurrently retired or paused, in which case the occurrence must not
    /// be dispatched (retirement wins).
    pub async fn advance_job(&self, id: i64, next_due: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET next_due = ? WHERE id = ? AND status = 'scheduled'",
        )?;
        stmt.bind((1, fmt_ts(&next_due).as_str()))?;
        stmt.bind((2, id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// Terminally deactivate a job. Returns false if it was already retired.
    pub async fn retire_job(&self, id: i64, reason: RetireReason) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET status = 'retired', retired_reason = ?
             WHERE id = ? AND status != 'retired'",
        )?;
        stmt.bind((1, reason.as_str()))?;
        stmt.bind((2, id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// Retire whatever non-retired job a task currently has.
    pub async fn retire_job_for_task(&self, task_id: i64, reason: RetireReason) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET status = 'retired', retired_reason = ?
             WHERE task_id = ? AND status != 'retired'",
        )?;
        stmt.bind((1, reason.as_str()))?;
        stmt.bind((2, task_id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// Record the outcome of an occurrence on the job's last-run fields.
    /// Touches nothing else, so it is safe to run after a concurrent retire.
    pub async fn record_job_outcome(
        &self,
        id: i64,
        at: DateTime<Utc>,
        outcome: LastOutcome,
        detail: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET last_run_at = ?, last_outcome = ?, last_detail = ?
             WHERE id = ?",
        )?;
        stmt.bind((1, fmt_ts(&at).as_str()))?;
        stmt.bind((2, outcome.as_str()))?;
        stmt.bind((3, detail))?;
        stmt.bind((4, id))?;
        stmt.next()?;
        Ok(())
    }

    /// Park a scheduled job. Returns false when there was nothing to pause.
    pub async fn pause_job_for_task(&self, task_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET status = 'paused'
             WHERE task_id = ? AND status = 'scheduled'",
        )?;
        stmt.bind((1, task_id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// Resume a paused job. `retired` stays terminal.
    pub async fn resume_job_for_task(&self, task_id: i64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "UPDATE reminder_jobs SET status = 'scheduled'
             WHERE task_id = ? AND status = 'paused'",
        )?;
        stmt.bind((1, task_id))?;
        stmt.next()?;
        Ok(conn.change_count() > 0)
    }

    /// Operator view: every job, newest first, with last outcome and raw
    /// gateway detail.
    pub async fn list_jobs(&self) -> Result<Vec<ReminderJob>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM reminder_jobs ORDER BY created_at DESC, id DESC")?;

        let mut jobs = Vec::new();
        while stmt.next()? == State::Row {
            jobs.push(Self::read_job(&stmt)?);
        }
        Ok(jobs)
    }

    fn job_by_id(conn: &ConnectionThreadSafe, id: i64) -> Result<ReminderJob> {
        let mut stmt = conn.prepare("SELECT * FROM reminder_jobs WHERE id = ?")?;
        stmt.bind((1, id))?;
        if stmt.next()? == State::Row {
            Self::read_job(&stmt)
        } else {
            Err(Error::NotFound(format!("reminder job {id}")))
        }
    }

    fn read_job(stmt: &sqlite::Statement<'_>) -> Result<ReminderJob> {
        let policy = ReminderPolicy {
            start_at: parse_ts(&stmt.read::<String, _>("start_at")?)?,
            frequency_days: stmt.read::<i64, _>("frequency_days")?,
            window_days: stmt.read::<i64, _>("window_days")?,
        };
        Ok(ReminderJob {
            id: stmt.read::<i64, _>("id")?,
            task_id: stmt.read::<i64, _>("task_id")?,
            policy,
            end_at: parse_ts(&stmt.read::<String, _>("end_at")?)?,
            next_due: parse_ts(&stmt.read::<String, _>("next_due")?)?,
            status: stmt.read::<String, _>("status")?.parse()?,
            last_run_at: parse_opt_ts(stmt.read::<Option<String>, _>("last_run_at")?)?,
            last_outcome: stmt.read::<String, _>("last_outcome")?.parse()?,
            last_detail: stmt.read::<Option<String>, _>("last_detail")?,
            retired_reason: stmt.read::<Option<String>, _>("retired_reason")?,
            created_at: parse_ts(&stmt.read::<String, _>("created_at")?)?,
        })
    }

    // ---- dispatch log ----

    /// Append one dispatch attempt. Never updated afterwards.
    pub async fn log_dispatch(
        &self,
        job_id: Option<i64>,
        task_id: i64,
        attempted_at: DateTime<Utc>,
        destination: &str,
        outcome: LastOutcome,
        detail: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "INSERT INTO dispatch_log
                 (job_id, task_id, attempted_at, destination, outcome, detail)
             VALUES (?, ?, ?, ?, ?, ?)",
        )?;
        stmt.bind((1, job_id))?;
        stmt.bind((2, task_id))?;
        stmt.bind((3, fmt_ts(&attempted_at).as_str()))?;
        stmt.bind((4, destination))?;
        stmt.bind((5, outcome.as_str()))?;
        stmt.bind((6, detail))?;
        stmt.next()?;
        Ok(())
    }

    pub async fn recent_dispatches(&self, limit: i64) -> Result<Vec<DispatchRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, job_id, task_id, attempted_at, destination, outcome, detail
             FROM dispatch_log ORDER BY id DESC LIMIT ?",
        )?;
        stmt.bind((1, limit))?;

        let mut records = Vec::new();
        while stmt.next()? == State::Row {
            records.push(DispatchRecord {
                id: stmt.read::<i64, _>("id")?,
                job_id: stmt.read::<Option<i64>, _>("job_id")?,
                task_id: stmt.read::<i64, _>("task_id")?,
                attempted_at: parse_ts(&stmt.read::<String, _>("attempted_at")?)?,
                destination: stmt.read::<String, _>("destination")?,
                outcome: stmt.read::<String, _>("outcome")?.parse()?,
                detail: stmt.read::<Option<String>, _>("detail")?,
            });
        }
        Ok(records)
    }
}
