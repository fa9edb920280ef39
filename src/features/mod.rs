// Feature modules for the reminder engine

pub mod contacts;
pub mod dispatch;
pub mod scheduler;
pub mod tasks;

// Re-export the main feature items
pub use contacts::{destination_from_e164, normalize_phone, Contact, ContactManager};
pub use dispatch::{DispatchRecord, Dispatcher, HttpGateway, MessageGateway};
pub use scheduler::{
    JobStatus, LastOutcome, ReminderJob, ReminderPolicy, ReminderScheduler, RetireReason,
};
pub use tasks::{LifecycleCoordinator, NewTask, Priority, Task, TaskStatus};
