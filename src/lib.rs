// Core layer - configuration and message templating
pub mod core;

// Features layer - contacts, tasks, scheduling, dispatch
pub mod features;

// Infrastructure - sqlite persistence
pub mod database;

// Error types shared across the crate
pub mod error;

// Re-export core config
pub use core::Config;

// Re-export the items binaries and tests reach for
pub use database::Database;
pub use error::{Error, Result};
pub use features::{
    ContactManager, Dispatcher, HttpGateway, LifecycleCoordinator, MessageGateway, ReminderJob,
    ReminderPolicy, ReminderScheduler, Task, TaskStatus,
};
