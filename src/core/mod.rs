//! # Core Module
//!
//! Configuration and message templating for the reminder engine.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add template module with placeholder rendering
//! - 1.0.0: Initial creation with config module

pub mod config;
pub mod template;

// Re-export commonly used items
pub use config::Config;
pub use template::{render_message, DEFAULT_TEMPLATE, MESSAGE_TEMPLATE_KEY};
