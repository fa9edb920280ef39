//! Reminder message rendering.
//!
//! The operator-editable template lives in the settings table under
//! [`MESSAGE_TEMPLATE_KEY`]; the dispatcher reads it on every send so edits
//! take effect without a restart. Placeholders: `{assignee_name}`, `{title}`,
//! `{description}`, `{due_date}`, `{priority}`, `{status}`.

use chrono::FixedOffset;

use crate::features::contacts::Contact;
use crate::features::tasks::Task;

/// Settings key under which the message template is stored.
pub const MESSAGE_TEMPLATE_KEY: &str = "message_template";

/// Template seeded into the settings table on first run.
pub const DEFAULT_TEMPLATE: &str =
    "Hi {assignee_name}, what's the update on the task \"{title}\"? (Due: {due_date})";

/// Longest description slice substituted into a message.
const DESCRIPTION_LIMIT: usize = 500;

/// Render a reminder message for a task and its assignee.
///
/// The due date is formatted in the configured display offset; tasks without
/// a due date render as `N/A`.
pub fn render_message(template: &str, task: &Task, contact: &Contact, tz: &FixedOffset) -> String {
    let due_str = match task.due_at {
        Some(due) => due
            .with_timezone(tz)
            .format("%d-%b-%Y %I:%M %p")
            .to_string(),
        None => "N/A".to_string(),
    };

    let description: String = task.description.chars().take(DESCRIPTION_LIMIT).collect();

    template
        .replace("{assignee_name}", &contact.name)
        .replace("{title}", &task.title)
        .replace("{description}", &description)
        .replace("{due_date}", &due_str)
        .replace("{priority}", task.priority.as_str())
        .replace("{status}", task.status.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::tasks::{Priority, TaskStatus};
    use chrono::{TimeZone, Utc};

    fn sample_task() -> Task {
        Task {
            id: 7,
            title: "Ship the report".to_string(),
            description: "Quarterly numbers".to_string(),
            status: TaskStatus::Open,
            priority: Priority::High,
            due_at: Some(Utc.with_ymd_and_hms(2025, 3, 14, 12, 30, 0).unwrap()),
            assignee_id: 1,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap(),
        }
    }

    fn sample_contact() -> Contact {
        Contact {
            id: 1,
            name: "Asha".to_string(),
            phone_raw: "98765 43210".to_string(),
            phone_e164: "+919876543210".to_string(),
            destination: "919876543210@c.us".to_string(),
            tags: String::new(),
            note: String::new(),
        }
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let tz = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let rendered = render_message(
            "{assignee_name}|{title}|{description}|{priority}|{status}",
            &sample_task(),
            &sample_contact(),
            &tz,
        );
        assert_eq!(rendered, "Asha|Ship the report|Quarterly numbers|high|open");
    }

    #[test]
    fn test_render_due_date_in_display_offset() {
        let tz = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let rendered = render_message("{due_date}", &sample_task(), &sample_contact(), &tz);
        // 12:30 UTC is 18:00 IST
        assert_eq!(rendered, "14-Mar-2025 06:00 PM");
    }

    #[test]
    fn test_render_missing_due_date() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let mut task = sample_task();
        task.due_at = None;
        let rendered = render_message(DEFAULT_TEMPLATE, &task, &sample_contact(), &tz);
        assert!(rendered.contains("(Due: N/A)"));
        assert!(rendered.starts_with("Hi Asha,"));
    }

    #[test]
    fn test_render_truncates_long_description() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let mut task = sample_task();
        task.description = "x".repeat(2000);
        let rendered = render_message("{description}", &task, &sample_contact(), &tz);
        assert_eq!(rendered.len(), DESCRIPTION_LIMIT);
    }
}
