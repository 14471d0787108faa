//! Reminder text for one task.

use relay_core::{message::DueTask, traits::REMINDER_MARKER};

fn or<'a>(value: &'a Option<String>, fallback: &'a str) -> &'a str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(fallback)
}

/// `2024-01-10T00:00:00.000Z` → `2024-01-10`.
fn day(value: &Option<String>) -> &str {
    let value = or(value, "N/A");
    value.get(..10).filter(|d| d.len() == 10 && value.len() > 10).unwrap_or(value)
}

fn percent(value: Option<f64>) -> String {
    match value {
        Some(p) if p.is_finite() => format!("{}", p.round() as i64),
        _ => "0".to_string(),
    }
}

/// Deterministic reminder text. Always starts with [`REMINDER_MARKER`], which
/// the backfill scan relies on.
pub fn format_task_reminder(task: &DueTask) -> String {
    let status = or(&task.status, "pending").replace('_', " ");
    format!(
        "{REMINDER_MARKER}\n\
         Hello {name},\n\
         \n\
         Task: {title}\n\
         Project: {project} / {list}\n\
         Period: {start} → {end}\n\
         Progress: {progress}%\n\
         Status: {status}",
        name = or(&task.assignee_name, "there"),
        title = or(&task.description, "N/A"),
        project = or(&task.project_title, "—"),
        list = or(&task.list_title, "—"),
        start = day(&task.start_date),
        end = day(&task.end_date),
        progress = percent(task.percentage),
    )
}
