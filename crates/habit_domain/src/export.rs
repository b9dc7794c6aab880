//! CSV history export.
//!
//! The two task-list columns are wrapped in double quotes without escaping,
//! so titles containing quotes or `|` produce ambiguous rows.

use chrono::NaiveDate;

use crate::model::{AppState, PeriodSnapshot, PeriodType};
use crate::stats::PeriodSummary;

pub const CSV_HEADERS: [&str; 7] = [
    "Period Type",
    "Period Key",
    "Total Tasks",
    "Completed Tasks",
    "Ratio (%)",
    "Recurring Tasks",
    "One-Off Tasks",
];

/// One row per persisted snapshot, daily first, then weekly, then monthly,
/// each in key order.
pub fn export_csv(state: &AppState) -> String {
    let mut lines = vec![CSV_HEADERS.join(",")];
    for period in PeriodType::ALL {
        lines.extend(
            state
                .snapshots
                .values()
                .filter(|snapshot| snapshot.period_type == period)
                .map(|snapshot| csv_row(state, snapshot)),
        );
    }
    lines.join("\n")
}

pub fn export_file_name(date: NaiveDate) -> String {
    format!("habitflow_history_{}.csv", date.format("%Y-%m-%d"))
}

fn csv_row(state: &AppState, snapshot: &PeriodSnapshot) -> String {
    let summary = PeriodSummary::of(snapshot);
    let recurring = snapshot
        .due_task_ids
        .iter()
        .map(|id| {
            let title = state
                .template(id)
                .map(|template| template.title.as_str())
                .unwrap_or(id.as_str());
            format!("{}: {}", title, status_label(snapshot.is_completed(id)))
        })
        .collect::<Vec<_>>()
        .join(" | ");
    let one_offs = snapshot
        .one_off_tasks
        .iter()
        .map(|task| format!("{}: {}", task.title, status_label(task.completed)))
        .collect::<Vec<_>>()
        .join(" | ");
    format!(
        "{},{},{},{},{},\"{}\",\"{}\"",
        snapshot.period_type,
        snapshot.period_key,
        summary.total(),
        summary.completed(),
        summary.ratio_percent(),
        recurring,
        one_offs
    )
}

fn status_label(completed: bool) -> &'static str {
    if completed {
        "Done"
    } else {
        "Pending"
    }
}
