use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::model::{PeriodSnapshot, PeriodType};
use crate::period;
use crate::service::HabitService;

/// Completion counts for one period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodSummary {
    pub recurring_total: usize,
    pub recurring_completed: usize,
    pub one_off_total: usize,
    pub one_off_completed: usize,
}

impl PeriodSummary {
    /// Completed recurring tasks are counted among the due set only.
    pub fn of(snapshot: &PeriodSnapshot) -> Self {
        Self {
            recurring_total: snapshot.due_task_ids.len(),
            recurring_completed: snapshot
                .due_task_ids
                .iter()
                .filter(|id| snapshot.is_completed(id))
                .count(),
            one_off_total: snapshot.one_off_tasks.len(),
            one_off_completed: snapshot
                .one_off_tasks
                .iter()
                .filter(|task| task.completed)
                .count(),
        }
    }

    pub fn total(&self) -> usize {
        self.recurring_total + self.one_off_total
    }

    pub fn completed(&self) -> usize {
        self.recurring_completed + self.one_off_completed
    }

    pub fn ratio_percent(&self) -> u32 {
        ratio_percent(self.completed(), self.total())
    }
}

/// `round(completed / total * 100)`, or 0 for an empty period.
pub fn ratio_percent(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (completed as f64 / total as f64 * 100.0).round() as u32
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrendPoint {
    pub key: String,
    pub label: String,
    pub ratio: u32,
    pub completed: usize,
    pub total: usize,
}

pub fn trend_length(period: PeriodType) -> i32 {
    match period {
        PeriodType::Daily => 14,
        PeriodType::Weekly => 12,
        PeriodType::Monthly => 12,
    }
}

/// Completion ratios of the most recent periods ending at `today`, oldest
/// first. Periods that were never written are derived on the fly.
pub fn completion_trend(
    service: &HabitService,
    today: NaiveDate,
    period: PeriodType,
) -> Vec<TrendPoint> {
    (0..trend_length(period))
        .rev()
        .filter_map(|back| period::next_period_date(today, period, -back))
        .map(|date| {
            let snapshot = service.get_snapshot(date, period);
            let summary = PeriodSummary::of(&snapshot);
            TrendPoint {
                key: snapshot.period_key,
                label: trend_label(date, period),
                ratio: summary.ratio_percent(),
                completed: summary.completed(),
                total: summary.total(),
            }
        })
        .collect()
}

/// Rounded mean ratio over the points that had anything to do.
pub fn average_ratio(points: &[TrendPoint]) -> u32 {
    let relevant: Vec<u32> = points
        .iter()
        .filter(|point| point.total > 0)
        .map(|point| point.ratio)
        .collect();
    if relevant.is_empty() {
        return 0;
    }
    let sum: u32 = relevant.iter().sum();
    (f64::from(sum) / relevant.len() as f64).round() as u32
}

fn trend_label(date: NaiveDate, period: PeriodType) -> String {
    match period {
        PeriodType::Daily => date.format("%b %-d").to_string(),
        PeriodType::Weekly => format!("W{:02}", date.iso_week().week()),
        PeriodType::Monthly => date.format("%b").to_string(),
    }
}
