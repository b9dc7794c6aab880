use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::{FixedOffset, NaiveDate};

use crate::model::{AppState, PeriodSnapshot, PeriodType, TaskTemplate};
use crate::period;
use crate::validity;

/// Read access to persisted snapshots, synthesizing missing ones from the
/// current templates. Reads never persist anything.
pub struct SnapshotStore<'a> {
    templates: &'a [TaskTemplate],
    snapshots: &'a BTreeMap<String, PeriodSnapshot>,
    offset: FixedOffset,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(state: &'a AppState, offset: FixedOffset) -> Self {
        Self {
            templates: &state.templates,
            snapshots: &state.snapshots,
            offset,
        }
    }

    /// The persisted snapshot for the period containing `date`, verbatim, or
    /// a freshly derived one when the period was never written.
    pub fn get_snapshot(&self, date: NaiveDate, period: PeriodType) -> Cow<'a, PeriodSnapshot> {
        let key = period::period_key(date, period);
        match self.snapshots.get(&key) {
            Some(existing) => Cow::Borrowed(existing),
            None => Cow::Owned(derive_snapshot(self.templates, date, period, self.offset)),
        }
    }

    pub fn is_persisted(&self, date: NaiveDate, period: PeriodType) -> bool {
        self.snapshots.contains_key(&period::period_key(date, period))
    }
}

/// Build the snapshot a period would get if it were materialized now.
///
/// Candidates are templates of the requested granularity that are either
/// active or soft-deleted; the deletion instant then decides through the
/// validity rules. A template that is inactive without a deletion instant is
/// never due.
pub fn derive_snapshot(
    templates: &[TaskTemplate],
    date: NaiveDate,
    period: PeriodType,
    offset: FixedOffset,
) -> PeriodSnapshot {
    let instants = period::period_bounds(date, period).in_offset(offset);
    let due_task_ids: Vec<String> = templates
        .iter()
        .filter(|template| template.period == period)
        .filter(|template| template.active || template.is_deleted())
        .filter(|template| validity::template_valid_for(template, &instants))
        .map(|template| template.id.clone())
        .collect();
    let completion_map = due_task_ids.iter().map(|id| (id.clone(), false)).collect();
    PeriodSnapshot {
        period_key: period::period_key(date, period),
        period_type: period,
        due_task_ids,
        completion_map,
        one_off_tasks: Vec::new(),
    }
}
