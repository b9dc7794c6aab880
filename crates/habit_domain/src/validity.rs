use chrono::{DateTime, Utc};

use crate::model::TaskTemplate;
use crate::period::PeriodInstants;

/// Whether a recurring template is due in the period `[period_start, period_end]`.
///
/// A template populates every period whose end is at or after its creation,
/// including the period it was created in, and never an earlier one. A
/// deletion only removes it from periods starting at or after the deletion
/// instant.
pub fn is_valid_for_period(
    created_at: DateTime<Utc>,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
) -> bool {
    let created_before_end = created_at <= period_end;
    let not_deleted_yet = deleted_at.map_or(true, |deleted| deleted > period_start);
    created_before_end && not_deleted_yet
}

pub fn template_valid_for(template: &TaskTemplate, period: &PeriodInstants) -> bool {
    is_valid_for_period(template.created_at, period.start, period.end, template.deleted_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, hour, 0, 0).unwrap()
    }

    fn day_bounds(day: u32) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            at(day, 0),
            Utc.with_ymd_and_hms(2025, 1, day, 23, 59, 59).unwrap(),
        )
    }

    #[test]
    fn never_populates_earlier_periods() {
        let (start, end) = day_bounds(4);
        assert!(!is_valid_for_period(at(5, 9), start, end, None));
    }

    #[test]
    fn populates_the_period_it_was_created_in() {
        let (start, end) = day_bounds(5);
        assert!(is_valid_for_period(at(5, 21), start, end, None));
        let (start, end) = day_bounds(20);
        assert!(is_valid_for_period(at(5, 21), start, end, None));
    }

    #[test]
    fn deletion_only_affects_periods_starting_after_it() {
        let deleted = Some(at(10, 12));
        let (start, end) = day_bounds(9);
        assert!(is_valid_for_period(at(1, 0), start, end, deleted));
        let (start, end) = day_bounds(10);
        assert!(is_valid_for_period(at(1, 0), start, end, deleted));
        let (start, end) = day_bounds(11);
        assert!(!is_valid_for_period(at(1, 0), start, end, deleted));
    }

    #[test]
    fn deletion_exactly_at_period_start_excludes() {
        let (start, end) = day_bounds(10);
        assert!(!is_valid_for_period(at(1, 0), start, end, Some(start)));
    }

    #[test]
    fn created_and_deleted_in_same_period_stays_due() {
        let (start, end) = day_bounds(5);
        assert!(is_valid_for_period(at(5, 8), start, end, Some(at(5, 9))));
    }
}
