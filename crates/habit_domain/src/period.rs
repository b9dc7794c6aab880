//! Period keys and bounds.
//!
//! A period is one calendar day, one ISO week (Monday through Sunday) or one
//! calendar month. Every function here is pure; bounds are expressed in local
//! wall-clock time and converted to instants with [`PeriodBounds::in_offset`].

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};

use crate::model::PeriodType;

/// Inclusive local bounds of a period. `end` is the last millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// [`PeriodBounds`] resolved to absolute instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodInstants {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodBounds {
    pub fn in_offset(&self, offset: FixedOffset) -> PeriodInstants {
        let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
        PeriodInstants {
            start: (self.start - shift).and_utc(),
            end: (self.end - shift).and_utc(),
        }
    }
}

/// Canonical identifier of the period containing `date`:
/// `YYYY-MM-DD`, `GGGG-Www` (ISO week-numbering year) or `YYYY-MM`.
pub fn period_key(date: NaiveDate, period: PeriodType) -> String {
    match period {
        PeriodType::Daily => date.format("%Y-%m-%d").to_string(),
        PeriodType::Weekly => {
            let week = date.iso_week();
            format!("{:04}-W{:02}", week.year(), week.week())
        }
        PeriodType::Monthly => date.format("%Y-%m").to_string(),
    }
}

pub fn period_bounds(date: NaiveDate, period: PeriodType) -> PeriodBounds {
    let start = period_start_date(date, period);
    let end = period_end_date(date, period);
    PeriodBounds {
        start: start.and_time(NaiveTime::MIN),
        end: (end + Duration::days(1)).and_time(NaiveTime::MIN) - Duration::milliseconds(1),
    }
}

pub fn period_start_date(date: NaiveDate, period: PeriodType) -> NaiveDate {
    match period {
        PeriodType::Daily => date,
        PeriodType::Weekly => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        PeriodType::Monthly => date - Duration::days(i64::from(date.day0())),
    }
}

pub fn period_end_date(date: NaiveDate, period: PeriodType) -> NaiveDate {
    let start = period_start_date(date, period);
    match period {
        PeriodType::Daily => start,
        PeriodType::Weekly => start + Duration::days(6),
        PeriodType::Monthly => {
            start + Duration::days(i64::from(days_in_month(start.year(), start.month())) - 1)
        }
    }
}

/// Step `amount` periods forward (or backward when negative). Month steps
/// clamp the day to the length of the target month.
pub fn next_period_date(date: NaiveDate, period: PeriodType, amount: i32) -> Option<NaiveDate> {
    match period {
        PeriodType::Daily => date.checked_add_signed(Duration::days(i64::from(amount))),
        PeriodType::Weekly => date.checked_add_signed(Duration::weeks(i64::from(amount))),
        PeriodType::Monthly => add_months(date, amount),
    }
}

/// First day of the period a key names, or `None` when the key is not the
/// canonical form for `period`.
pub fn parse_period_key(key: &str, period: PeriodType) -> Option<NaiveDate> {
    let date = match period {
        PeriodType::Daily => NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()?,
        PeriodType::Weekly => {
            let (year, week) = key.split_once("-W")?;
            NaiveDate::from_isoywd_opt(year.parse().ok()?, week.parse().ok()?, Weekday::Mon)?
        }
        PeriodType::Monthly => NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d").ok()?,
    };
    (period_key(date, period) == key).then_some(date)
}

/// Calendar date of `instant` as seen from `offset`.
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

fn add_months(date: NaiveDate, months: i32) -> Option<NaiveDate> {
    let total_months = date.year() * 12 + (date.month() as i32 - 1) + months;
    let target_year = total_months.div_euclid(12);
    let target_month = (total_months.rem_euclid(12) + 1) as u32;
    let day = date.day().min(days_in_month(target_year, target_month));
    NaiveDate::from_ymd_opt(target_year, target_month, day)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 30,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        date(y, m, d).and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn keys_follow_canonical_formats() {
        let day = date(2025, 3, 7);
        assert_eq!(period_key(day, PeriodType::Daily), "2025-03-07");
        assert_eq!(period_key(day, PeriodType::Weekly), "2025-W10");
        assert_eq!(period_key(day, PeriodType::Monthly), "2025-03");
    }

    #[test]
    fn weekly_key_shared_from_monday_to_sunday() {
        let monday = date(2025, 1, 6);
        let sunday = date(2025, 1, 12);
        assert_eq!(
            period_key(monday, PeriodType::Weekly),
            period_key(sunday, PeriodType::Weekly)
        );
        let previous_sunday = date(2025, 1, 5);
        assert_ne!(
            period_key(previous_sunday, PeriodType::Weekly),
            period_key(monday, PeriodType::Weekly)
        );
    }

    #[test]
    fn weekly_keys_use_iso_week_year() {
        assert_eq!(period_key(date(2023, 12, 31), PeriodType::Weekly), "2023-W52");
        assert_eq!(period_key(date(2024, 1, 1), PeriodType::Weekly), "2024-W01");
        // Monday Dec 29 2025 opens ISO week 1 of 2026.
        assert_eq!(period_key(date(2025, 12, 29), PeriodType::Weekly), "2026-W01");
        assert_eq!(period_key(date(2026, 1, 1), PeriodType::Weekly), "2026-W01");
        assert_ne!(
            period_key(date(2025, 12, 29), PeriodType::Weekly),
            period_key(date(2025, 1, 1), PeriodType::Weekly)
        );
    }

    #[test]
    fn daily_bounds_cover_the_whole_day() {
        let bounds = period_bounds(date(2025, 1, 5), PeriodType::Daily);
        assert_eq!(bounds.start, at(2025, 1, 5, 0, 0));
        assert_eq!(
            bounds.end,
            date(2025, 1, 5).and_hms_milli_opt(23, 59, 59, 999).unwrap()
        );
    }

    #[test]
    fn weekly_bounds_run_monday_to_sunday() {
        let bounds = period_bounds(date(2025, 1, 8), PeriodType::Weekly);
        assert_eq!(bounds.start, at(2025, 1, 6, 0, 0));
        assert_eq!(
            bounds.end,
            date(2025, 1, 12).and_hms_milli_opt(23, 59, 59, 999).unwrap()
        );
    }

    #[test]
    fn monthly_bounds_handle_leap_february() {
        let bounds = period_bounds(date(2024, 2, 10), PeriodType::Monthly);
        assert_eq!(bounds.start, at(2024, 2, 1, 0, 0));
        assert_eq!(bounds.end.date(), date(2024, 2, 29));
        let bounds = period_bounds(date(2025, 2, 10), PeriodType::Monthly);
        assert_eq!(bounds.end.date(), date(2025, 2, 28));
    }

    #[test]
    fn bounds_shift_into_utc_for_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let instants = period_bounds(date(2025, 1, 5), PeriodType::Daily).in_offset(offset);
        assert_eq!(instants.start, Utc.with_ymd_and_hms(2025, 1, 4, 22, 0, 0).unwrap());
        assert_eq!(local_date(instants.end, offset), date(2025, 1, 5));
    }

    #[test]
    fn steps_between_periods() {
        assert_eq!(
            next_period_date(date(2025, 1, 31), PeriodType::Monthly, 1),
            Some(date(2025, 2, 28))
        );
        assert_eq!(
            next_period_date(date(2025, 1, 15), PeriodType::Monthly, -1),
            Some(date(2024, 12, 15))
        );
        assert_eq!(
            next_period_date(date(2025, 1, 1), PeriodType::Weekly, -1),
            Some(date(2024, 12, 25))
        );
        assert_eq!(
            next_period_date(date(2025, 1, 1), PeriodType::Daily, 3),
            Some(date(2025, 1, 4))
        );
    }

    #[test]
    fn parses_only_canonical_keys() {
        assert_eq!(
            parse_period_key("2026-W01", PeriodType::Weekly),
            Some(date(2025, 12, 29))
        );
        assert_eq!(
            parse_period_key("2025-02", PeriodType::Monthly),
            Some(date(2025, 2, 1))
        );
        assert_eq!(
            parse_period_key("2025-01-05", PeriodType::Daily),
            Some(date(2025, 1, 5))
        );
        assert_eq!(parse_period_key("2025-W1", PeriodType::Weekly), None);
        assert_eq!(parse_period_key("2025-W54", PeriodType::Weekly), None);
        assert_eq!(parse_period_key("2025-01", PeriodType::Daily), None);
    }
}
