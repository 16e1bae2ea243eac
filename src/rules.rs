//! Availability predicates. Pure functions over dates and spans.

use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};

use crate::holidays::HolidayOracle;
use crate::limits::*;
use crate::model::Span;
use crate::zone::first_of_month;

pub fn buffer() -> TimeDelta {
    TimeDelta::minutes(BUFFER_MINUTES)
}

/// Local `[09:00, 16:00)` on `day`. Meetings must fit inside it.
pub fn business_hours(day: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let at_hour = |h: u32| day.and_time(NaiveTime::MIN + TimeDelta::hours(i64::from(h)));
    (at_hour(BUSINESS_DAY_START_HOUR), at_hour(BUSINESS_DAY_END_HOUR))
}

/// Length of the business day; no meeting can be longer.
pub fn business_day_length() -> TimeDelta {
    TimeDelta::hours(i64::from(BUSINESS_DAY_END_HOUR - BUSINESS_DAY_START_HOUR))
}

/// Last bookable day: `today` plus the window in calendar months, clamped to month end.
pub fn window_end(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(BOOKING_WINDOW_MONTHS))
        .unwrap_or(NaiveDate::MAX)
}

/// `today < day <= today + 2 months`. Today itself is never bookable.
pub fn is_within_window(day: NaiveDate, today: NaiveDate) -> bool {
    day > today && day <= window_end(today)
}

pub fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_weekend_or_holiday(day: NaiveDate, holidays: &HolidayOracle) -> bool {
    is_weekend(day) || holidays.is_holiday(day)
}

/// A guest may open this day at all.
pub fn is_bookable_day(day: NaiveDate, today: NaiveDate, holidays: &HolidayOracle) -> bool {
    is_within_window(day, today) && !is_weekend_or_holiday(day, holidays)
}

pub fn bookable_days_in_month(
    month: NaiveDate,
    today: NaiveDate,
    holidays: &HolidayOracle,
) -> Vec<NaiveDate> {
    let first = first_of_month(month);
    first
        .iter_days()
        .take_while(|d| d.month() == first.month())
        .filter(|d| is_bookable_day(*d, today, holidays))
        .collect()
}

/// `existing` holds the owner's appointments on the day in question.
pub fn respects_daily_limit(existing: &[Span]) -> bool {
    existing.len() < MAX_APPOINTMENTS_PER_DAY
}

/// Reject the candidate if it overlaps any existing span grown by the buffer
/// on both ends. Gaps of exactly the buffer are fine.
pub fn fits_with_buffer(candidate: &Span, existing: &[Span]) -> bool {
    let pad = buffer();
    !existing.iter().any(|e| e.padded(pad).overlaps(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, h, m, 0).unwrap()
    }

    fn span(h1: u32, m1: u32, h2: u32, m2: u32) -> Span {
        Span::new(at(h1, m1), at(h2, m2))
    }

    #[test]
    fn window_examples() {
        let today = date(2025, 1, 15);
        assert!(is_within_window(date(2025, 1, 16), today));
        assert!(!is_within_window(date(2025, 1, 15), today));
        assert!(!is_within_window(date(2025, 1, 14), today));
        assert!(is_within_window(date(2025, 3, 15), today));
        assert!(!is_within_window(date(2025, 3, 16), today));
    }

    #[test]
    fn window_end_clamps_to_month_end() {
        assert_eq!(window_end(date(2024, 12, 31)), date(2025, 2, 28));
        assert_eq!(window_end(date(2023, 12, 31)), date(2024, 2, 29));
    }

    #[test]
    fn weekends_and_holidays() {
        let holidays = HolidayOracle::new();
        assert!(is_weekend_or_holiday(date(2025, 3, 8), &holidays)); // Saturday
        assert!(is_weekend_or_holiday(date(2025, 3, 9), &holidays)); // Sunday
        assert!(is_weekend_or_holiday(date(2025, 4, 18), &holidays)); // Good Friday
        assert!(is_weekend_or_holiday(date(2025, 5, 8), &holidays)); // Thursday, holiday
        assert!(!is_weekend_or_holiday(date(2025, 3, 4), &holidays));
    }

    #[test]
    fn business_hours_are_nine_to_four() {
        let (open, close) = business_hours(date(2025, 3, 4));
        assert_eq!(open, date(2025, 3, 4).and_hms_opt(9, 0, 0).unwrap());
        assert_eq!(close, date(2025, 3, 4).and_hms_opt(16, 0, 0).unwrap());
        assert_eq!(close - open, business_day_length());
    }

    #[test]
    fn daily_limit() {
        let one = span(9, 0, 9, 30);
        assert!(respects_daily_limit(&[]));
        assert!(respects_daily_limit(&[one]));
        assert!(respects_daily_limit(&[one, one]));
        assert!(!respects_daily_limit(&[one, one, one]));
        assert!(!respects_daily_limit(&[one, one, one, one]));
    }

    #[test]
    fn buffer_gap_examples() {
        let existing = [span(10, 0, 10, 30)];
        assert!(!fits_with_buffer(&span(10, 44, 11, 14), &existing)); // 14 min gap
        assert!(fits_with_buffer(&span(10, 45, 11, 15), &existing)); // exactly 15
        assert!(!fits_with_buffer(&span(9, 16, 9, 46), &existing)); // 14 min before
        assert!(fits_with_buffer(&span(9, 15, 9, 45), &existing)); // 15 min before
        assert!(!fits_with_buffer(&span(10, 0, 10, 30), &existing)); // identical
    }

    #[test]
    fn buffer_with_no_existing_fits() {
        assert!(fits_with_buffer(&span(9, 0, 16, 0), &[]));
    }

    #[test]
    fn bookable_days_skip_weekends_holidays_and_window() {
        let holidays = HolidayOracle::new();
        let days = bookable_days_in_month(date(2025, 5, 20), date(2025, 4, 30), &holidays);
        assert!(!days.contains(&date(2025, 5, 1))); // Labour Day
        assert!(days.contains(&date(2025, 5, 2)));
        assert!(!days.contains(&date(2025, 5, 3))); // Saturday
        assert!(!days.contains(&date(2025, 5, 8))); // Liberation Day
        assert!(days.contains(&date(2025, 5, 30)));
        assert!(days.iter().all(|d| d.month() == 5));
    }

    #[test]
    fn bookable_days_empty_for_past_month() {
        let holidays = HolidayOracle::new();
        assert!(bookable_days_in_month(date(2025, 1, 1), date(2025, 6, 1), &holidays).is_empty());
    }

    proptest! {
        #[test]
        fn window_matches_month_arithmetic(today_off in 0i64..40_000, delta in -120i64..120) {
            let today = date(1990, 1, 1) + TimeDelta::days(today_off);
            let day = today + TimeDelta::days(delta);
            let limit = today.checked_add_months(Months::new(2)).unwrap();
            prop_assert_eq!(is_within_window(day, today), today < day && day <= limit);
        }

        #[test]
        fn buffer_check_is_symmetric(
            s1 in 0i64..600, l1 in 1i64..120,
            s2 in 0i64..600, l2 in 1i64..120,
        ) {
            let base = at(8, 0);
            let a = Span::new(base + TimeDelta::minutes(s1), base + TimeDelta::minutes(s1 + l1));
            let b = Span::new(base + TimeDelta::minutes(s2), base + TimeDelta::minutes(s2 + l2));
            prop_assert_eq!(fits_with_buffer(&a, &[b]), fits_with_buffer(&b, &[a]));
        }

        #[test]
        fn buffer_rejects_gaps_under_fifteen_minutes(
            s1 in 0i64..600, l1 in 1i64..120, gap in -200i64..200, l2 in 1i64..120,
        ) {
            let base = at(8, 0);
            let a = Span::new(base + TimeDelta::minutes(s1), base + TimeDelta::minutes(s1 + l1));
            let start2 = s1 + l1 + gap;
            let b = Span::new(base + TimeDelta::minutes(start2), base + TimeDelta::minutes(start2 + l2));
            let real_gap = if a.end <= b.start {
                (b.start - a.end).num_minutes()
            } else if b.end <= a.start {
                (a.start - b.end).num_minutes()
            } else {
                -1
            };
            prop_assert_eq!(fits_with_buffer(&b, &[a]), real_gap >= BUFFER_MINUTES);
        }
    }
}
