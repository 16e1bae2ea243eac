//! Owner time zone. Every local wall-clock ↔ UTC conversion goes through here.

use chrono::{
    DateTime, Datelike, Days, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc,
};
use chrono_tz::Tz;

use crate::model::Span;

/// Central European time, including DST transitions.
pub const OWNER_ZONE: Tz = chrono_tz::Europe::Prague;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// Wall-clock time skipped by a spring-forward transition.
    Nonexistent(NaiveDateTime),
    OutOfRange(NaiveDate),
}

impl std::fmt::Display for ZoneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneError::Nonexistent(t) => write!(f, "local time {t} does not exist in {OWNER_ZONE}"),
            ZoneError::OutOfRange(d) => write!(f, "date {d} is out of range"),
        }
    }
}

impl std::error::Error for ZoneError {}

/// Resolve a local wall-clock time to an instant.
///
/// Ambiguous times (the repeated hour of a fall-back transition) resolve to
/// the earlier instant. Nonexistent times are rejected, never normalized.
pub fn local_to_utc(local: NaiveDateTime) -> Result<DateTime<Utc>, ZoneError> {
    match OWNER_ZONE.from_local_datetime(&local) {
        LocalResult::Single(t) => Ok(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earlier, _) => Ok(earlier.with_timezone(&Utc)),
        LocalResult::None => Err(ZoneError::Nonexistent(local)),
    }
}

pub fn utc_to_local(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&OWNER_ZONE).naive_local()
}

/// The calendar date in the owner zone at `now`.
pub fn today(now: DateTime<Utc>) -> NaiveDate {
    utc_to_local(now).date()
}

/// `[local midnight of day, local midnight of day + 1)` as instants.
pub fn day_span_utc(day: NaiveDate) -> Result<Span, ZoneError> {
    let next = day.succ_opt().ok_or(ZoneError::OutOfRange(day))?;
    Ok(Span::new(
        local_to_utc(day.and_time(NaiveTime::MIN))?,
        local_to_utc(next.and_time(NaiveTime::MIN))?,
    ))
}

/// The whole local calendar month containing `day`.
pub fn month_span_utc(day: NaiveDate) -> Result<Span, ZoneError> {
    let first = first_of_month(day);
    let next = first
        .checked_add_months(Months::new(1))
        .ok_or(ZoneError::OutOfRange(day))?;
    Ok(Span::new(
        local_to_utc(first.and_time(NaiveTime::MIN))?,
        local_to_utc(next.and_time(NaiveTime::MIN))?,
    ))
}

pub fn first_of_month(day: NaiveDate) -> NaiveDate {
    day - Days::new(u64::from(day.day0()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn winter_is_utc_plus_one() {
        assert_eq!(local_to_utc(local(2025, 1, 14, 10, 0)), Ok(utc(2025, 1, 14, 9, 0)));
    }

    #[test]
    fn summer_is_utc_plus_two() {
        assert_eq!(local_to_utc(local(2025, 7, 15, 10, 0)), Ok(utc(2025, 7, 15, 8, 0)));
    }

    #[test]
    fn spring_forward_gap_rejected() {
        // 2025-03-30 02:00 → 03:00 local
        let gap = local(2025, 3, 30, 2, 30);
        assert_eq!(local_to_utc(gap), Err(ZoneError::Nonexistent(gap)));
    }

    #[test]
    fn fall_back_overlap_takes_earlier() {
        // 2025-10-26 03:00 → 02:00 local; 02:30 happens twice
        assert_eq!(local_to_utc(local(2025, 10, 26, 2, 30)), Ok(utc(2025, 10, 26, 0, 30)));
    }

    #[test]
    fn dst_day_is_23_hours_long() {
        let day = NaiveDate::from_ymd_opt(2025, 3, 30).unwrap();
        let span = day_span_utc(day).unwrap();
        assert_eq!(span.duration(), TimeDelta::hours(23));
        assert_eq!(span.start, utc(2025, 3, 29, 23, 0));
    }

    #[test]
    fn today_follows_owner_zone() {
        // 23:30 UTC on Jan 14 is already Jan 15 in Prague
        assert_eq!(
            today(utc(2025, 1, 14, 23, 30)),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
    }

    #[test]
    fn month_span_covers_calendar_month() {
        let span = month_span_utc(NaiveDate::from_ymd_opt(2025, 2, 17).unwrap()).unwrap();
        assert_eq!(span.start, utc(2025, 1, 31, 23, 0));
        assert_eq!(span.end, utc(2025, 2, 28, 23, 0));
    }
}
