//! Czech public holidays.
//!
//! The table for a year is a pure function of the calendar: eleven fixed
//! dates plus Good Friday and Easter Monday, both derived from Western Easter.
//! [`HolidayOracle`] memoizes tables per year; recomputing is always safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate};
use dashmap::DashMap;

pub type HolidayTable = BTreeMap<NaiveDate, &'static str>;

const FIXED_HOLIDAYS: [(u32, u32, &str); 11] = [
    (1, 1, "New Year's Day, Restoration Day of the Independent Czech State"),
    (5, 1, "Labour Day"),
    (5, 8, "Liberation Day"),
    (7, 5, "Saints Cyril and Methodius Day"),
    (7, 6, "Jan Hus Day"),
    (9, 28, "Czech Statehood Day"),
    (10, 28, "Independent Czechoslovak State Day"),
    (11, 17, "Struggle for Freedom and Democracy Day"),
    (12, 24, "Christmas Eve"),
    (12, 25, "Christmas Day"),
    (12, 26, "St. Stephen's Day"),
];

const GOOD_FRIDAY: &str = "Good Friday";
const EASTER_MONDAY: &str = "Easter Monday";

/// Western Easter Sunday (Meeus/Butcher). `None` only outside chrono's date range.
pub fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year.rem_euclid(19);
    let b = year.div_euclid(100);
    let c = year.rem_euclid(100);
    let d = b.div_euclid(4);
    let e = b.rem_euclid(4);
    let f = (b + 8).div_euclid(25);
    let g = (b - f + 1).div_euclid(3);
    let h = (19 * a + b - d - g + 15).rem_euclid(30);
    let i = c.div_euclid(4);
    let k = c.rem_euclid(4);
    let l = (32 + 2 * e + 2 * i - h - k).rem_euclid(7);
    let m = (a + 11 * h + 22 * l).div_euclid(451);
    let month = (h + l - 7 * m + 114).div_euclid(31);
    let day = (h + l - 7 * m + 114).rem_euclid(31) + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

pub fn holidays_for_year(year: i32) -> HolidayTable {
    let mut table = HolidayTable::new();
    for (month, day, name) in FIXED_HOLIDAYS {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            table.insert(date, name);
        }
    }
    if let Some(easter) = easter_sunday(year) {
        if let Some(friday) = easter.checked_sub_days(Days::new(2)) {
            table.insert(friday, GOOD_FRIDAY);
        }
        if let Some(monday) = easter.checked_add_days(Days::new(1)) {
            table.insert(monday, EASTER_MONDAY);
        }
    }
    table
}

pub fn is_holiday(date: NaiveDate) -> bool {
    holidays_for_year(date.year()).contains_key(&date)
}

pub fn holiday_name(date: NaiveDate) -> Option<&'static str> {
    holidays_for_year(date.year()).get(&date).copied()
}

/// Per-year memo over [`holidays_for_year`].
#[derive(Default)]
pub struct HolidayOracle {
    years: DashMap<i32, Arc<HolidayTable>>,
}

impl HolidayOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, year: i32) -> Arc<HolidayTable> {
        self.years
            .entry(year)
            .or_insert_with(|| Arc::new(holidays_for_year(year)))
            .value()
            .clone()
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.table(date.year()).contains_key(&date)
    }

    pub fn name_of(&self, date: NaiveDate) -> Option<&'static str> {
        self.table(date.year()).get(&date).copied()
    }
}
