//! National holiday calendars.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used for days that are not holidays.
pub const NO_HOLIDAY: &str = "None";

/// Something that can name the holidays falling on a date.
pub trait HolidayCalendar: Send + Sync + std::fmt::Debug {
    /// Names of every holiday on `date`, in a stable order.
    fn holidays_on(&self, date: NaiveDate) -> Vec<String>;

    /// Joined holiday names, or `None` on an ordinary day.
    fn holiday_name(&self, date: NaiveDate) -> Option<String> {
        let names = self.holidays_on(date);
        if names.is_empty() {
            None
        } else {
            Some(names.join("; "))
        }
    }
}

/// A multi-day holiday whose date moves from year to year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovableHoliday {
    /// Holiday name
    pub name: String,
    /// First day
    pub start: NaiveDate,
    /// Number of consecutive days (default: 1)
    #[serde(default = "default_days")]
    pub days: u32,
}

const fn default_days() -> u32 {
    1
}

const RAMAZAN_BAYRAMI: &str = "Ramazan Bayramı";
const KURBAN_BAYRAMI: &str = "Kurban Bayramı";

/// First days of Ramazan Bayramı.
const RAMAZAN_STARTS: &[(i32, u32, u32)] = &[
    (2020, 5, 24),
    (2021, 5, 13),
    (2022, 5, 2),
    (2023, 4, 21),
    (2024, 4, 10),
    (2025, 3, 30),
    (2026, 3, 20),
    (2027, 3, 9),
    (2028, 2, 26),
    (2029, 2, 14),
    (2030, 2, 4),
];

/// First days of Kurban Bayramı.
const KURBAN_STARTS: &[(i32, u32, u32)] = &[
    (2020, 7, 31),
    (2021, 7, 20),
    (2022, 7, 9),
    (2023, 6, 28),
    (2024, 6, 16),
    (2025, 6, 6),
    (2026, 5, 27),
    (2027, 5, 16),
    (2028, 5, 5),
    (2029, 4, 24),
    (2030, 4, 13),
];

/// Fixed-date holidays: month, day, first year observed, name.
const FIXED: &[(u32, u32, i32, &str)] = &[
    (1, 1, 1926, "Yılbaşı"),
    (4, 23, 1921, "Ulusal Egemenlik ve Çocuk Bayramı"),
    (5, 1, 2009, "Emek ve Dayanışma Günü"),
    (5, 19, 1935, "Atatürk'ü Anma Gençlik ve Spor Bayramı"),
    (7, 15, 2017, "Demokrasi ve Milli Birlik Günü"),
    (8, 30, 1923, "Zafer Bayramı"),
    (10, 29, 1923, "Cumhuriyet Bayramı"),
];

/// Turkish national holidays.
///
/// Religious feasts come from a built-in table for 2020–2030. Configured
/// movable holidays are added on top; one that shares a name and year with
/// a built-in feast replaces it.
#[derive(Debug, Clone, Default)]
pub struct TurkishHolidays {
    movable: BTreeMap<NaiveDate, Vec<String>>,
}

impl TurkishHolidays {
    /// Built-in calendar extended with `extra` movable holidays.
    pub fn new(extra: &[MovableHoliday]) -> Self {
        let mut feasts: Vec<MovableHoliday> = Vec::new();
        for (name, starts, days) in [
            (RAMAZAN_BAYRAMI, RAMAZAN_STARTS, 3),
            (KURBAN_BAYRAMI, KURBAN_STARTS, 4),
        ] {
            for &(y, m, d) in starts {
                if let Some(start) = NaiveDate::from_ymd_opt(y, m, d) {
                    feasts.push(MovableHoliday {
                        name: name.to_string(),
                        start,
                        days,
                    });
                }
            }
        }
        feasts.retain(|built_in| {
            !extra
                .iter()
                .any(|e| e.name == built_in.name && e.start.year() == built_in.start.year())
        });
        feasts.extend(extra.iter().cloned());

        let mut movable: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        for feast in &feasts {
            for offset in 0..feast.days {
                let day = feast.start + Duration::days(offset as i64);
                let names = movable.entry(day).or_default();
                if !names.contains(&feast.name) {
                    names.push(feast.name.clone());
                }
            }
        }
        Self { movable }
    }
}

impl HolidayCalendar for TurkishHolidays {
    fn holidays_on(&self, date: NaiveDate) -> Vec<String> {
        let mut names: Vec<String> = FIXED
            .iter()
            .filter(|(m, d, since, _)| {
                date.month() == *m && date.day() == *d && date.year() >= *since
            })
            .map(|(_, _, _, name)| (*name).to_string())
            .collect();
        if let Some(movable) = self.movable.get(&date) {
            names.extend(movable.iter().cloned());
        }
        names
    }
}
