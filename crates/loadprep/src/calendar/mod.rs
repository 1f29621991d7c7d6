//! Calendar features: datetime parts, cyclical encodings and holidays.

pub mod holidays;

pub use holidays::{HolidayCalendar, MovableHoliday, NO_HOLIDAY, TurkishHolidays};

use crate::{
    PipelineError, Result,
    frame,
    grid::TimeGridBuilder,
    registry::SourceKind,
    traits::{ConfigurableSource, FeatureSource},
};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A datetime component extracted into a `date_<part>` column.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    /// Month of year, 1-12
    #[display("month")]
    Month,
    /// ISO week number, 1-53
    #[display("week")]
    Week,
    /// Day of week, Monday = 0
    #[display("day_of_week")]
    DayOfWeek,
    /// Day of month, 1-31
    #[display("day_of_month")]
    DayOfMonth,
    /// Day of year, 1-366
    #[display("day_of_year")]
    DayOfYear,
    /// 1 on Saturday and Sunday
    #[display("weekend")]
    Weekend,
    /// Hour of day, 0-23
    #[display("hour")]
    Hour,
    /// Calendar year
    #[display("year")]
    Year,
}

impl DatePart {
    /// Output column name.
    pub fn column_name(self) -> String {
        format!("date_{self}")
    }

    /// Whether the part gets sine/cosine encodings.
    pub const fn is_cyclical(self) -> bool {
        matches!(self, Self::Month | Self::Week | Self::DayOfWeek | Self::Hour)
    }

    /// Value of the part at `date`.
    pub fn extract(self, date: NaiveDateTime) -> i32 {
        let weekday = date.weekday().num_days_from_monday() as i32;
        match self {
            Self::Month => date.month() as i32,
            Self::Week => date.iso_week().week() as i32,
            Self::DayOfWeek => weekday,
            Self::DayOfMonth => date.day() as i32,
            Self::DayOfYear => date.ordinal() as i32,
            Self::Weekend => i32::from(weekday >= 5),
            Self::Hour => date.hour() as i32,
            Self::Year => date.year(),
        }
    }
}

/// Configuration for the calendar source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// First timestamp of the grid
    #[serde(with = "crate::config::config_date")]
    pub start_date: NaiveDateTime,
    /// Last timestamp of the grid (inclusive)
    #[serde(with = "crate::config::config_date")]
    pub end_date: NaiveDateTime,
    /// Grid step in hours; must divide 24 (default: 1)
    pub frequency_hours: u32,
    /// Datetime parts to extract
    pub features: Vec<DatePart>,
    /// Holidays added to (or replacing) the built-in feast table
    pub movable_holidays: Vec<MovableHoliday>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap_or_default()
            .and_time(chrono::NaiveTime::MIN);
        Self {
            start_date: day,
            end_date: day,
            frequency_hours: 1,
            features: vec![
                DatePart::Month,
                DatePart::Week,
                DatePart::DayOfWeek,
                DatePart::Weekend,
                DatePart::Hour,
            ],
            movable_holidays: Vec::new(),
        }
    }
}

impl CalendarConfig {
    /// Rows between a timestamp and the same clock time one day away.
    pub fn rows_per_day(&self) -> Result<usize> {
        if self.frequency_hours == 0 || 24 % self.frequency_hours != 0 {
            return Err(PipelineError::Config(format!(
                "calendar frequency of {} hours does not divide a day",
                self.frequency_hours
            )));
        }
        Ok((24 / self.frequency_hours) as usize)
    }
}

/// Calendar features on a regular grid.
///
/// `Pre_Holiday` and `Post_Holiday` look one day ahead and behind. The
/// holiday calendar is known in advance, so the forward look is not a leak.
#[derive(Debug, Clone, Default)]
pub struct CalendarFeatureGenerator {
    config: CalendarConfig,
}

fn cyclical(values: &[i32], name: &str) -> [Column; 2] {
    let max = values.iter().copied().max().unwrap_or_default();
    let angle = |v: &i32| (max > 0).then(|| 2.0 * PI * f64::from(*v) / f64::from(max));
    [
        Column::new(
            format!("{name}_sin").into(),
            values.iter().map(|v| angle(v).map(f64::sin)).collect::<Vec<_>>(),
        ),
        Column::new(
            format!("{name}_cos").into(),
            values.iter().map(|v| angle(v).map(f64::cos)).collect::<Vec<_>>(),
        ),
    ]
}

impl FeatureSource for CalendarFeatureGenerator {
    fn name(&self) -> &str {
        "calendar"
    }

    fn description(&self) -> &str {
        "Datetime parts, cyclical encodings and Turkish national holidays"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Calendar
    }

    fn required_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn generate(&self) -> Result<DataFrame> {
        let config = &self.config;
        let shift = config.rows_per_day()? as i64;
        let dates = TimeGridBuilder::until_every(
            config.start_date,
            config.end_date,
            config.frequency_hours,
        )?
        .dates();
        let holidays = TurkishHolidays::new(&config.movable_holidays);

        let flags: Vec<String> = dates
            .iter()
            .map(|d| {
                holidays
                    .holiday_name(d.date())
                    .unwrap_or_else(|| NO_HOLIDAY.to_string())
            })
            .collect();

        let mut columns = vec![
            frame::naive_date_column(&dates)?,
            Column::new("Holiday_Flag".into(), flags),
        ];
        let mut encodings = Vec::new();
        for part in &config.features {
            let values: Vec<i32> = dates.iter().map(|d| part.extract(*d)).collect();
            if part.is_cyclical() {
                encodings.extend(cyclical(&values, &part.column_name()));
            }
            columns.push(Column::new(part.column_name().into(), values));
        }
        columns.extend(encodings);

        let day_of_year: Vec<f64> = dates.iter().map(|d| f64::from(d.ordinal())).collect();
        let weekend: Vec<i32> = dates.iter().map(|d| DatePart::Weekend.extract(*d)).collect();
        columns.extend([
            Column::new(
                "Yearly_Sin".into(),
                day_of_year
                    .iter()
                    .map(|d| (2.0 * PI * d / 365.25).sin())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "Yearly_Cos".into(),
                day_of_year
                    .iter()
                    .map(|d| (2.0 * PI * d / 365.25).cos())
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "Quarter".into(),
                dates
                    .iter()
                    .map(|d| (d.month0() / 3 + 1) as i32)
                    .collect::<Vec<_>>(),
            ),
        ]);

        let holiday_ahead = |rows: i64| {
            col("Holiday_Flag")
                .shift(lit(rows))
                .neq(lit(NO_HOLIDAY))
                .fill_null(lit(false))
                .cast(DataType::Int32)
        };
        let mut result = DataFrame::new(columns)?
            .lazy()
            .with_columns([
                holiday_ahead(-shift).alias("Pre_Holiday"),
                holiday_ahead(shift).alias("Post_Holiday"),
            ])
            .collect()?;
        result.with_column(Column::new(
            "Weekday_Flag".into(),
            weekend.iter().map(|w| 1 - w).collect::<Vec<i32>>(),
        ))?;
        result.with_column(Column::new("Weekend_Flag".into(), weekend))?;
        Ok(result)
    }
}

impl ConfigurableSource for CalendarFeatureGenerator {
    type Config = CalendarConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn generate(start: NaiveDateTime, end: NaiveDateTime) -> DataFrame {
        CalendarFeatureGenerator::with_config(CalendarConfig {
            start_date: start,
            end_date: end,
            ..Default::default()
        })
        .generate()
        .unwrap()
    }

    fn ints(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        frame::float_values(df, "calendar", name).unwrap()
    }

    #[test]
    fn test_calendar_columns() {
        let result = generate(at(2024, 4, 22, 0), at(2024, 4, 25, 23));

        assert_eq!(result.height(), 96);
        for name in [
            "date",
            "Holiday_Flag",
            "date_month",
            "date_week",
            "date_day_of_week",
            "date_weekend",
            "date_hour",
            "date_month_sin",
            "date_hour_cos",
            "Yearly_Sin",
            "Yearly_Cos",
            "Quarter",
            "Pre_Holiday",
            "Post_Holiday",
            "Weekday_Flag",
            "Weekend_Flag",
        ] {
            assert!(result.column(name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn test_holiday_flags_and_neighbours() {
        // 2024-04-23 is Ulusal Egemenlik ve Çocuk Bayramı
        let result = generate(at(2024, 4, 22, 0), at(2024, 4, 25, 23));
        let flags = frame::string_values(&result, "calendar", "Holiday_Flag").unwrap();
        let pre = ints(&result, "Pre_Holiday");
        let post = ints(&result, "Post_Holiday");

        assert_eq!(flags[0].as_deref(), Some("None"));
        assert_eq!(
            flags[30].as_deref(),
            Some("Ulusal Egemenlik ve Çocuk Bayramı")
        );
        assert!(pre[..24].iter().all(|v| *v == Some(1.0)));
        assert!(pre[24..].iter().all(|v| *v == Some(0.0)));
        assert!(post[48..72].iter().all(|v| *v == Some(1.0)));
        assert!(post[..48].iter().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn test_datetime_parts() {
        // Monday 2024-04-22 through Sunday 2024-04-28
        let result = generate(at(2024, 4, 22, 0), at(2024, 4, 28, 23));
        let day_of_week = ints(&result, "date_day_of_week");
        let weekend = ints(&result, "Weekend_Flag");
        let weekday = ints(&result, "Weekday_Flag");
        let week = ints(&result, "date_week");

        assert_eq!(day_of_week[0], Some(0.0));
        assert_eq!(day_of_week[24 * 6], Some(6.0));
        assert_eq!(weekend[24 * 5], Some(1.0));
        assert_eq!(weekday[24 * 4], Some(1.0));
        assert_eq!(week[0], Some(17.0));
        assert_eq!(ints(&result, "Quarter")[0], Some(2.0));
    }

    #[test]
    fn test_cyclical_encoding_uses_grid_maximum() {
        let result = generate(at(2024, 4, 22, 0), at(2024, 4, 28, 23));
        let sin = ints(&result, "date_day_of_week_sin");
        let cos = ints(&result, "date_day_of_week_cos");
        let hour_sin = ints(&result, "date_hour_sin");

        assert_relative_eq!(sin[0].unwrap(), 0.0);
        assert_relative_eq!(cos[0].unwrap(), 1.0);
        // Sunday is the maximum, a full turn
        assert_relative_eq!(cos[24 * 6].unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            hour_sin[6].unwrap(),
            (2.0 * PI * 6.0 / 23.0).sin(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_yearly_encoding() {
        let result = generate(at(2024, 1, 1, 0), at(2024, 1, 1, 0));
        let yearly = ints(&result, "Yearly_Sin");
        assert_relative_eq!(yearly[0].unwrap(), (2.0 * PI / 365.25).sin());
    }

    #[test]
    fn test_coarser_frequency_shifts_by_a_day() {
        let source = CalendarFeatureGenerator::with_config(CalendarConfig {
            start_date: at(2024, 4, 22, 0),
            end_date: at(2024, 4, 24, 18),
            frequency_hours: 6,
            ..Default::default()
        });
        let result = source.generate().unwrap();
        let pre = ints(&result, "Pre_Holiday");

        assert_eq!(result.height(), 12);
        assert!(pre[..4].iter().all(|v| *v == Some(1.0)));
        assert_eq!(pre[4], Some(0.0));
    }

    #[test]
    fn test_frequency_must_divide_a_day() {
        let source = CalendarFeatureGenerator::with_config(CalendarConfig {
            frequency_hours: 5,
            ..Default::default()
        });
        assert!(matches!(
            source.generate().unwrap_err(),
            PipelineError::Config(_)
        ));
    }
}
