//! Solar geometry and clear-sky irradiance features.
//!
//! The generator samples the sun every hour between two local midnights at a
//! fixed site and derives day/night indicators, cumulative and rolling
//! irradiance, and categorical descriptions of the sun's position.

pub mod clearsky;
pub mod position;

pub use clearsky::{ClearSky, ineichen};
pub use position::{SolarPosition, solar_position};

use crate::{
    PipelineError, Result,
    buckets::{AZIMUTH_DIRECTION, ELEVATION_CATEGORY, EQUATION_OF_TIME_CATEGORY, SUN_POSITION},
    features::AggregateFn,
    frame::{self, DATE_COLUMN},
    registry::SourceKind,
    traits::{ConfigurableSource, FeatureSource},
};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use tracing::debug;

/// Rolling window, in hours, for the irradiance means.
const IRRADIANCE_WINDOW: usize = 12;

/// Columns produced by [`SolarFeatureGenerator`], in output order.
pub const SOLAR_COLUMNS: &[&str] = &[
    DATE_COLUMN,
    "ghi",
    "dni",
    "dhi",
    "apparent_zenith",
    "zenith",
    "apparent_elevation",
    "elevation",
    "azimuth",
    "equation_of_time",
    "apparent_zenith_radian",
    "azimuth_radian",
    "sunrise",
    "sunset",
    "daylight",
    "daylight_hours",
    "is_day",
    "cumulative_ghi",
    "sun_position",
    "azimuth_direction",
    "elevation_category",
    "equation_of_time_category",
    "ghi_rolling_12h",
    "daily_daylight_hours",
    "dni_rolling_12h",
    "dhi_rolling_12h",
];

/// Configuration for the solar source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarConfig {
    /// Latitude in degrees (positive = north)
    #[serde(rename = "lat")]
    pub latitude: f64,
    /// Longitude in degrees (positive = east)
    #[serde(rename = "long")]
    pub longitude: f64,
    /// Altitude in metres
    #[serde(rename = "alt")]
    pub altitude: f64,
    /// IANA timezone of the site (default: Europe/Istanbul)
    pub timezone: String,
    /// First day; sampling starts at its local midnight
    #[serde(with = "crate::config::config_date")]
    pub start_date: NaiveDateTime,
    /// Last day; sampling ends at its local midnight
    #[serde(with = "crate::config::config_date")]
    pub end_date: NaiveDateTime,
    /// Linke turbidity for the clear-sky model (default: 3.0)
    pub linke_turbidity: f64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap_or_default()
            .and_time(chrono::NaiveTime::MIN);
        Self {
            latitude: 41.0082,
            longitude: 28.9784,
            altitude: 0.0,
            timezone: "Europe/Istanbul".to_string(),
            start_date: day,
            end_date: day,
            linke_turbidity: 3.0,
        }
    }
}

/// Hourly sun position and clear-sky irradiance at one site.
///
/// The `date` column is timezone-aware in the configured zone. Sampling
/// steps in absolute time, so a DST change yields a repeated or skipped
/// local hour exactly as the clock does.
#[derive(Debug, Clone, Default)]
pub struct SolarFeatureGenerator {
    config: SolarConfig,
}

impl SolarFeatureGenerator {
    /// Hourly UTC instants between the two local midnights, inclusive.
    pub fn instants(&self, tz: Tz) -> Result<Vec<DateTime<Utc>>> {
        let start = local_midnight(tz, self.config.start_date.date())?;
        let end = local_midnight(tz, self.config.end_date.date())?;
        if start > end {
            return Err(PipelineError::InvalidDateRange {
                start: self.config.start_date.date().to_string(),
                end: self.config.end_date.date().to_string(),
            });
        }
        let count = (end - start).num_hours() + 1;
        Ok((0..count).map(|h| start + Duration::hours(h)).collect())
    }
}

fn local_midnight(tz: Tz, day: NaiveDate) -> Result<DateTime<Utc>> {
    let midnight = day.and_time(chrono::NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        .ok_or_else(|| PipelineError::Config(format!("local midnight of {day} does not exist in {tz}")))
}

fn running_total<T: Copy + std::ops::Add<Output = T>>(values: &[T], zero: T) -> Vec<T> {
    values
        .iter()
        .scan(zero, |acc, v| {
            *acc = *acc + *v;
            Some(*acc)
        })
        .collect()
}

impl FeatureSource for SolarFeatureGenerator {
    fn name(&self) -> &str {
        "solar"
    }

    fn description(&self) -> &str {
        "Sun position and clear-sky irradiance at the configured site"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Solar
    }

    fn required_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn generate(&self) -> Result<DataFrame> {
        let config = &self.config;
        let tz = frame::parse_timezone(&config.timezone)?;
        let instants = self.instants(tz)?;

        let positions: Vec<SolarPosition> = instants
            .iter()
            .map(|i| solar_position(*i, config.latitude, config.longitude))
            .collect();
        let skies: Vec<ClearSky> = positions
            .iter()
            .zip(&instants)
            .map(|(p, i)| {
                ineichen(
                    p.apparent_zenith,
                    config.altitude,
                    config.linke_turbidity,
                    i.ordinal(),
                )
            })
            .collect();

        let pick = |f: fn(&SolarPosition) -> f64| positions.iter().map(f).collect::<Vec<f64>>();
        let ghi: Vec<f64> = skies.iter().map(|s| s.ghi).collect();

        let daylight: Vec<i32> = positions
            .iter()
            .map(|p| if p.apparent_zenith < 90.0 { 1 } else { -1 })
            .collect();

        let local_days: Vec<NaiveDate> = instants
            .iter()
            .map(|i| i.with_timezone(&tz).date_naive())
            .collect();
        let mut day_counts: HashMap<NaiveDate, i64> = HashMap::new();
        for (day, hour) in local_days.iter().zip(&daylight) {
            *day_counts.entry(*day).or_default() += i64::from(*hour > 0);
        }
        let daily_daylight_hours: Vec<i64> = local_days
            .iter()
            .map(|d| day_counts.get(d).copied().unwrap_or_default())
            .collect();

        let as_options = |values: Vec<f64>| values.into_iter().map(Some).collect::<Vec<_>>();
        let apparent_zenith = pick(|p| p.apparent_zenith);
        let azimuth = pick(|p| p.azimuth);
        let elevation = pick(|p| p.elevation);
        let equation_of_time = pick(|p| p.equation_of_time);

        let base = DataFrame::new(vec![
            frame::zoned_date_column(&instants, tz)?,
            Column::new("ghi".into(), ghi.clone()),
            Column::new("dni".into(), skies.iter().map(|s| s.dni).collect::<Vec<f64>>()),
            Column::new("dhi".into(), skies.iter().map(|s| s.dhi).collect::<Vec<f64>>()),
            Column::new("apparent_zenith".into(), apparent_zenith.clone()),
            Column::new("zenith".into(), pick(|p| p.zenith)),
            Column::new("apparent_elevation".into(), pick(|p| p.apparent_elevation)),
            Column::new("elevation".into(), elevation.clone()),
            Column::new("azimuth".into(), azimuth.clone()),
            Column::new("equation_of_time".into(), equation_of_time.clone()),
            Column::new("daylight".into(), daylight.clone()),
            Column::new("daylight_hours".into(), running_total(&daylight, 0)),
            Column::new("cumulative_ghi".into(), running_total(&ghi, 0.0)),
            SUN_POSITION.label_column(&as_options(apparent_zenith)),
            AZIMUTH_DIRECTION.label_column(&as_options(azimuth)),
            ELEVATION_CATEGORY.label_column(&as_options(elevation)),
            EQUATION_OF_TIME_CATEGORY.label_column(&as_options(equation_of_time)),
            Column::new("daily_daylight_hours".into(), daily_daylight_hours),
        ])?;

        let rolling = |name: &str| {
            AggregateFn::Mean
                .rolling(col(name), IRRADIANCE_WINDOW, IRRADIANCE_WINDOW)
                .alias(format!("{name}_rolling_12h"))
        };
        let result = base
            .lazy()
            .with_columns([
                (col("apparent_zenith") * lit(PI / 180.0)).alias("apparent_zenith_radian"),
                (col("azimuth") * lit(PI / 180.0)).alias("azimuth_radian"),
                col("apparent_zenith").lt(lit(90.0)).alias("sunrise"),
                col("apparent_zenith").gt_eq(lit(90.0)).alias("sunset"),
                col("apparent_zenith").lt(lit(90.0)).alias("is_day"),
                rolling("ghi"),
                rolling("dni"),
                rolling("dhi"),
            ])
            .select(SOLAR_COLUMNS.iter().map(|c| col(*c)).collect::<Vec<_>>())
            .collect()?;

        debug!(rows = result.height(), timezone = %tz, "solar features computed");
        Ok(result)
    }
}

impl ConfigurableSource for SolarFeatureGenerator {
    type Config = SolarConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
