//! Weather features per location and their weighted composites.
//!
//! [`WeatherFeatureGenerator`] turns one raw hourly weather frame into
//! features. [`WeatherSource`] runs it over the historical and forecast
//! files of every configured location and hands the results to the
//! [`MultiLocationWeatherAggregator`].

pub mod aggregate;
pub mod codes;
pub mod indices;

pub use aggregate::{LocationColumns, LocationFrames, MultiLocationWeatherAggregator};

use crate::{
    PipelineError, Result,
    features::{AggregateFn, FeatureSpec, LagWindowFeatureGenerator},
    frame::{self, DATE_COLUMN},
    io,
    registry::SourceKind,
    traits::FeatureSource,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tracing::{info, warn};

/// Raw columns every weather frame must carry.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "precipitation",
    "weather_code",
    "wind_speed_10m",
    "wind_direction_10m",
];

/// Raw columns passed through when present.
pub const OPTIONAL_COLUMNS: &[&str] = &[
    "dew_point_2m",
    "apparent_temperature",
    "snow_depth",
    "surface_pressure",
    "shortwave_radiation",
];

/// Lags, in hours, of temperature and humidity.
pub const WEATHER_LAGS: &[usize] = &[1, 2, 3, 4, 5, 6, 24, 48];

/// Hours in the precipitation windows.
const PRECIPITATION_WINDOW: usize = 24;

/// Inclusive range of local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day
    #[serde(with = "crate::config::config_date")]
    pub start_date: NaiveDateTime,
    /// Last day (inclusive)
    #[serde(with = "crate::config::config_date")]
    pub end_date: NaiveDateTime,
}

impl DateRange {
    /// Check that the range is not reversed.
    pub fn validate(&self) -> Result<()> {
        if self.start_date.date() > self.end_date.date() {
            return Err(PipelineError::InvalidDateRange {
                start: self.start_date.date().to_string(),
                end: self.end_date.date().to_string(),
            });
        }
        Ok(())
    }

    /// Whether `day` lies inside the range.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start_date.date() <= day && day <= self.end_date.date()
    }
}

/// One weather location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub long: f64,
    /// Raw historical weather file (CSV or Parquet)
    pub historical_path: PathBuf,
    /// Raw forecast weather file (CSV or Parquet)
    pub forecast_path: PathBuf,
}

/// Configuration for the weather source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// IANA timezone shared by all locations
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Days covered by the historical files
    pub historical: DateRange,
    /// Days covered by the forecast files
    pub forecast: DateRange,
    /// Locations by identifier
    pub locations: BTreeMap<String, LocationConfig>,
    /// Weight of each location in the mixed columns; unlisted locations get 0
    pub location_weights: BTreeMap<String, f64>,
}

fn default_timezone() -> String {
    "Europe/Istanbul".to_string()
}

/// Derives weather features from one raw hourly frame.
#[derive(Debug, Clone)]
pub struct WeatherFeatureGenerator {
    timezone: Tz,
    range: DateRange,
}

impl WeatherFeatureGenerator {
    /// Generator keeping the local days in `range`.
    pub const fn new(timezone: Tz, range: DateRange) -> Self {
        Self { timezone, range }
    }

    /// Names of the output columns for a frame carrying `optional` extras.
    fn output_columns(optional: &[&str]) -> Vec<String> {
        let mut names = vec![
            DATE_COLUMN.to_string(),
            "temperature_2m".to_string(),
            "relative_humidity_2m".to_string(),
        ];
        names.extend(
            [
                "dew_point_2m",
                "apparent_temperature",
                "precipitation",
                "snow_depth",
                "weather_code",
                "surface_pressure",
                "wind_speed_10m",
                "wind_direction_10m",
                "shortwave_radiation",
            ]
            .iter()
            .filter(|c| REQUIRED_COLUMNS.contains(*c) || optional.contains(*c))
            .map(|c| c.to_string()),
        );
        names.extend(
            [
                "daily_temp_range",
                "temperature_cut",
                "humidity_cut",
                "HDD",
                "CDD",
                "precipitation_duration",
                "wind_chill",
                "cumulative_precipitation_24h",
                "heat_index",
            ]
            .map(String::from),
        );
        let lags = Self::lag_spec();
        for variable in &lags.variables {
            names.extend(WEATHER_LAGS.iter().map(|k| lags.lag_name(variable, *k)));
        }
        names.extend(
            [
                "weather_severity",
                "weather_change_score",
                "temperature_humidity_cut",
            ]
            .map(String::from),
        );
        names
    }

    fn lag_spec() -> FeatureSpec {
        FeatureSpec::lags_only(["temp", "humidity"], WEATHER_LAGS, "h")
    }

    /// Features for `raw`, restricted to the configured local days.
    pub fn transform(&self, raw: &DataFrame, frame_name: &str) -> Result<DataFrame> {
        let mut required = vec![DATE_COLUMN];
        required.extend_from_slice(REQUIRED_COLUMNS);
        frame::require_columns(raw, frame_name, &required)?;
        self.range.validate()?;

        let names = frame::column_names(raw);
        let optional: Vec<&str> = OPTIONAL_COLUMNS
            .iter()
            .copied()
            .filter(|c| names.iter().any(|n| n == c))
            .collect();

        // Zoned, sorted, restricted to the range, numbers as f64.
        let dated = frame::coerce_dates(raw, frame_name, None)?;
        let instants: Vec<DateTime<Utc>> = frame::read_instants(&dated, frame_name, self.timezone)?
            .iter()
            .map(|i| i.with_timezone(&Utc))
            .collect();
        let mut casts: Vec<Expr> = vec![col(DATE_COLUMN)];
        casts.extend(
            REQUIRED_COLUMNS
                .iter()
                .chain(&optional)
                .map(|c| col(*c).cast(DataType::Float64)),
        );
        let mut df = dated.lazy().select(casts).collect()?;
        df.with_column(frame::zoned_date_column(&instants, self.timezone)?)?;
        let df = frame::sort_by_date(&df)?;
        let local = frame::read_dates(&df, frame_name)?;
        let keep: Vec<bool> = local.iter().map(|d| self.range.contains(d.date())).collect();
        let mut df = df.filter(&BooleanChunked::from_slice("keep".into(), &keep))?;
        let local: Vec<NaiveDateTime> = local
            .into_iter()
            .zip(&keep)
            .filter_map(|(d, k)| k.then_some(d))
            .collect();

        let values = |name: &str| frame::float_values(&df, frame_name, name);
        let temperature = values("temperature_2m")?;
        let humidity = values("relative_humidity_2m")?;
        let wind_speed = values("wind_speed_10m")?;
        let wind_direction = values("wind_direction_10m")?;
        let weather_codes = values("weather_code")?;

        let map2 = |a: &[Option<f64>], b: &[Option<f64>], f: fn(f64, f64) -> f64| {
            a.iter()
                .zip(b)
                .map(|(x, y)| Some(f((*x)?, (*y)?)))
                .collect::<Vec<Option<f64>>>()
        };
        let map1 = |a: &[Option<f64>], f: fn(f64) -> f64| {
            a.iter().map(|x| x.map(f)).collect::<Vec<Option<f64>>>()
        };

        // Weather code -> label and severity
        let described: Vec<Option<(&str, i32)>> = weather_codes
            .iter()
            .map(|c| c.and_then(codes::describe))
            .collect();
        let unknown = weather_codes
            .iter()
            .zip(&described)
            .filter(|(c, d)| c.is_some() && d.is_none())
            .count();
        if unknown > 0 {
            warn!(frame = frame_name, rows = unknown, "unknown weather codes left unlabelled");
        }
        let severity: Vec<Option<i32>> = described.iter().map(|d| d.map(|(_, s)| s)).collect();
        let change: Vec<Option<i32>> = std::iter::once(None)
            .chain(
                severity
                    .windows(2)
                    .map(|w| Some((w[1]? - w[0]?).abs())),
            )
            .take(severity.len())
            .collect();

        let mut daily: HashMap<NaiveDate, (f64, f64)> = HashMap::new();
        for (day, t) in local.iter().zip(&temperature) {
            if let Some(t) = t {
                let entry = daily.entry(day.date()).or_insert((*t, *t));
                entry.0 = entry.0.min(*t);
                entry.1 = entry.1.max(*t);
            }
        }
        let daily_range: Vec<Option<f64>> = local
            .iter()
            .map(|d| daily.get(&d.date()).map(|(lo, hi)| hi - lo))
            .collect();

        let temperature_cut = indices::level_labels(&temperature, "temperature");
        let humidity_cut = indices::level_labels(&humidity, "humidity");
        let combined_cut: Vec<Option<String>> = temperature_cut
            .iter()
            .zip(&humidity_cut)
            .map(|(t, h)| Some(format!("{}--{}", t.as_ref()?, h.as_ref()?)))
            .collect();

        let derived = [
            Column::new(
                "wind_direction_10m".into(),
                wind_direction
                    .iter()
                    .map(|d| d.and_then(indices::compass))
                    .collect::<Vec<_>>(),
            ),
            Column::new(
                "weather_code".into(),
                described.iter().map(|d| d.map(|(l, _)| l)).collect::<Vec<_>>(),
            ),
            Column::new("daily_temp_range".into(), daily_range),
            Column::new("temperature_cut".into(), temperature_cut),
            Column::new("humidity_cut".into(), humidity_cut),
            Column::new("HDD".into(), map1(&temperature, indices::heating_degrees)),
            Column::new("CDD".into(), map1(&temperature, indices::cooling_degrees)),
            Column::new("wind_chill".into(), map2(&temperature, &wind_speed, indices::wind_chill)),
            Column::new("heat_index".into(), map2(&temperature, &humidity, indices::heat_index)),
            Column::new("weather_severity".into(), severity),
            Column::new("weather_change_score".into(), change),
            Column::new("temperature_humidity_cut".into(), combined_cut),
            Column::new("temp".into(), temperature),
            Column::new("humidity".into(), humidity),
        ];
        for column in derived {
            df.with_column(column)?;
        }

        let rain = AggregateFn::Sum;
        let df = df
            .lazy()
            .with_columns([
                rain.rolling(
                    col("precipitation").gt(lit(0.0)).fill_null(lit(false)).cast(DataType::Float64),
                    PRECIPITATION_WINDOW,
                    PRECIPITATION_WINDOW,
                )
                .alias("precipitation_duration"),
                rain.rolling(col("precipitation"), PRECIPITATION_WINDOW, PRECIPITATION_WINDOW)
                    .alias("cumulative_precipitation_24h"),
            ])
            .collect()?;

        let df = LagWindowFeatureGenerator::new(Self::lag_spec())?.transform(&df, frame_name)?;
        let ordered: Vec<Expr> = Self::output_columns(&optional)
            .iter()
            .map(|c| col(c.as_str()))
            .collect();
        Ok(df.lazy().select(ordered).collect()?)
    }
}

/// Per-location weather features joined with their weighted composites.
#[derive(Debug, Clone)]
pub struct WeatherSource {
    config: WeatherConfig,
}

impl WeatherSource {
    /// Create a weather source.
    pub const fn new(config: WeatherConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    pub const fn config(&self) -> &WeatherConfig {
        &self.config
    }
}

impl FeatureSource for WeatherSource {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Historical and forecast weather per location with weighted composites"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Weather
    }

    fn required_columns(&self) -> Vec<String> {
        REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn generate(&self) -> Result<DataFrame> {
        let config = &self.config;
        let tz = frame::parse_timezone(&config.timezone)?;
        let aggregator = MultiLocationWeatherAggregator::new(config.location_weights.clone())?;
        let historical = WeatherFeatureGenerator::new(tz, config.historical);
        let forecast = WeatherFeatureGenerator::new(tz, config.forecast);

        let mut frames = Vec::with_capacity(config.locations.len());
        for (location, paths) in &config.locations {
            let name = format!("weather/{location}");
            let hist_name = format!("{name}/historical");
            let fc_name = format!("{name}/forecast");
            frames.push(LocationFrames {
                location: location.clone(),
                historical: historical
                    .transform(&io::read_frame(&paths.historical_path, &hist_name)?, &hist_name)?,
                forecast: forecast
                    .transform(&io::read_frame(&paths.forecast_path, &fc_name)?, &fc_name)?,
            });
            info!(location = %location, lat = paths.lat, long = paths.long, "weather location processed");
        }
        aggregator.aggregate(&frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn day(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Hourly raw weather starting at local midnight, naive wall time.
    fn raw_weather(start: NaiveDateTime, hours: usize) -> DataFrame {
        let dates: Vec<NaiveDateTime> = (0..hours)
            .map(|h| start + Duration::hours(h as i64))
            .collect();
        let mut df = DataFrame::new(vec![frame::naive_date_column(&dates).unwrap()]).unwrap();
        let temperature: Vec<f64> = (0..hours).map(|h| 10.0 + (h % 24) as f64).collect();
        let humidity: Vec<f64> = (0..hours).map(|h| 40.0 + (h % 10) as f64).collect();
        let precipitation: Vec<f64> = (0..hours).map(|h| if h % 2 == 0 { 0.0 } else { 0.5 }).collect();
        let codes: Vec<i64> = (0..hours).map(|h| if h % 3 == 0 { 61 } else { 0 }).collect();
        for column in [
            Column::new("temperature_2m".into(), temperature),
            Column::new("relative_humidity_2m".into(), humidity),
            Column::new("precipitation".into(), precipitation),
            Column::new("weather_code".into(), codes),
            Column::new("wind_speed_10m".into(), vec![10.0; hours]),
            Column::new("wind_direction_10m".into(), vec![350.0; hours]),
            Column::new("surface_pressure".into(), vec![1013.0; hours]),
        ] {
            df.with_column(column).unwrap();
        }
        df
    }

    fn generator(start: NaiveDateTime, end: NaiveDateTime) -> WeatherFeatureGenerator {
        WeatherFeatureGenerator::new(
            frame::parse_timezone("Europe/Istanbul").unwrap(),
            DateRange {
                start_date: start,
                end_date: end,
            },
        )
    }

    #[test]
    fn test_weather_rows_are_limited_to_range() {
        let raw = raw_weather(day(2024, 1, 1), 24 * 4);
        let result = generator(day(2024, 1, 2), day(2024, 1, 3))
            .transform(&raw, "weather")
            .unwrap();

        assert_eq!(result.height(), 48);
        assert_eq!(
            frame::timezone(&result, "weather").unwrap().map(|tz| tz.name()),
            Some("Europe/Istanbul")
        );
        assert_eq!(frame::read_dates(&result, "weather").unwrap()[0], day(2024, 1, 2));
    }

    #[test]
    fn test_weather_derived_columns() {
        let raw = raw_weather(day(2024, 1, 1), 72);
        let result = generator(day(2024, 1, 1), day(2024, 1, 3))
            .transform(&raw, "weather")
            .unwrap();

        let labels = frame::string_values(&result, "w", "weather_code").unwrap();
        let severity = frame::float_values(&result, "w", "weather_severity").unwrap();
        let change = frame::float_values(&result, "w", "weather_change_score").unwrap();
        let wind = frame::string_values(&result, "w", "wind_direction_10m").unwrap();
        let range = frame::float_values(&result, "w", "daily_temp_range").unwrap();
        let hdd = frame::float_values(&result, "w", "HDD").unwrap();
        let duration = frame::float_values(&result, "w", "precipitation_duration").unwrap();
        let cumulative = frame::float_values(&result, "w", "cumulative_precipitation_24h").unwrap();
        let lag = frame::float_values(&result, "w", "temp_lag_1h").unwrap();
        let combined = frame::string_values(&result, "w", "temperature_humidity_cut").unwrap();

        assert_eq!(labels[0].as_deref(), Some("Rain: Slight"));
        assert_eq!(labels[1].as_deref(), Some("Clear sky"));
        assert_eq!(severity[0], Some(5.0));
        assert_eq!(change[0], None);
        assert_eq!(change[1], Some(5.0));
        assert_eq!(change[2], Some(0.0));
        assert_eq!(wind[0].as_deref(), Some("N"));
        assert_eq!(range[0], Some(23.0));
        assert_eq!(hdd[0], Some(8.0));
        assert_eq!(duration[22], None);
        assert_eq!(duration[23], Some(12.0));
        assert_eq!(cumulative[23], Some(6.0));
        assert_eq!(lag[0], None);
        assert_eq!(lag[1], Some(10.0));
        assert!(combined[0].as_deref().unwrap().contains("--humidity_level_"));
        assert!(result.column("temperature_2m").is_ok());
        assert!(result.column("surface_pressure").is_ok());
        assert!(result.column("temp").is_err());
    }

    #[test]
    fn test_historical_and_forecast_schemas_match() {
        let historical = generator(day(2024, 1, 1), day(2024, 1, 2))
            .transform(&raw_weather(day(2024, 1, 1), 48), "h")
            .unwrap();
        let forecast = generator(day(2024, 1, 3), day(2024, 1, 3))
            .transform(&raw_weather(day(2024, 1, 3), 24), "f")
            .unwrap();

        assert_eq!(historical.schema(), forecast.schema());
    }

    #[test]
    fn test_missing_required_column() {
        let raw = raw_weather(day(2024, 1, 1), 24).drop("weather_code").unwrap();
        let err = generator(day(2024, 1, 1), day(2024, 1, 1))
            .transform(&raw, "weather/ankara")
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_unknown_codes_become_null() {
        let mut raw = raw_weather(day(2024, 1, 1), 24);
        raw.with_column(Column::new("weather_code".into(), vec![42i64; 24]))
            .unwrap();
        let result = generator(day(2024, 1, 1), day(2024, 1, 1))
            .transform(&raw, "weather")
            .unwrap();

        let severity = frame::float_values(&result, "w", "weather_severity").unwrap();
        assert!(severity.iter().all(Option::is_none));
    }

    #[test]
    fn test_rolling_weather_features_never_read_later_rows() {
        let mut rng = StdRng::seed_from_u64(5);
        let cut = 40;
        let original = raw_weather(day(2024, 1, 1), 72);
        let mut perturbed = original.clone();
        for name in ["precipitation", "temperature_2m"] {
            let values: Vec<f64> = frame::float_values(&original, "w", name)
                .unwrap()
                .into_iter()
                .enumerate()
                .map(|(i, v)| if i > cut { rng.gen_range(0.0..30.0) } else { v.unwrap() })
                .collect();
            perturbed.with_column(Column::new(name.into(), values)).unwrap();
        }

        let weather = generator(day(2024, 1, 1), day(2024, 1, 3));
        let a = weather.transform(&original, "w").unwrap();
        let b = weather.transform(&perturbed, "w").unwrap();

        let lags = WeatherFeatureGenerator::lag_spec();
        let mut checked = vec![
            "precipitation_duration".to_string(),
            "cumulative_precipitation_24h".to_string(),
        ];
        checked.extend(WEATHER_LAGS.iter().map(|k| lags.lag_name("temp", *k)));
        for name in &checked {
            let left = frame::float_values(&a, "w", name).unwrap();
            let right = frame::float_values(&b, "w", name).unwrap();
            assert_eq!(left[..=cut], right[..=cut], "{name} changed before the cut");
        }
    }
}
