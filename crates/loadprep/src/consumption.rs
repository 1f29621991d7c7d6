//! Observed consumption, the regression target.
//!
//! The consumption frame is extended [`FORECAST_HORIZON`] hours past the last
//! observed reading so the forecast rows exist before any other source is
//! joined; their `consumption` is null.

use crate::{
    FORECAST_HORIZON, PipelineError, Result,
    features::{FeatureSpec, LagWindowFeatureGenerator},
    frame::{self, DATE_COLUMN},
    grid::TimeGridBuilder,
    io,
    registry::SourceKind,
    traits::{ConfigurableSource, FeatureSource},
};
use chrono::Duration;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};
use tracing::info;

/// Name of the target column in every frame the pipeline produces.
pub const CONSUMPTION_COLUMN: &str = "consumption";

/// Configuration for the consumption source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumptionConfig {
    /// CSV or Parquet file with the readings
    pub path: PathBuf,
    /// Name of the timestamp column in the file (default: `date`)
    pub date_column: String,
    /// Name of the reading column in the file (default: `consumption`)
    pub value_column: String,
    /// Explicit `strftime` format for text dates
    pub date_format: Option<String>,
    /// Zone that offset-aware dates are converted to
    pub timezone: String,
    /// Lag/window features on the consumption history
    pub features: Option<FeatureSpec>,
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            date_column: DATE_COLUMN.to_string(),
            value_column: CONSUMPTION_COLUMN.to_string(),
            date_format: None,
            timezone: "Europe/Istanbul".to_string(),
            features: None,
        }
    }
}

impl ConsumptionConfig {
    /// Read the configured file and put it on the extended grid.
    pub fn load(&self) -> Result<DataFrame> {
        let raw = io::read_frame(&self.path, CONSUMPTION_COLUMN)?;
        self.prepare(&raw)
    }

    /// Rename, parse, sort and extend raw readings.
    ///
    /// The grid runs from the first timestamp to [`FORECAST_HORIZON`] hours
    /// after the last non-null reading, so a frame that was already extended
    /// comes back unchanged.
    pub fn prepare(&self, raw: &DataFrame) -> Result<DataFrame> {
        frame::require_columns(
            raw,
            CONSUMPTION_COLUMN,
            &[self.date_column.as_str(), self.value_column.as_str()],
        )?;
        let selected = raw
            .clone()
            .lazy()
            .select([
                col(self.date_column.as_str()).alias(DATE_COLUMN),
                col(self.value_column.as_str())
                    .cast(DataType::Float64)
                    .alias(CONSUMPTION_COLUMN),
            ])
            .collect()?;

        let tz = frame::parse_timezone(&self.timezone)?;
        let coerced =
            frame::coerce_dates(&selected, CONSUMPTION_COLUMN, self.date_format.as_deref())?;
        let local = frame::wall_time_in(&coerced, CONSUMPTION_COLUMN, tz)?;
        let sorted = frame::sort_by_date(&frame::dedupe_dates(&local, CONSUMPTION_COLUMN)?)?;

        let dates = frame::read_dates(&sorted, CONSUMPTION_COLUMN)?;
        let values = frame::float_values(&sorted, CONSUMPTION_COLUMN, CONSUMPTION_COLUMN)?;
        let last_reading = dates
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_some_and(|v| !v.is_nan()))
            .map(|(d, _)| *d)
            .next_back()
            .ok_or_else(|| PipelineError::ingestion(CONSUMPTION_COLUMN, "no consumption readings"))?;
        let first = dates[0];

        let end = last_reading + Duration::hours(FORECAST_HORIZON as i64);
        let extended = TimeGridBuilder::until(first, end)?.align(&sorted, CONSUMPTION_COLUMN)?;
        info!(
            rows = extended.height(),
            first = %first,
            last_reading = %last_reading,
            "consumption extended past last reading"
        );
        Ok(extended)
    }
}

/// Consumption prepared at most once and shared by the sources of a run.
///
/// Clones share the same frame; the file is read on the first
/// [`frame`](Self::frame) call.
#[derive(Debug, Clone, Default)]
pub struct PreparedConsumption {
    config: ConsumptionConfig,
    frame: Arc<OnceLock<DataFrame>>,
}

impl PreparedConsumption {
    /// Lazily prepared consumption for `config`.
    pub fn new(config: ConsumptionConfig) -> Self {
        Self {
            config,
            frame: Arc::default(),
        }
    }

    /// The configuration the frame is prepared from.
    pub const fn config(&self) -> &ConsumptionConfig {
        &self.config
    }

    /// The prepared frame, loading it on first use.
    pub fn frame(&self) -> Result<DataFrame> {
        if let Some(df) = self.frame.get() {
            return Ok(df.clone());
        }
        let loaded = self.config.load()?;
        Ok(self.frame.get_or_init(|| loaded).clone())
    }
}

/// The consumption target on the extended hourly grid.
#[derive(Debug, Clone, Default)]
pub struct ConsumptionSource {
    prepared: PreparedConsumption,
}

impl ConsumptionSource {
    /// Source reading from a frame shared with other consumption sources.
    pub const fn from_prepared(prepared: PreparedConsumption) -> Self {
        Self { prepared }
    }
}

impl FeatureSource for ConsumptionSource {
    fn name(&self) -> &str {
        CONSUMPTION_COLUMN
    }

    fn description(&self) -> &str {
        "Observed consumption extended by the forecast horizon"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Consumption
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.prepared.config().value_column.clone()]
    }

    fn generate(&self) -> Result<DataFrame> {
        self.prepared.frame()
    }
}

impl ConfigurableSource for ConsumptionSource {
    type Config = ConsumptionConfig;

    fn with_config(config: Self::Config) -> Self {
        Self::from_prepared(PreparedConsumption::new(config))
    }

    fn config(&self) -> &Self::Config {
        self.prepared.config()
    }
}

/// Lag, window and expanding statistics of past consumption.
///
/// The raw target is not repeated here; it comes from [`ConsumptionSource`].
#[derive(Debug, Clone)]
pub struct ConsumptionFeatureSource {
    prepared: PreparedConsumption,
    generator: LagWindowFeatureGenerator,
}

impl ConsumptionFeatureSource {
    /// Build the source; `None` when no consumption features are configured.
    pub fn new(prepared: PreparedConsumption) -> Result<Option<Self>> {
        let Some(spec) = prepared.config().features.clone() else {
            return Ok(None);
        };
        if spec.variables.iter().any(|v| v != CONSUMPTION_COLUMN) {
            return Err(PipelineError::Config(format!(
                "consumption features may only use the `{CONSUMPTION_COLUMN}` variable"
            )));
        }
        let generator = LagWindowFeatureGenerator::new(spec)?;
        Ok(Some(Self { prepared, generator }))
    }

    /// Add the features to an already prepared consumption frame.
    pub fn transform(&self, consumption: &DataFrame) -> Result<DataFrame> {
        self.generator.transform(consumption, "consumption_features")
    }
}

impl FeatureSource for ConsumptionFeatureSource {
    fn name(&self) -> &str {
        "consumption_features"
    }

    fn description(&self) -> &str {
        "Lagged and rolling statistics of past consumption"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Consumption
    }

    fn required_columns(&self) -> Vec<String> {
        vec![self.prepared.config().value_column.clone()]
    }

    fn generate(&self) -> Result<DataFrame> {
        self.transform(&self.prepared.frame()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::AggregateFn;
    use chrono::{NaiveDate, NaiveDateTime};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::fmt::Write as _;

    fn hour(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(h)
    }

    fn raw(hours: i64) -> DataFrame {
        let dates: Vec<String> = (0..hours)
            .map(|h| hour(h).format("%Y-%m-%d %H:%M").to_string())
            .collect();
        let values: Vec<f64> = (0..hours).map(|h| 100.0 + h as f64).collect();
        df!["Tarih" => dates, "Tuketim" => values].unwrap()
    }

    fn config() -> ConsumptionConfig {
        ConsumptionConfig {
            date_column: "Tarih".to_string(),
            value_column: "Tuketim".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extends_by_forecast_horizon() {
        let prepared = config().prepare(&raw(100)).unwrap();

        assert_eq!(prepared.height(), 148);
        assert_eq!(frame::column_names(&prepared), vec!["date", "consumption"]);
        let dates = frame::read_dates(&prepared, CONSUMPTION_COLUMN).unwrap();
        assert_eq!(dates[147], hour(147));

        let values = frame::float_values(&prepared, CONSUMPTION_COLUMN, CONSUMPTION_COLUMN).unwrap();
        assert_eq!(values[99], Some(199.0));
        assert!(values[100..].iter().all(Option::is_none));
    }

    #[test]
    fn test_prepare_is_idempotent() {
        let once = config().prepare(&raw(50)).unwrap();
        let twice = ConsumptionConfig::default().prepare(&once).unwrap();
        assert!(once.equals_missing(&twice));
    }

    #[test]
    fn test_missing_hours_become_null_rows() {
        let df = raw(10);
        let mask: Vec<bool> = (0..10).map(|i| i != 4).collect();
        let gappy = df
            .filter(&BooleanChunked::from_slice("keep".into(), &mask))
            .unwrap();

        let prepared = config().prepare(&gappy).unwrap();
        let values = frame::float_values(&prepared, CONSUMPTION_COLUMN, CONSUMPTION_COLUMN).unwrap();
        assert_eq!(prepared.height(), 10 + FORECAST_HORIZON);
        assert_eq!(values[4], None);
        assert_eq!(values[5], Some(105.0));
    }

    #[test]
    fn test_all_null_readings_are_rejected() {
        let df = df![
            "date" => ["2024-01-01 00:00", "2024-01-01 01:00"],
            "consumption" => [None::<f64>, None],
        ]
        .unwrap();
        let err = ConsumptionConfig::default().prepare(&df).unwrap_err();
        assert!(matches!(err, PipelineError::Ingestion { .. }));
    }

    #[test]
    fn test_missing_value_column() {
        let df = df!["date" => ["2024-01-01 00:00"]].unwrap();
        let err = ConsumptionConfig::default().prepare(&df).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn { ref column, .. } if column == "consumption"));
    }

    #[test]
    fn test_consumption_features_drop_the_target() {
        let config = ConsumptionConfig {
            features: Some(FeatureSpec {
                variables: vec![CONSUMPTION_COLUMN.to_string()],
                lag_periods: vec![48],
                window_sizes: vec![24],
                functions: vec![AggregateFn::Mean],
                ..Default::default()
            }),
            ..config()
        };
        let source = ConsumptionFeatureSource::new(PreparedConsumption::new(config.clone()))
            .unwrap()
            .unwrap();
        let prepared = config.prepare(&raw(100)).unwrap();
        let features = source.transform(&prepared).unwrap();

        let names = frame::column_names(&features);
        assert!(!names.contains(&CONSUMPTION_COLUMN.to_string()));
        assert!(names.contains(&"consumption_lag_48".to_string()));

        // The first forecast row sees the reading 48 hours earlier.
        let lag = frame::float_values(&features, "test", "consumption_lag_48").unwrap();
        assert_eq!(lag[100], Some(152.0));
    }

    #[test]
    fn test_consumption_features_are_optional() {
        assert!(ConsumptionFeatureSource::new(PreparedConsumption::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_consumption_features_reject_other_variables() {
        let config = ConsumptionConfig {
            features: Some(FeatureSpec::lags_only(["KGUP"], &[1], "")),
            ..Default::default()
        };
        assert!(matches!(
            ConsumptionFeatureSource::new(PreparedConsumption::new(config)),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_consumption_features_never_read_later_readings() {
        let config = ConsumptionConfig {
            features: Some(FeatureSpec {
                variables: vec![CONSUMPTION_COLUMN.to_string()],
                lag_periods: vec![1, 48],
                window_sizes: vec![6, 24],
                functions: vec![AggregateFn::Mean, AggregateFn::Max],
                expanding: true,
                ..Default::default()
            }),
            ..config()
        };
        let source = ConsumptionFeatureSource::new(PreparedConsumption::new(config.clone()))
            .unwrap()
            .unwrap();

        let mut rng = StdRng::seed_from_u64(11);
        let cut = 60;
        let original = raw(100);
        let perturbed_values: Vec<f64> = (0..100)
            .map(|i| if i > cut { rng.gen_range(-5000.0..5000.0) } else { 100.0 + i as f64 })
            .collect();
        let mut perturbed = original.clone();
        perturbed
            .with_column(Column::new("Tuketim".into(), perturbed_values))
            .unwrap();

        let a = source.transform(&config.prepare(&original).unwrap()).unwrap();
        let b = source.transform(&config.prepare(&perturbed).unwrap()).unwrap();
        for name in source.generator.feature_names() {
            let left = frame::float_values(&a, "test", &name).unwrap();
            let right = frame::float_values(&b, "test", &name).unwrap();
            assert_eq!(left[..=cut], right[..=cut], "{name} changed before the cut");
        }
    }

    #[test]
    fn test_sources_share_one_prepared_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consumption.csv");
        let mut csv = String::from("Tarih,Tuketim\n");
        for h in 0..30 {
            writeln!(csv, "{},{}", hour(h).format("%Y-%m-%d %H:%M"), 100 + h).unwrap();
        }
        std::fs::write(&path, csv).unwrap();

        let prepared = PreparedConsumption::new(ConsumptionConfig {
            path: path.clone(),
            features: Some(FeatureSpec::lags_only([CONSUMPTION_COLUMN], &[1], "")),
            ..config()
        });
        let target = ConsumptionSource::from_prepared(prepared.clone());
        let features = ConsumptionFeatureSource::new(prepared).unwrap().unwrap();

        let first = target.generate().unwrap();
        assert_eq!(first.height(), 30 + FORECAST_HORIZON);

        // Later sources reuse the frame instead of reading the file again.
        std::fs::remove_file(&path).unwrap();
        let lagged = features.generate().unwrap();
        assert_eq!(lagged.height(), first.height());
        assert!(target.generate().unwrap().equals_missing(&first));
    }
}
