//! Market-clearing data.
//!
//! Day-ahead clearing quantities, planned generation and load forecasts are
//! only known up to the previous day, so they enter the feature matrix as
//! lags and trailing windows, never as raw values.

use crate::{
    FORECAST_HORIZON, PipelineError, Result,
    features::{AggregateFn, FeatureSpec, LagWindowFeatureGenerator},
    frame::{self, DATE_COLUMN},
    grid::TimeGridBuilder,
    io,
    registry::SourceKind,
    traits::{ConfigurableSource, FeatureSource},
};
use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Variables published by the market operator.
pub const MARKET_VARIABLES: &[&str] = &["KGUP", "GercekTuketim", "GopAlis", "IaAlis", "YukTahmin"];

/// Text format of market timestamps.
pub const MARKET_DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Default market features: lags and trailing means over two days and a week.
pub fn default_market_spec() -> FeatureSpec {
    FeatureSpec {
        variables: MARKET_VARIABLES.iter().map(|v| v.to_string()).collect(),
        lag_periods: vec![48, 168],
        window_sizes: vec![48, 168],
        functions: vec![AggregateFn::Mean],
        min_periods: None,
        expanding: true,
        unit_suffix: String::new(),
    }
}

/// Configuration for the market source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// CSV or Parquet file with the market variables
    pub path: PathBuf,
    /// First timestamp of the market grid
    #[serde(with = "crate::config::config_date")]
    pub start_date: NaiveDateTime,
    /// `strftime` format of text dates (default: `%Y-%m-%d %H:%M`)
    pub date_format: String,
    /// Features derived from the market variables
    pub features: FeatureSpec,
    /// Optional Parquet table inner-joined on `date` after the features
    pub auxiliary_path: Option<PathBuf>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap_or_default()
                .and_time(chrono::NaiveTime::MIN),
            date_format: MARKET_DATE_FORMAT.to_string(),
            features: default_market_spec(),
            auxiliary_path: None,
        }
    }
}

/// Lag, window and expanding features of the market variables.
#[derive(Debug, Clone, Default)]
pub struct MarketSource {
    config: MarketConfig,
}

impl MarketSource {
    /// Features for an already loaded market frame.
    ///
    /// The frame is placed on an hourly grid of `rows + 48` timestamps from
    /// `start_date`, so the forecast hours get lagged values too.
    pub fn transform(&self, raw: &DataFrame, auxiliary: Option<&DataFrame>) -> Result<DataFrame> {
        let config = &self.config;
        let mut required = vec![DATE_COLUMN];
        required.extend(config.features.variables.iter().map(String::as_str));
        frame::require_columns(raw, "market", &required)?;

        let parsed = frame::strip_timezone(
            &frame::coerce_dates(raw, "market", Some(config.date_format.as_str()))?,
            "market",
        )?;
        let grid = TimeGridBuilder::periods(config.start_date, parsed.height() + FORECAST_HORIZON);
        let gridded = grid.align(&parsed, "market")?;

        let generator = LagWindowFeatureGenerator::new(config.features.clone())?;
        let features = generator.transform(&gridded, "market")?;
        info!(rows = features.height(), features = generator.feature_names().len(), "market features built");

        match auxiliary {
            Some(aux) => join_auxiliary(&features, aux),
            None => Ok(features),
        }
    }
}

fn join_auxiliary(features: &DataFrame, aux: &DataFrame) -> Result<DataFrame> {
    let name = "market/auxiliary";
    let aux = frame::coerce_dates(aux, name, None)?;
    let aux = frame::dedupe_dates(&frame::strip_timezone(&aux, name)?, name)?;

    let existing = frame::column_names(features);
    if let Some(clash) = frame::column_names(&aux)
        .into_iter()
        .find(|c| c != DATE_COLUMN && existing.contains(c))
    {
        return Err(PipelineError::ingestion(
            name,
            format!("column `{clash}` already produced by the market features"),
        ));
    }

    let joined = features
        .clone()
        .lazy()
        .join(
            aux.lazy(),
            [col(DATE_COLUMN)],
            [col(DATE_COLUMN)],
            JoinArgs::new(JoinType::Inner),
        )
        .sort([DATE_COLUMN], SortMultipleOptions::default())
        .collect()?;
    if joined.height() == 0 {
        return Err(PipelineError::Alignment {
            frame: name.to_string(),
            reason: "no timestamps shared with the market features".to_string(),
        });
    }
    Ok(joined)
}

impl FeatureSource for MarketSource {
    fn name(&self) -> &str {
        "market"
    }

    fn description(&self) -> &str {
        "Lagged and rolling market-clearing variables"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Market
    }

    fn required_columns(&self) -> Vec<String> {
        self.config.features.variables.clone()
    }

    fn generate(&self) -> Result<DataFrame> {
        let raw = io::read_frame(&self.config.path, "market")?;
        let auxiliary = self
            .config
            .auxiliary_path
            .as_deref()
            .map(|p| io::read_frame(p, "market/auxiliary"))
            .transpose()?;
        self.transform(&raw, auxiliary.as_ref())
    }
}

impl ConfigurableSource for MarketSource {
    type Config = MarketConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
