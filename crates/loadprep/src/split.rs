//! Historical/forecast partition and artifact persistence.
//!
//! The aligned dataset is type-normalised once, then cut into a training
//! prefix and the trailing [`FORECAST_HORIZON`] rows. Both parts share one
//! schema, which is what the downstream regressor relies on.

use crate::{
    FORECAST_HORIZON, PipelineError, Result,
    consumption::CONSUMPTION_COLUMN,
    frame::{self, DATE_COLUMN},
    io,
};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

const HISTORICAL_DIR: &str = "Historical_Data";
const FORECAST_DIR: &str = "Forecast_Data";

/// Where and how the partition is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory of the artifacts
    pub base_path: PathBuf,
    /// Put each run under a `YYYY_MM_DD` folder
    pub day_folder: bool,
    /// Add the run time stamp to the file names
    pub run_stamp: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("data/processed"),
            day_folder: true,
            run_stamp: true,
        }
    }
}

/// Paths of one historical/forecast artifact pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Historical (training) Parquet file
    pub historical: PathBuf,
    /// Forecast (serving) Parquet file
    pub forecast: PathBuf,
}

impl ArtifactLayout {
    /// Paths for a run at `run_time`.
    ///
    /// With both options on, the historical file is
    /// `<base>/<YYYY_MM_DD>/Historical_Data/Historical_Data_<YYYY_MM_DD HH_MM_SS>.parquet`.
    pub fn resolve(config: &OutputConfig, run_time: NaiveDateTime) -> Self {
        let mut root = config.base_path.clone();
        if config.day_folder {
            root.push(run_time.format("%Y_%m_%d").to_string());
        }
        let file = |dir: &str| {
            let name = if config.run_stamp {
                format!("{dir}_{}.parquet", run_time.format("%Y_%m_%d %H_%M_%S"))
            } else {
                format!("{dir}.parquet")
            };
            root.join(dir).join(name)
        };
        Self {
            historical: file(HISTORICAL_DIR),
            forecast: file(FORECAST_DIR),
        }
    }
}

/// Training prefix and forecast suffix of the aligned dataset.
#[derive(Debug, Clone)]
pub struct HistoricalForecastPartition {
    historical: DataFrame,
    forecast: DataFrame,
}

impl HistoricalForecastPartition {
    /// Rows with known consumption, used for training.
    pub const fn historical(&self) -> &DataFrame {
        &self.historical
    }

    /// The trailing forecast rows.
    pub const fn forecast(&self) -> &DataFrame {
        &self.forecast
    }

    /// Forecast rows without the placeholder target, ready for a predictor.
    pub fn prediction_input(&self) -> Result<DataFrame> {
        let keep: Vec<Expr> = frame::column_names(&self.forecast)
            .iter()
            .filter(|name| name.as_str() != CONSUMPTION_COLUMN)
            .map(|name| col(name.as_str()))
            .collect();
        Ok(self.forecast.clone().lazy().select(keep).collect()?)
    }

    /// Predicted consumption keyed by the forecast timestamps.
    pub fn attach_predictions(&self, values: &[f64]) -> Result<DataFrame> {
        if values.len() != self.forecast.height() {
            return Err(PipelineError::Computation(format!(
                "got {} predictions for {} forecast rows",
                values.len(),
                self.forecast.height()
            )));
        }
        let date = self
            .forecast
            .column(DATE_COLUMN)
            .map_err(|_| PipelineError::missing_column("forecast", DATE_COLUMN))?
            .clone();
        Ok(DataFrame::new(vec![
            date,
            Column::new(CONSUMPTION_COLUMN.into(), values),
        ])?)
    }

    /// Write both parts as Parquet files.
    ///
    /// Each file is written under a temporary name and renamed once both
    /// are complete. On failure the temporary files are removed. A pair
    /// from an earlier run at the same paths is kept when the failure came
    /// before any rename, and removed with the new file otherwise, so the
    /// targets never hold a mixed pair.
    pub fn persist(&self, layout: &ArtifactLayout) -> Result<()> {
        let staged = [
            (&self.historical, &layout.historical, temporary(&layout.historical)),
            (&self.forecast, &layout.forecast, temporary(&layout.forecast)),
        ];

        let mut renamed = false;
        let written = (|| -> Result<()> {
            for (df, target, tmp) in &staged {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut df = (*df).clone();
                io::write_parquet(tmp, &mut df)?;
            }
            for (_, target, tmp) in &staged {
                fs::rename(tmp, target)?;
                renamed = true;
            }
            Ok(())
        })();

        if let Err(err) = written {
            for (_, _, tmp) in &staged {
                remove_quietly(tmp);
            }
            // A partial rename has already broken any earlier pair.
            if renamed {
                for (_, target, _) in &staged {
                    remove_quietly(target);
                }
            }
            return Err(err);
        }
        info!(
            historical = %layout.historical.display(),
            forecast = %layout.forecast.display(),
            "artifacts written"
        );
        Ok(())
    }
}

fn temporary(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn remove_quietly(path: &Path) {
    if path.is_file() {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "could not remove partial artifact");
        }
    }
}

/// Normalises column types and cuts off the forecast horizon.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoricalForecastSplitter;

impl HistoricalForecastSplitter {
    /// Create a splitter.
    pub const fn new() -> Self {
        Self
    }

    /// Numeric columns become `Float64`, text becomes `Categorical`, and any
    /// column with exactly two distinct non-null values becomes `Boolean`.
    ///
    /// A two-valued column is `true` where it holds the larger value
    /// (numerically, or lexicographically for text); nulls stay null.
    pub fn normalize(&self, df: &DataFrame) -> Result<DataFrame> {
        let categorical = DataType::Categorical(None, CategoricalOrdering::Physical);
        let mut exprs = Vec::with_capacity(df.width());
        for name in frame::column_names(df) {
            if name == DATE_COLUMN {
                exprs.push(col(DATE_COLUMN));
                continue;
            }
            let dtype = df.column(&name)?.dtype().clone();
            let expr = if frame::is_numeric(&dtype) {
                let mut distinct: Vec<f64> = frame::float_values(df, "aligned", &name)?
                    .into_iter()
                    .flatten()
                    .filter(|v| !v.is_nan())
                    .map(|v| v + 0.0)
                    .collect();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup();
                match two_values(distinct) {
                    Some(larger) => col(name.as_str()).cast(DataType::Float64).eq(lit(larger)),
                    None => col(name.as_str()).cast(DataType::Float64),
                }
            } else if matches!(dtype, DataType::String | DataType::Categorical(_, _)) {
                let distinct: BTreeSet<String> = frame::string_values(df, "aligned", &name)?
                    .into_iter()
                    .flatten()
                    .collect();
                let text = col(name.as_str()).cast(DataType::String);
                match two_values(distinct.into_iter().collect()) {
                    Some(larger) => text.eq(lit(larger)),
                    None => text.cast(categorical.clone()),
                }
            } else {
                col(name.as_str())
            };
            exprs.push(expr.alias(name.as_str()));
        }
        Ok(df.clone().lazy().select(exprs).collect()?)
    }

    /// Normalise `aligned` and split off the trailing [`FORECAST_HORIZON`] rows.
    pub fn split(&self, aligned: &DataFrame) -> Result<HistoricalForecastPartition> {
        let rows = aligned.height();
        if rows <= FORECAST_HORIZON {
            return Err(PipelineError::InsufficientData {
                required: FORECAST_HORIZON + 1,
                available: rows,
            });
        }
        let normalized = self.normalize(aligned)?;
        let cut = rows - FORECAST_HORIZON;
        let partition = HistoricalForecastPartition {
            historical: normalized.slice(0, cut),
            forecast: normalized.slice(cut as i64, FORECAST_HORIZON),
        };
        info!(
            historical = partition.historical.height(),
            forecast = partition.forecast.height(),
            "dataset split"
        );
        Ok(partition)
    }
}

/// The larger of exactly two sorted distinct values.
fn two_values<T>(mut sorted: Vec<T>) -> Option<T> {
    if sorted.len() == 2 { sorted.pop() } else { None }
}
