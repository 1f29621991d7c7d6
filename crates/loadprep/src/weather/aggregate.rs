//! Combining per-location weather frames into one frame with mixed columns.

use crate::{
    PipelineError, Result,
    frame::{self, DATE_COLUMN},
};
use chrono::NaiveDateTime;
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Historical and forecast feature frames of one location.
#[derive(Debug, Clone)]
pub struct LocationFrames {
    /// Location identifier, used as the column suffix
    pub location: String,
    /// Features over the historical range
    pub historical: DataFrame,
    /// Features over the forecast range
    pub forecast: DataFrame,
}

/// Where a location's measurement ended up after suffixing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    /// Column name in the combined frame
    pub column: String,
    /// Whether the column holds numbers
    pub numeric: bool,
}

/// Mapping `location -> measurement -> column` for a combined frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationColumns {
    locations: BTreeMap<String, BTreeMap<String, ColumnRef>>,
}

impl LocationColumns {
    /// Record a suffixed column.
    pub fn insert(&mut self, location: &str, measurement: &str, column: String, numeric: bool) {
        self.locations
            .entry(location.to_string())
            .or_default()
            .insert(measurement.to_string(), ColumnRef { column, numeric });
    }

    /// Column holding `measurement` at `location`.
    pub fn column(&self, location: &str, measurement: &str) -> Option<&ColumnRef> {
        self.locations.get(location)?.get(measurement)
    }

    /// Locations present.
    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.locations.keys().map(String::as_str)
    }

    /// Numeric measurements present at any location, sorted.
    pub fn numeric_measurements(&self) -> BTreeSet<&str> {
        self.locations
            .values()
            .flat_map(|columns| columns.iter())
            .filter(|(_, c)| c.numeric)
            .map(|(m, _)| m.as_str())
            .collect()
    }
}

/// Name of the composite column for `measurement`.
pub fn mixed_name(measurement: &str) -> String {
    format!("{measurement}_mixed")
}

/// Joins per-location frames and adds weighted-sum composites.
///
/// The composite is `Σ weight · value` over locations with a positive weight.
/// Weights are not renormalised, so they should sum to one for the
/// composite to stay on the scale of its inputs.
#[derive(Debug, Clone)]
pub struct MultiLocationWeatherAggregator {
    weights: BTreeMap<String, f64>,
}

impl MultiLocationWeatherAggregator {
    /// Create an aggregator, rejecting negative, non-finite or all-zero weights.
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self> {
        if let Some((location, weight)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(PipelineError::Config(format!(
                "weight {weight} for location `{location}` must be finite and non-negative"
            )));
        }
        if !weights.values().any(|w| *w > 0.0) {
            return Err(PipelineError::Config(
                "location_weights must give at least one location a positive weight".to_string(),
            ));
        }
        Ok(Self { weights })
    }

    /// Locations with a positive weight, sorted by name.
    fn contributing(&self) -> Vec<(&str, f64)> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(l, w)| (l.as_str(), *w))
            .collect()
    }

    /// Concatenate a location's historical and forecast frames.
    ///
    /// Historical rows win: forecast rows at or before the last historical
    /// timestamp are dropped. Dates come out as naive local time.
    pub fn concat_location(&self, frames: &LocationFrames) -> Result<DataFrame> {
        let name = format!("weather/{}", frames.location);
        let historical = frame::strip_timezone(&frames.historical, &name)?;
        let forecast = frame::strip_timezone(&frames.forecast, &name)?;

        if frame::column_names(&historical) != frame::column_names(&forecast) {
            return Err(PipelineError::Alignment {
                frame: name,
                reason: "historical and forecast columns differ".to_string(),
            });
        }

        let last_historical = frame::read_dates(&historical, &name)?.into_iter().max();
        let forecast = match last_historical {
            Some(last) => {
                let keep: Vec<bool> = frame::read_dates(&forecast, &name)?
                    .iter()
                    .map(|d| *d > last)
                    .collect();
                let dropped = keep.iter().filter(|k| !**k).count();
                if dropped > 0 {
                    debug!(frame = %name, dropped, "forecast rows overlapping history dropped");
                }
                forecast.filter(&BooleanChunked::from_slice("keep".into(), &keep))?
            }
            None => forecast,
        };

        let combined = historical.vstack(&forecast)?;
        frame::dedupe_dates(&frame::sort_by_date(&combined)?, &name)
    }

    /// Suffix every location's columns and outer-merge on the union of dates.
    pub fn combine(&self, frames: &[(String, DataFrame)]) -> Result<(DataFrame, LocationColumns)> {
        let mut columns = LocationColumns::default();
        let mut dates: BTreeSet<NaiveDateTime> = BTreeSet::new();
        let mut suffixed = Vec::with_capacity(frames.len());

        for (location, df) in frames {
            let name = format!("weather/{location}");
            dates.extend(frame::read_dates(df, &name)?);

            let mut select = vec![col(DATE_COLUMN)];
            for column in df.get_columns() {
                let measurement = column.name().as_str();
                if measurement == DATE_COLUMN {
                    continue;
                }
                let target = format!("{measurement}_{location}");
                columns.insert(
                    location,
                    measurement,
                    target.clone(),
                    frame::is_numeric(column.dtype()),
                );
                select.push(col(measurement).alias(target));
            }
            suffixed.push(df.clone().lazy().select(select));
        }

        let union: Vec<NaiveDateTime> = dates.into_iter().collect();
        let mut merged =
            DataFrame::new(vec![frame::naive_date_column(&union)?])?.lazy();
        for lf in suffixed {
            merged = merged.join(
                lf,
                [col(DATE_COLUMN)],
                [col(DATE_COLUMN)],
                JoinArgs::new(JoinType::Left),
            );
        }
        let merged = merged
            .sort([DATE_COLUMN], SortMultipleOptions::default())
            .collect()?;
        Ok((merged, columns))
    }

    /// Weighted-sum composites for every numeric measurement.
    ///
    /// A null in any contributing column makes that row's composite null. A
    /// weighted location without the measurement contributes zero.
    pub fn mix(&self, combined: &DataFrame, columns: &LocationColumns) -> Result<Vec<Column>> {
        let contributing = self.contributing();
        let known: BTreeSet<&str> = columns.locations().collect();
        for (location, _) in &contributing {
            if !known.contains(location) {
                warn!(location, "weighted location has no weather data");
            }
        }

        let weights = Array1::from_iter(contributing.iter().map(|(_, w)| *w));
        let rows = combined.height();
        let mut mixed = Vec::new();
        for measurement in columns.numeric_measurements() {
            let mut matrix = Array2::<f64>::zeros((rows, contributing.len()));
            for (j, (location, _)) in contributing.iter().enumerate() {
                match columns.column(location, measurement).filter(|c| c.numeric) {
                    Some(column) => {
                        let values = frame::float_values(combined, "weather", &column.column)?;
                        let values = Array1::from_iter(values.into_iter().map(|v| v.unwrap_or(f64::NAN)));
                        matrix.column_mut(j).assign(&values);
                    }
                    None if known.contains(location) => {
                        warn!(location, measurement, "weighted location lacks measurement, counted as zero");
                    }
                    None => {}
                }
            }
            let sums = matrix.dot(&weights);
            let values: Vec<Option<f64>> = sums
                .iter()
                .map(|v| (!v.is_nan()).then_some(*v))
                .collect();
            mixed.push(Column::new(mixed_name(measurement).into(), values));
        }
        Ok(mixed)
    }

    /// Concatenate, combine and mix all locations.
    pub fn aggregate(&self, locations: &[LocationFrames]) -> Result<DataFrame> {
        let frames = locations
            .iter()
            .map(|l| Ok((l.location.clone(), self.concat_location(l)?)))
            .collect::<Result<Vec<_>>>()?;
        let (mut combined, columns) = self.combine(&frames)?;
        for column in self.mix(&combined, &columns)? {
            combined.with_column(column)?;
        }
        debug!(
            locations = frames.len(),
            rows = combined.height(),
            columns = combined.width(),
            "weather locations aggregated"
        );
        Ok(combined)
    }
}
