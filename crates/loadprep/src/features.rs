//! Lag, rolling-window and expanding-window features.
//!
//! [`LagWindowFeatureGenerator`] is the single place where history is turned
//! into features, and it never reads a row later than the one it writes:
//!
//! - `{v}_lag_{k}` at row `t` is `v[t - k]`;
//! - `{v}_window_{w}_{fn}` at row `t` aggregates `v[t - w + 1 ..= t]`;
//! - `{v}_expanding_{fn}` at row `t` aggregates `v[0 ..= t]`.
//!
//! Rows without enough history get nulls; nothing is back-filled.

use crate::{
    PipelineError, Result,
    frame::{self, DATE_COLUMN},
};
use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Aggregation applied over a rolling or expanding window.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    /// Arithmetic mean of the non-null values
    #[display("mean")]
    Mean,
    /// Sum of the non-null values
    #[display("sum")]
    Sum,
    /// Minimum
    #[display("min")]
    Min,
    /// Maximum
    #[display("max")]
    Max,
    /// Sample standard deviation
    #[display("std")]
    Std,
}

impl AggregateFn {
    /// Rolling aggregation of `expr` over `window_size` rows ending at the
    /// current one, valid once `min_periods` non-null values are present.
    pub fn rolling(self, expr: Expr, window_size: usize, min_periods: usize) -> Expr {
        let options = RollingOptionsFixedWindow {
            window_size,
            min_periods,
            ..Default::default()
        };
        match self {
            Self::Mean => expr.rolling_mean(options),
            Self::Sum => expr.rolling_sum(options),
            Self::Min => expr.rolling_min(options),
            Self::Max => expr.rolling_max(options),
            Self::Std => expr.rolling_std(options),
        }
    }
}

/// Which history features to derive and from which columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSpec {
    /// Source columns; they are dropped from the output
    pub variables: Vec<String>,
    /// Lags in rows (hours on an hourly grid)
    pub lag_periods: Vec<usize>,
    /// Rolling window sizes in rows
    pub window_sizes: Vec<usize>,
    /// Aggregations for rolling and expanding windows
    pub functions: Vec<AggregateFn>,
    /// Non-null values required for a rolling window (default: the full window)
    pub min_periods: Option<usize>,
    /// Whether to add expanding-window features
    pub expanding: bool,
    /// Appended to lag column names, e.g. `h` for `temp_lag_3h`
    pub unit_suffix: String,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self {
            variables: Vec::new(),
            lag_periods: Vec::new(),
            window_sizes: Vec::new(),
            functions: vec![AggregateFn::Mean],
            min_periods: None,
            expanding: true,
            unit_suffix: String::new(),
        }
    }
}

impl FeatureSpec {
    /// Lag features only, with a unit suffix on the column names.
    pub fn lags_only(
        variables: impl IntoIterator<Item = impl Into<String>>,
        lag_periods: &[usize],
        unit_suffix: &str,
    ) -> Self {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            lag_periods: lag_periods.to_vec(),
            window_sizes: Vec::new(),
            functions: Vec::new(),
            min_periods: None,
            expanding: false,
            unit_suffix: unit_suffix.to_string(),
        }
    }

    /// Check the feature spec is usable.
    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(PipelineError::Config(
                "feature spec has no variables".to_string(),
            ));
        }
        if self.lag_periods.contains(&0) {
            return Err(PipelineError::Config(
                "lag periods must be positive".to_string(),
            ));
        }
        if self.window_sizes.contains(&0) {
            return Err(PipelineError::Config(
                "window sizes must be positive".to_string(),
            ));
        }
        if self.min_periods == Some(0) {
            return Err(PipelineError::Config(
                "min_periods must be positive".to_string(),
            ));
        }
        if (!self.window_sizes.is_empty() || self.expanding) && self.functions.is_empty() {
            return Err(PipelineError::Config(
                "window features need at least one function".to_string(),
            ));
        }
        Ok(())
    }

    /// Name of the lag-`k` column for `variable`.
    pub fn lag_name(&self, variable: &str, k: usize) -> String {
        format!("{variable}_lag_{k}{}", self.unit_suffix)
    }

    /// Name of the rolling column for `variable`.
    pub fn window_name(variable: &str, window: usize, function: AggregateFn) -> String {
        format!("{variable}_window_{window}_{function}")
    }

    /// Name of the expanding column for `variable`.
    pub fn expanding_name(variable: &str, function: AggregateFn) -> String {
        format!("{variable}_expanding_{function}")
    }
}

/// Derives lag, rolling and expanding features from a date-sorted frame.
#[derive(Debug, Clone)]
pub struct LagWindowFeatureGenerator {
    spec: FeatureSpec,
}

impl LagWindowFeatureGenerator {
    /// Create a generator, rejecting an invalid feature spec.
    pub fn new(spec: FeatureSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    /// The feature spec driving this generator.
    pub const fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    /// Names of the generated columns, in output order.
    pub fn feature_names(&self) -> Vec<String> {
        let spec = &self.spec;
        let mut names = Vec::new();
        for variable in &spec.variables {
            for &k in &spec.lag_periods {
                names.push(spec.lag_name(variable, k));
            }
            for &w in &spec.window_sizes {
                for &f in &spec.functions {
                    names.push(FeatureSpec::window_name(variable, w, f));
                }
            }
            if spec.expanding {
                for &f in &spec.functions {
                    names.push(FeatureSpec::expanding_name(variable, f));
                }
            }
        }
        names
    }

    /// Add the features to `df` and drop the raw variable columns.
    ///
    /// The frame is sorted by date first. `frame_name` is used in errors.
    pub fn transform(&self, df: &DataFrame, frame_name: &str) -> Result<DataFrame> {
        let spec = &self.spec;
        let mut required = vec![DATE_COLUMN];
        required.extend(spec.variables.iter().map(String::as_str));
        frame::require_columns(df, frame_name, &required)?;

        let sorted = frame::sort_by_date(df)?;
        let expanding_window = sorted.height().max(1);

        let mut exprs = Vec::new();
        for variable in &spec.variables {
            let base = col(variable.as_str()).cast(DataType::Float64);
            for &k in &spec.lag_periods {
                exprs.push(
                    base.clone()
                        .shift(lit(k as i64))
                        .alias(spec.lag_name(variable, k)),
                );
            }
            for &w in &spec.window_sizes {
                let min_periods = spec.min_periods.unwrap_or(w).min(w);
                for &f in &spec.functions {
                    exprs.push(
                        f.rolling(base.clone(), w, min_periods)
                            .alias(FeatureSpec::window_name(variable, w, f)),
                    );
                }
            }
            if spec.expanding {
                for &f in &spec.functions {
                    exprs.push(
                        f.rolling(base.clone(), expanding_window, 1)
                            .alias(FeatureSpec::expanding_name(variable, f)),
                    );
                }
            }
        }

        let raw: HashSet<&str> = spec.variables.iter().map(String::as_str).collect();
        let mut output: Vec<Expr> = frame::column_names(&sorted)
            .iter()
            .filter(|name| !raw.contains(name.as_str()))
            .map(|name| col(name.as_str()))
            .collect();
        output.extend(self.feature_names().iter().map(|name| col(name.as_str())));

        let result = sorted.lazy().with_columns(exprs).select(output).collect()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use rstest::rstest;

    fn hours(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|h| start + Duration::hours(h as i64)).collect()
    }

    fn series_frame(values: &[Option<f64>]) -> DataFrame {
        let mut df = DataFrame::new(vec![frame::naive_date_column(&hours(values.len())).unwrap()])
            .unwrap();
        df.with_column(Series::new("load".into(), values.to_vec()))
            .unwrap();
        df
    }

    fn values(df: &DataFrame, name: &str) -> Vec<Option<f64>> {
        frame::float_values(df, "test", name).unwrap()
    }

    fn spec(lags: &[usize], windows: &[usize], functions: &[AggregateFn]) -> FeatureSpec {
        FeatureSpec {
            variables: vec!["load".to_string()],
            lag_periods: lags.to_vec(),
            window_sizes: windows.to_vec(),
            functions: functions.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn test_lag_reads_k_rows_back() {
        let df = series_frame(&[Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]);
        let generator = LagWindowFeatureGenerator::new(spec(&[2], &[], &[AggregateFn::Mean])).unwrap();

        let result = generator.transform(&df, "test").unwrap();

        assert_eq!(
            values(&result, "load_lag_2"),
            vec![None, None, Some(1.0), Some(2.0), Some(3.0)]
        );
        assert!(result.column("load").is_err());
    }

    #[test]
    fn test_window_covers_current_row() {
        let df = series_frame(&[Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]);
        let generator = LagWindowFeatureGenerator::new(spec(
            &[],
            &[3],
            &[AggregateFn::Mean, AggregateFn::Sum, AggregateFn::Max],
        ))
        .unwrap();

        let result = generator.transform(&df, "test").unwrap();

        assert_eq!(
            values(&result, "load_window_3_mean"),
            vec![None, None, Some(2.0), Some(3.0), Some(4.0)]
        );
        assert_eq!(
            values(&result, "load_window_3_sum"),
            vec![None, None, Some(6.0), Some(9.0), Some(12.0)]
        );
        assert_eq!(
            values(&result, "load_window_3_max"),
            vec![None, None, Some(3.0), Some(4.0), Some(5.0)]
        );
    }

    #[test]
    fn test_window_min_periods_relaxes_validity() {
        let df = series_frame(&[Some(1.0), Some(3.0), Some(5.0)]);
        let mut relaxed = spec(&[], &[2], &[AggregateFn::Mean]);
        relaxed.min_periods = Some(1);
        relaxed.expanding = false;

        let result = LagWindowFeatureGenerator::new(relaxed)
            .unwrap()
            .transform(&df, "test")
            .unwrap();

        assert_eq!(
            values(&result, "load_window_2_mean"),
            vec![Some(1.0), Some(2.0), Some(4.0)]
        );
    }

    #[test]
    fn test_expanding_aggregates_prefix() {
        let df = series_frame(&[Some(2.0), Some(4.0), Some(6.0), Some(8.0)]);
        let generator =
            LagWindowFeatureGenerator::new(spec(&[], &[], &[AggregateFn::Mean, AggregateFn::Min]))
                .unwrap();

        let result = generator.transform(&df, "test").unwrap();
        let mean = values(&result, "load_expanding_mean");

        assert_relative_eq!(mean[0].unwrap(), 2.0);
        assert_relative_eq!(mean[1].unwrap(), 3.0);
        assert_relative_eq!(mean[3].unwrap(), 5.0);
        assert_eq!(
            values(&result, "load_expanding_min"),
            vec![Some(2.0); 4]
        );
    }

    #[test]
    fn test_nulls_are_skipped_not_filled() {
        let df = series_frame(&[Some(1.0), None, Some(3.0), Some(5.0)]);
        let generator = LagWindowFeatureGenerator::new(spec(&[1], &[], &[AggregateFn::Sum])).unwrap();

        let result = generator.transform(&df, "test").unwrap();

        assert_eq!(
            values(&result, "load_lag_1"),
            vec![None, Some(1.0), None, Some(3.0)]
        );
        assert_eq!(
            values(&result, "load_expanding_sum"),
            vec![Some(1.0), Some(1.0), Some(4.0), Some(9.0)]
        );
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let dates = hours(3);
        let shuffled = vec![dates[2], dates[0], dates[1]];
        let mut df = DataFrame::new(vec![frame::naive_date_column(&shuffled).unwrap()]).unwrap();
        df.with_column(Series::new("load".into(), [30.0, 10.0, 20.0]))
            .unwrap();
        let generator = LagWindowFeatureGenerator::new(spec(&[1], &[], &[AggregateFn::Mean])).unwrap();

        let result = generator.transform(&df, "test").unwrap();

        assert_eq!(values(&result, "load_lag_1"), vec![None, Some(10.0), Some(20.0)]);
    }

    #[test]
    fn test_unit_suffix_names() {
        let spec = FeatureSpec::lags_only(["temp"], &[1, 24], "h");
        let generator = LagWindowFeatureGenerator::new(spec).unwrap();
        assert_eq!(generator.feature_names(), vec!["temp_lag_1h", "temp_lag_24h"]);
    }

    #[rstest]
    #[case::no_variables(FeatureSpec { variables: vec![], ..spec(&[1], &[], &[AggregateFn::Mean]) })]
    #[case::zero_lag(spec(&[0], &[], &[AggregateFn::Mean]))]
    #[case::zero_window(spec(&[], &[0], &[AggregateFn::Mean]))]
    #[case::no_functions(spec(&[], &[3], &[]))]
    fn test_invalid_specs_are_rejected(#[case] spec: FeatureSpec) {
        let err = LagWindowFeatureGenerator::new(spec).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_missing_variable_is_reported() {
        let df = series_frame(&[Some(1.0)]);
        let mut other = spec(&[1], &[], &[AggregateFn::Mean]);
        other.variables = vec!["price".to_string()];

        let err = LagWindowFeatureGenerator::new(other)
            .unwrap()
            .transform(&df, "market")
            .unwrap_err();

        assert!(matches!(err, PipelineError::MissingColumn { .. }));
    }

    #[test]
    fn test_features_never_read_later_rows() {
        let mut rng = StdRng::seed_from_u64(7);
        let original: Vec<Option<f64>> = (0..80).map(|_| Some(rng.gen_range(0.0..100.0))).collect();
        let cut = 50;
        let mut perturbed = original.clone();
        for value in perturbed.iter_mut().skip(cut + 1) {
            *value = Some(rng.gen_range(-1000.0..1000.0));
        }

        let generator = LagWindowFeatureGenerator::new(spec(
            &[1, 24],
            &[6, 24],
            &[AggregateFn::Mean, AggregateFn::Std, AggregateFn::Min],
        ))
        .unwrap();
        let a = generator.transform(&series_frame(&original), "test").unwrap();
        let b = generator.transform(&series_frame(&perturbed), "test").unwrap();

        for name in generator.feature_names() {
            let left = values(&a, &name);
            let right = values(&b, &name);
            assert_eq!(left[..=cut], right[..=cut], "{name} changed before the cut");
        }
    }
}
