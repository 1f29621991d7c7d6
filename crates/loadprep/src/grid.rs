//! Uniform hourly date grids.

use crate::{
    PipelineError, Result,
    frame::{self, DATE_COLUMN},
};
use chrono::{Duration, NaiveDateTime};
use polars::prelude::*;
use std::collections::HashSet;
use tracing::debug;

/// Builds a strictly increasing grid of timestamps at a fixed hourly step.
///
/// Sources are placed on the grid with [`TimeGridBuilder::align`], which
/// turns missing hours into explicit rows of nulls instead of silently
/// shifting every later row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeGridBuilder {
    start: NaiveDateTime,
    count: usize,
    step_hours: u32,
}

impl TimeGridBuilder {
    /// Grid of `count` hourly timestamps starting at `start`.
    pub const fn periods(start: NaiveDateTime, count: usize) -> Self {
        Self {
            start,
            count,
            step_hours: 1,
        }
    }

    /// Hourly grid from `start` to `end`, both inclusive.
    pub fn until(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        Self::until_every(start, end, 1)
    }

    /// Grid from `start` to `end` inclusive, stepping `step_hours` at a time.
    ///
    /// `end` is included only when it lies on the step.
    pub fn until_every(start: NaiveDateTime, end: NaiveDateTime, step_hours: u32) -> Result<Self> {
        if start > end {
            return Err(PipelineError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        if step_hours == 0 {
            return Err(PipelineError::Config("grid step must be positive".to_string()));
        }
        let span = (end - start).num_hours() as usize;
        Ok(Self {
            start,
            count: span / step_hours as usize + 1,
            step_hours,
        })
    }

    /// First timestamp of the grid.
    pub const fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Number of timestamps.
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the grid has no timestamps.
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The grid timestamps.
    pub fn dates(&self) -> Vec<NaiveDateTime> {
        let step = Duration::hours(self.step_hours as i64);
        (0..self.count)
            .map(|i| self.start + step * i as i32)
            .collect()
    }

    /// A frame with only the naive `date` column.
    pub fn frame(&self) -> Result<DataFrame> {
        Ok(DataFrame::new(vec![frame::naive_date_column(
            &self.dates(),
        )?])?)
    }

    /// Left-join `source` onto the grid.
    ///
    /// Grid timestamps absent from the source become rows whose feature
    /// columns are null; source rows off the grid are dropped. Timezone-aware
    /// sources are converted to local wall time first.
    pub fn align(&self, source: &DataFrame, frame_name: &str) -> Result<DataFrame> {
        let source = frame::dedupe_dates(&frame::strip_timezone(source, frame_name)?, frame_name)?;
        let present: HashSet<NaiveDateTime> =
            frame::read_dates(&source, frame_name)?.into_iter().collect();
        let dates = self.dates();
        let gaps = dates.iter().filter(|d| !present.contains(*d)).count();
        debug!(frame = frame_name, rows = dates.len(), gaps, "aligned onto hourly grid");

        let aligned = self
            .frame()?
            .lazy()
            .join(
                source.lazy(),
                [col(DATE_COLUMN)],
                [col(DATE_COLUMN)],
                JoinArgs::new(JoinType::Left),
            )
            .sort([DATE_COLUMN], SortMultipleOptions::default())
            .collect()?;
        Ok(aligned)
    }
}
