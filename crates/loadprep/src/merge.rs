//! Inner-join reduction of the source frames.

use crate::{
    PipelineError, Result,
    frame::{self, DATE_COLUMN},
};
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};

/// All sources joined on their shared timestamps.
///
/// The date column is naive local wall time, strictly increasing, and is the
/// intersection of the date sets of every joined frame.
#[derive(Debug, Clone)]
pub struct AlignedDataset {
    frame: DataFrame,
    sources: Vec<String>,
}

impl AlignedDataset {
    /// The joined frame.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Consume the dataset and return the joined frame.
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    /// Names of the joined sources, in join order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Number of aligned rows.
    pub fn height(&self) -> usize {
        self.frame.height()
    }

    /// The aligned timestamps.
    pub fn dates(&self) -> Result<Vec<NaiveDateTime>> {
        frame::read_dates(&self.frame, "aligned")
    }
}

/// Joins named frames on `date`, in the order given.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReducer;

impl MergeReducer {
    /// Create a reducer.
    pub const fn new() -> Self {
        Self
    }

    /// Normalise one frame for joining: naive wall time, unique dates.
    fn prepare(name: &str, df: &DataFrame) -> Result<DataFrame> {
        let local = frame::strip_timezone(df, name)?;
        frame::dedupe_dates(&local, name)
    }

    /// Inner-join `frames` on `date`.
    ///
    /// A non-date column appearing in two frames is rejected, and a join
    /// that leaves no rows is an alignment error naming the frame that
    /// emptied the result.
    pub fn reduce(&self, frames: &[(String, DataFrame)]) -> Result<AlignedDataset> {
        let Some(((first_name, first), rest)) = frames.split_first() else {
            return Err(PipelineError::Config("no frames to merge".to_string()));
        };

        let mut merged = Self::prepare(first_name, first)?;
        if merged.height() == 0 {
            return Err(PipelineError::Alignment {
                frame: first_name.clone(),
                reason: "frame has no rows".to_string(),
            });
        }
        let mut seen: HashSet<String> = frame::column_names(&merged).into_iter().collect();
        let mut sources = vec![first_name.clone()];

        for (name, df) in rest {
            let next = Self::prepare(name, df)?;
            for column in frame::column_names(&next) {
                if column != DATE_COLUMN && !seen.insert(column.clone()) {
                    return Err(PipelineError::Alignment {
                        frame: name.clone(),
                        reason: format!("column `{column}` is produced by an earlier frame"),
                    });
                }
            }

            let before = merged.height();
            merged = merged
                .lazy()
                .join(
                    next.lazy(),
                    [col(DATE_COLUMN)],
                    [col(DATE_COLUMN)],
                    JoinArgs::new(JoinType::Inner),
                )
                .collect()?;
            debug!(frame = %name, before, after = merged.height(), "joined");
            if merged.height() == 0 {
                return Err(PipelineError::Alignment {
                    frame: name.clone(),
                    reason: "no timestamps shared with the frames joined before it".to_string(),
                });
            }
            sources.push(name.clone());
        }

        let frame = frame::sort_by_date(&merged)?;
        info!(rows = frame.height(), columns = frame.width(), sources = sources.len(), "sources aligned");
        Ok(AlignedDataset { frame, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    fn hour(h: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::hours(h)
    }

    fn source(column: &str, hours: impl IntoIterator<Item = i64>) -> DataFrame {
        let dates: Vec<NaiveDateTime> = hours.into_iter().map(hour).collect();
        let values: Vec<f64> = (0..dates.len()).map(|i| i as f64).collect();
        let mut df = DataFrame::new(vec![frame::naive_date_column(&dates).unwrap()]).unwrap();
        df.with_column(Column::new(column.into(), values)).unwrap();
        df
    }

    fn named(frames: Vec<(&str, DataFrame)>) -> Vec<(String, DataFrame)> {
        frames.into_iter().map(|(n, f)| (n.to_string(), f)).collect()
    }

    #[test]
    fn test_reduce_keeps_the_intersection() {
        let frames = named(vec![
            ("consumption", source("consumption", 0..148)),
            ("market", source("KGUP_lag_48", 0..100)),
            ("solar", source("ghi", 0..100)),
            ("calendar", source("Quarter", 0..100)),
        ]);
        let aligned = MergeReducer::new().reduce(&frames).unwrap();

        assert_eq!(aligned.height(), 100);
        let dates = aligned.dates().unwrap();
        assert_eq!(dates[0], hour(0));
        assert_eq!(dates[99], hour(99));
        assert_eq!(aligned.sources(), ["consumption", "market", "solar", "calendar"]);
        assert_eq!(
            frame::column_names(aligned.frame()),
            vec!["date", "consumption", "KGUP_lag_48", "ghi", "Quarter"]
        );
    }

    #[test]
    fn test_missing_row_removes_the_timestamp() {
        let frames = named(vec![
            ("consumption", source("consumption", 0..10)),
            ("solar", source("ghi", (0..10).filter(|h| *h != 3))),
        ]);
        let aligned = MergeReducer::new().reduce(&frames).unwrap();

        assert_eq!(aligned.height(), 9);
        assert!(!aligned.dates().unwrap().contains(&hour(3)));
    }

    #[test]
    fn test_empty_join_names_the_frame() {
        let frames = named(vec![
            ("consumption", source("consumption", 0..10)),
            ("market", source("KGUP_lag_48", 0..10)),
            ("weather", source("temperature_2m_mixed", 20..30)),
        ]);
        let err = MergeReducer::new().reduce(&frames).unwrap_err();
        assert!(matches!(err, PipelineError::Alignment { ref frame, .. } if frame == "weather"));
    }

    #[test]
    fn test_column_collision_is_rejected() {
        let frames = named(vec![
            ("solar", source("ghi", 0..10)),
            ("weather", source("ghi", 0..10)),
        ]);
        let err = MergeReducer::new().reduce(&frames).unwrap_err();
        assert!(err.to_string().contains("`ghi`"));
    }

    #[test]
    fn test_zoned_frames_join_on_wall_time() {
        let tz = frame::parse_timezone("Europe/Istanbul").unwrap();
        // 21:00 UTC on the previous day is local midnight.
        let instants: Vec<DateTime<Utc>> = (0..5)
            .map(|h| Utc.from_utc_datetime(&(hour(h) - Duration::hours(3))))
            .collect();
        let mut zoned = DataFrame::new(vec![frame::zoned_date_column(&instants, tz).unwrap()]).unwrap();
        zoned.with_column(Column::new("ghi".into(), vec![1.0; 5])).unwrap();

        let frames = named(vec![
            ("consumption", source("consumption", 0..5)),
            ("solar", zoned),
        ]);
        let aligned = MergeReducer::new().reduce(&frames).unwrap();

        assert_eq!(aligned.height(), 5);
        assert_eq!(frame::timezone(aligned.frame(), "aligned").unwrap(), None);
    }

    #[test]
    fn test_repeated_hour_keeps_first() {
        let frames = named(vec![
            ("consumption", source("consumption", 0..4)),
            ("weather", source("temperature_2m_mixed", [0, 1, 1, 2, 3])),
        ]);
        let aligned = MergeReducer::new().reduce(&frames).unwrap();
        let temps = frame::float_values(aligned.frame(), "aligned", "temperature_2m_mixed").unwrap();

        assert_eq!(aligned.height(), 4);
        assert_eq!(temps, vec![Some(0.0), Some(1.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_nothing_to_merge() {
        assert!(matches!(
            MergeReducer::new().reduce(&[]),
            Err(PipelineError::Config(_))
        ));
    }
}
