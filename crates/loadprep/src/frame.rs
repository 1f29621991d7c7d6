//! Helpers for time-series frames keyed by a `date` column.
//!
//! Every frame that flows through the pipeline is a polars [`DataFrame`] whose
//! `date` column holds hourly timestamps as `Datetime(ms)`. Generators that
//! work in a geographic timezone emit a timezone-aware column; everything
//! else is naive wall-clock time. The functions here convert between the two
//! and pull typed values out of frames.

use crate::{PipelineError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::warn;

/// Name of the key column shared by every frame.
pub const DATE_COLUMN: &str = "date";

/// Formats tried, in order, when parsing naive date strings.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Parse an IANA timezone name such as `Europe/Istanbul`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| PipelineError::Config(format!("unknown timezone `{name}`: {e}")))
}

/// Build a naive millisecond `date` column from wall-clock timestamps.
pub fn naive_date_column(dates: &[NaiveDateTime]) -> Result<Column> {
    let millis: Vec<i64> = dates
        .iter()
        .map(|d| d.and_utc().timestamp_millis())
        .collect();
    let series = Series::new(DATE_COLUMN.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    Ok(Column::from(series))
}

/// Build a timezone-aware millisecond `date` column from UTC instants.
pub fn zoned_date_column(instants: &[DateTime<Utc>], tz: Tz) -> Result<Column> {
    let millis: Vec<i64> = instants.iter().map(|d| d.timestamp_millis()).collect();
    let series = Series::new(DATE_COLUMN.into(), millis).cast(&DataType::Datetime(
        TimeUnit::Milliseconds,
        Some(tz.name().into()),
    ))?;
    Ok(Column::from(series))
}

/// Check that every named column is present.
pub fn require_columns(df: &DataFrame, frame: &str, columns: &[&str]) -> Result<()> {
    let present: HashSet<String> = column_names(df).into_iter().collect();
    match columns.iter().find(|c| !present.contains(**c)) {
        Some(missing) => Err(PipelineError::missing_column(frame, *missing)),
        None => Ok(()),
    }
}

/// Column names in frame order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// Whether a dtype is an integer or floating-point number.
pub const fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Values of a column cast to `f64`.
pub fn float_values(df: &DataFrame, frame: &str, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(frame, name))?;
    let values = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(values.f64()?.into_iter().collect())
}

/// Values of a column cast to strings.
pub fn string_values(df: &DataFrame, frame: &str, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| PipelineError::missing_column(frame, name))?;
    let values = column.as_materialized_series().cast(&DataType::String)?;
    Ok(values
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_owned))
        .collect())
}

/// UTC instants stored in the `date` column and the column's timezone.
///
/// For a naive column the stored wall-clock values are returned as if they
/// were UTC, and the timezone is `None`.
fn physical_dates(df: &DataFrame, frame: &str) -> Result<(Vec<DateTime<Utc>>, Option<Tz>)> {
    let column = df
        .column(DATE_COLUMN)
        .map_err(|_| PipelineError::missing_column(frame, DATE_COLUMN))?;
    let (unit, zone) = match column.dtype() {
        DataType::Datetime(unit, zone) => (*unit, zone.clone()),
        other => {
            return Err(PipelineError::ingestion(
                frame,
                format!("`{DATE_COLUMN}` has dtype {other}, expected a datetime"),
            ));
        }
    };
    let zone = zone.map(|z| parse_timezone(z.as_str())).transpose()?;

    let raw = column.as_materialized_series().cast(&DataType::Int64)?;
    let mut instants = Vec::with_capacity(raw.len());
    for (row, value) in raw.i64()?.into_iter().enumerate() {
        let value = value
            .ok_or_else(|| PipelineError::ingestion(frame, format!("null date at row {row}")))?;
        let instant = match unit {
            TimeUnit::Milliseconds => DateTime::<Utc>::from_timestamp_millis(value),
            TimeUnit::Microseconds => DateTime::<Utc>::from_timestamp_micros(value),
            TimeUnit::Nanoseconds => Some(DateTime::<Utc>::from_timestamp_nanos(value)),
        }
        .ok_or_else(|| {
            PipelineError::ingestion(frame, format!("date out of range at row {row}"))
        })?;
        instants.push(instant);
    }
    Ok((instants, zone))
}

/// Timezone of the `date` column, if it is timezone-aware.
pub fn timezone(df: &DataFrame, frame: &str) -> Result<Option<Tz>> {
    let column = df
        .column(DATE_COLUMN)
        .map_err(|_| PipelineError::missing_column(frame, DATE_COLUMN))?;
    match column.dtype() {
        DataType::Datetime(_, Some(zone)) => parse_timezone(zone.as_str()).map(Some),
        DataType::Datetime(_, None) => Ok(None),
        other => Err(PipelineError::ingestion(
            frame,
            format!("`{DATE_COLUMN}` has dtype {other}, expected a datetime"),
        )),
    }
}

/// Wall-clock timestamps of the `date` column.
///
/// Timezone-aware values are converted to local time in their zone.
pub fn read_dates(df: &DataFrame, frame: &str) -> Result<Vec<NaiveDateTime>> {
    let (instants, zone) = physical_dates(df, frame)?;
    Ok(match zone {
        Some(tz) => instants
            .iter()
            .map(|i| i.with_timezone(&tz).naive_local())
            .collect(),
        None => instants.iter().map(DateTime::naive_utc).collect(),
    })
}

/// Instants of the `date` column expressed in `tz`.
///
/// Naive values are interpreted as wall-clock time in `tz`; a wall-clock
/// time that does not exist there (spring-forward gap) is an ingestion
/// error, an ambiguous one resolves to the earlier instant.
pub fn read_instants(df: &DataFrame, frame: &str, tz: Tz) -> Result<Vec<DateTime<Tz>>> {
    let (instants, zone) = physical_dates(df, frame)?;
    if zone.is_some() {
        return Ok(instants.iter().map(|i| i.with_timezone(&tz)).collect());
    }
    instants
        .iter()
        .map(|i| {
            let wall = i.naive_utc();
            tz.from_local_datetime(&wall).earliest().ok_or_else(|| {
                PipelineError::ingestion(frame, format!("{wall} does not exist in {tz}"))
            })
        })
        .collect()
}

/// Replace the `date` column with naive local wall-clock time.
///
/// Timezone-aware and naive columns never join, so every frame passes
/// through here before alignment. The result is always `Datetime(ms)`.
pub fn strip_timezone(df: &DataFrame, frame: &str) -> Result<DataFrame> {
    let dates = read_dates(df, frame)?;
    let mut out = df.clone();
    out.with_column(naive_date_column(&dates)?)?;
    Ok(out)
}

/// Like [`strip_timezone`], but timezone-aware values are first converted to
/// `tz`. Naive columns are taken to already be wall time in `tz`.
pub fn wall_time_in(df: &DataFrame, frame: &str, tz: Tz) -> Result<DataFrame> {
    if timezone(df, frame)?.is_none() {
        return Ok(df.clone());
    }
    let dates: Vec<NaiveDateTime> = read_instants(df, frame, tz)?
        .iter()
        .map(DateTime::naive_local)
        .collect();
    let mut out = df.clone();
    out.with_column(naive_date_column(&dates)?)?;
    Ok(out)
}

/// Sort a frame ascending by `date`.
pub fn sort_by_date(df: &DataFrame) -> Result<DataFrame> {
    Ok(df.sort([DATE_COLUMN], SortMultipleOptions::default())?)
}

/// Drop repeated timestamps, keeping the first occurrence.
pub fn dedupe_dates(df: &DataFrame, frame: &str) -> Result<DataFrame> {
    let dates = read_dates(df, frame)?;
    let mut seen = HashSet::with_capacity(dates.len());
    let keep: Vec<bool> = dates.iter().map(|d| seen.insert(*d)).collect();
    let dropped = keep.iter().filter(|k| !**k).count();
    if dropped == 0 {
        return Ok(df.clone());
    }
    warn!(frame, dropped, "duplicate timestamps dropped, first occurrence kept");
    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Ensure the `date` column is a datetime, parsing strings if needed.
///
/// With an explicit `format` every value must match it. Without one, values
/// carrying a UTC offset (RFC 3339) become UTC instants in a timezone-aware
/// column; anything else is parsed as naive wall-clock time.
pub fn coerce_dates(df: &DataFrame, frame: &str, format: Option<&str>) -> Result<DataFrame> {
    let column = df
        .column(DATE_COLUMN)
        .map_err(|_| PipelineError::missing_column(frame, DATE_COLUMN))?;
    match column.dtype() {
        DataType::Datetime(_, _) => return Ok(df.clone()),
        DataType::String => {}
        other => {
            return Err(PipelineError::ingestion(
                frame,
                format!("`{DATE_COLUMN}` has dtype {other}, expected strings or datetimes"),
            ));
        }
    }

    let values = string_values(df, frame, DATE_COLUMN)?;
    let offset_aware = format.is_none()
        && values
            .iter()
            .flatten()
            .next()
            .is_some_and(|v| DateTime::parse_from_rfc3339(v).is_ok());

    let column = if offset_aware {
        let instants = values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                let value = value.as_deref().ok_or_else(|| null_date(frame, row))?;
                DateTime::parse_from_rfc3339(value)
                    .map(|d| d.with_timezone(&Utc))
                    .map_err(|e| unparsable(frame, row, value, &e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        zoned_date_column(&instants, Tz::UTC)?
    } else {
        let dates = values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                let value = value.as_deref().ok_or_else(|| null_date(frame, row))?;
                parse_naive(value, format)
                    .ok_or_else(|| unparsable(frame, row, value, "no matching format"))
            })
            .collect::<Result<Vec<_>>>()?;
        naive_date_column(&dates)?
    };

    let mut out = df.clone();
    out.with_column(column)?;
    Ok(out)
}

fn parse_naive(value: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    match format {
        Some(format) => NaiveDateTime::parse_from_str(value, format).ok(),
        None => NAIVE_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }),
    }
}

fn null_date(frame: &str, row: usize) -> PipelineError {
    PipelineError::ingestion(frame, format!("null date at row {row}"))
}

fn unparsable(frame: &str, row: usize, value: &str, reason: &str) -> PipelineError {
    PipelineError::ingestion(frame, format!("cannot parse date `{value}` at row {row}: {reason}"))
}
