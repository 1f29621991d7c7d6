//! Reading and writing tabular files.
//!
//! Inputs may be CSV (with a header row) or Parquet, chosen by extension.
//! Outputs are always Parquet.

use crate::{PipelineError, Result};
use polars::prelude::*;
use std::{fs::File, path::Path};
use tracing::debug;

/// Read a CSV or Parquet file into a frame.
///
/// `frame` names the source in errors. Date columns stored as text are left
/// as strings; callers coerce them with [`crate::frame::coerce_dates`].
pub fn read_frame(path: &Path, frame: &str) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let df = match extension.as_deref() {
        Some("csv") => CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?,
        Some("parquet") => ParquetReader::new(File::open(path)?).finish()?,
        _ => {
            return Err(PipelineError::ingestion(
                frame,
                format!("unsupported file type: {}", path.display()),
            ));
        }
    };

    debug!(frame, path = %path.display(), rows = df.height(), "read input frame");
    Ok(df)
}

/// Write `df` as a Parquet file at `path`.
pub fn write_parquet(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = File::create(path)?;
    ParquetWriter::new(&mut file).finish(df)?;
    file.sync_all()?;
    Ok(())
}
