#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/loadprep/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod buckets;
pub mod calendar;
pub mod config;
pub mod consumption;
pub mod error;
pub mod features;
pub mod frame;
pub mod grid;
pub mod io;
pub mod market;
pub mod merge;
pub mod pipeline;
pub mod registry;
pub mod solar;
pub mod split;
pub mod traits;
pub mod weather;

// Re-export core types
pub use config::RunConfig;
pub use error::{PipelineError, Result};
pub use features::{AggregateFn, FeatureSpec, LagWindowFeatureGenerator};
pub use grid::TimeGridBuilder;
pub use merge::{AlignedDataset, MergeReducer};
pub use pipeline::{Pipeline, RunReport};
pub use registry::{SourceInfo, SourceKind, SourceRegistry};
pub use split::{ArtifactLayout, HistoricalForecastPartition, HistoricalForecastSplitter};
pub use traits::{ConfigurableSource, FeatureSource, SourceConfig};

/// Hours between the last observed consumption and the end of the forecast.
///
/// Every source that extends a frame past the observed data, and the final
/// split, uses this value.
pub const FORECAST_HORIZON: usize = 48;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
