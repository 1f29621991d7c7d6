//! Core trait definitions for feature sources.
//!
//! Every producer of a time-indexed frame implements [`FeatureSource`], which
//! gives the pipeline a uniform way to generate, describe and join sources.

use crate::{Result, SourceKind};
use polars::prelude::*;

/// A source of hourly features keyed by a `date` column.
///
/// Implementations build their frame from configuration and input files.
/// The returned frame always has a `date` column of dtype `Datetime(ms)`,
/// sorted ascending; the reducer takes care of timezone normalisation.
pub trait FeatureSource: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source.
    ///
    /// Used in logs and in error messages naming the frame that failed.
    fn name(&self) -> &str;

    /// Human-readable description of what this source contributes.
    fn description(&self) -> &str;

    /// Source kind for grouping and introspection.
    fn kind(&self) -> SourceKind;

    /// Columns the source reads from its input, besides `date`.
    ///
    /// Empty for sources that are fully generated from configuration.
    fn required_columns(&self) -> Vec<String>;

    /// Produce the source frame.
    fn generate(&self) -> Result<DataFrame>;
}

/// Marker trait for source configuration types.
///
/// All config types should implement Default, Clone, Send, Sync, and Debug.
pub trait SourceConfig: Default + Clone + Send + Sync + std::fmt::Debug {}

/// A source that is built entirely from a configuration value.
pub trait ConfigurableSource: FeatureSource {
    /// Configuration type for this source.
    type Config: SourceConfig;

    /// Create a new source with the given configuration.
    fn with_config(config: Self::Config) -> Self;

    /// Returns the current configuration.
    fn config(&self) -> &Self::Config;
}

/// Blanket implementation for any type that satisfies the trait bounds.
impl<T: Default + Clone + Send + Sync + std::fmt::Debug> SourceConfig for T {}
