//! Source registry for the ordered set of frames joined in a run.
//!
//! Unlike a lookup table, the registry preserves insertion order: the
//! reducer joins frames in exactly the order sources were registered.

use crate::{FeatureSource, PipelineError, Result};
use derive_more::Display;
use polars::prelude::*;
use std::sync::Arc;
use tracing::info;

/// Source kind for grouping related sources.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Consumption - the target series and features derived from it
    Consumption,
    /// Market - day-ahead market clearing data
    Market,
    /// Solar - sun geometry and clear-sky irradiance
    Solar,
    /// Calendar - datetime parts and holidays
    Calendar,
    /// Weather - per-location and mixed weather features
    Weather,
}

/// Metadata for source introspection.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Source name (unique identifier)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Source kind
    pub kind: SourceKind,
    /// Required input columns
    pub required_columns: Vec<String>,
}

/// Ordered collection of the sources taking part in a run.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn FeatureSource>>,
}

impl SourceRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source.
    ///
    /// Names must be unique; registering a duplicate is a config error.
    pub fn register(&mut self, source: Arc<dyn FeatureSource>) -> Result<()> {
        if self.get(source.name()).is_some() {
            return Err(PipelineError::Config(format!(
                "source `{}` registered twice",
                source.name()
            )));
        }
        self.sources.push(source);
        Ok(())
    }

    /// Get a source by name.
    pub fn get(&self, name: &str) -> Option<&dyn FeatureSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Get sources by kind, in registration order.
    pub fn by_kind(&self, kind: SourceKind) -> Vec<&dyn FeatureSource> {
        self.sources
            .iter()
            .filter(|s| s.kind() == kind)
            .map(|s| s.as_ref())
            .collect()
    }

    /// Get all source metadata, in registration order.
    pub fn all_info(&self) -> Vec<SourceInfo> {
        self.sources
            .iter()
            .map(|s| SourceInfo {
                name: s.name().to_string(),
                description: s.description().to_string(),
                kind: s.kind(),
                required_columns: s.required_columns(),
            })
            .collect()
    }

    /// Get all source names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Generate every source, in registration order.
    ///
    /// Returns `(name, frame)` pairs ready for the reducer. The first failing
    /// source aborts the run.
    pub fn generate_all(&self) -> Result<Vec<(String, DataFrame)>> {
        if self.sources.is_empty() {
            return Err(PipelineError::Config("no sources registered".to_string()));
        }
        self.sources
            .iter()
            .map(|source| {
                let frame = source.generate()?;
                info!(
                    source = source.name(),
                    kind = %source.kind(),
                    rows = frame.height(),
                    columns = frame.width(),
                    "source generated"
                );
                Ok((source.name().to_string(), frame))
            })
            .collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
