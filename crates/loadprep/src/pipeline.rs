//! Run orchestration.
//!
//! One run is a straight chain: generate every source, inner-join them,
//! split off the forecast horizon, write the artifact pair. Any failure
//! aborts the run before anything is written.

use crate::{
    Result,
    calendar::CalendarFeatureGenerator,
    config::RunConfig,
    consumption::{ConsumptionFeatureSource, ConsumptionSource, PreparedConsumption},
    market::MarketSource,
    merge::{AlignedDataset, MergeReducer},
    registry::SourceRegistry,
    solar::SolarFeatureGenerator,
    split::{ArtifactLayout, HistoricalForecastPartition, HistoricalForecastSplitter},
    traits::ConfigurableSource,
    weather::WeatherSource,
};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::info;

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Sources joined, in join order
    pub sources: Vec<String>,
    /// Rows in the aligned dataset
    pub aligned_rows: usize,
    /// Columns in the aligned dataset, `date` included
    pub columns: usize,
    /// Rows written to the historical file
    pub historical_rows: usize,
    /// Rows written to the forecast file
    pub forecast_rows: usize,
    /// Paths of the written pair
    pub layout: ArtifactLayout,
}

/// A configured feature pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    config: &'a RunConfig,
}

impl<'a> Pipeline<'a> {
    /// Pipeline over a validated configuration.
    pub const fn new(config: &'a RunConfig) -> Self {
        Self { config }
    }

    /// Sources in join order: consumption, consumption features, market,
    /// solar, calendar, weather. Unconfigured optional sources are skipped.
    pub fn build_registry(&self) -> Result<SourceRegistry> {
        let config = self.config;
        let mut registry = SourceRegistry::new();
        let consumption = PreparedConsumption::new(config.consumption.clone());
        registry.register(Arc::new(ConsumptionSource::from_prepared(consumption.clone())))?;
        if let Some(features) = ConsumptionFeatureSource::new(consumption)? {
            registry.register(Arc::new(features))?;
        }
        if let Some(market) = &config.market {
            registry.register(Arc::new(MarketSource::with_config(market.clone())))?;
        }
        registry.register(Arc::new(SolarFeatureGenerator::with_config(
            config.solar.clone(),
        )))?;
        registry.register(Arc::new(CalendarFeatureGenerator::with_config(
            config.calendar.clone(),
        )))?;
        registry.register(Arc::new(WeatherSource::new(config.weather.clone())))?;
        Ok(registry)
    }

    /// Generate and join every source.
    pub fn align(&self) -> Result<AlignedDataset> {
        let registry = self.build_registry()?;
        info!(sources = ?registry.names(), "generating sources");
        let frames = registry.generate_all()?;
        MergeReducer::new().reduce(&frames)
    }

    /// Generate, join and split, without writing anything.
    pub fn partition(&self) -> Result<(AlignedDataset, HistoricalForecastPartition)> {
        let aligned = self.align()?;
        let partition = HistoricalForecastSplitter::new().split(aligned.frame())?;
        Ok((aligned, partition))
    }

    /// Full run; artifact names carry `run_time`.
    pub fn run(&self, run_time: NaiveDateTime) -> Result<RunReport> {
        self.config.validate()?;
        let (aligned, partition) = self.partition()?;
        let layout = ArtifactLayout::resolve(&self.config.output, run_time);
        partition.persist(&layout)?;

        let report = RunReport {
            sources: aligned.sources().to_vec(),
            aligned_rows: aligned.height(),
            columns: aligned.frame().width(),
            historical_rows: partition.historical().height(),
            forecast_rows: partition.forecast().height(),
            layout,
        };
        info!(
            rows = report.aligned_rows,
            columns = report.columns,
            historical = report.historical_rows,
            forecast = report.forecast_rows,
            "run complete"
        );
        Ok(report)
    }
}
