//! Run configuration.
//!
//! A run is described by one JSON document. It is loaded once, validated,
//! and then passed by reference to every stage.

use crate::{
    PipelineError, Result,
    calendar::CalendarConfig,
    consumption::{ConsumptionConfig, ConsumptionFeatureSource, PreparedConsumption},
    frame,
    market::MarketConfig,
    solar::SolarConfig,
    split::OutputConfig,
    weather::{WeatherConfig, aggregate::MultiLocationWeatherAggregator},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Everything needed to assemble one feature matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Observed consumption
    pub consumption: ConsumptionConfig,
    /// Market-clearing data; the market source is skipped when absent
    #[serde(default)]
    pub market: Option<MarketConfig>,
    /// Solar geometry site
    #[serde(default)]
    pub solar: SolarConfig,
    /// Calendar grid
    #[serde(default)]
    pub calendar: CalendarConfig,
    /// Weather locations and files
    pub weather: WeatherConfig,
    /// Where the historical/forecast pair is written
    #[serde(default)]
    pub output: OutputConfig,
}

impl RunConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration without touching any input file.
    pub fn validate(&self) -> Result<()> {
        frame::parse_timezone(&self.consumption.timezone)?;
        if self.consumption.path.as_os_str().is_empty() {
            return Err(PipelineError::Config("consumption.path is empty".to_string()));
        }
        ConsumptionFeatureSource::new(PreparedConsumption::new(self.consumption.clone()))?;

        if let Some(market) = &self.market {
            market.features.validate()?;
            if market.path.as_os_str().is_empty() {
                return Err(PipelineError::Config("market.path is empty".to_string()));
            }
        }

        frame::parse_timezone(&self.solar.timezone)?;
        ordered(self.solar.start_date, self.solar.end_date)?;
        if !(self.solar.linke_turbidity.is_finite() && self.solar.linke_turbidity > 0.0) {
            return Err(PipelineError::Config(format!(
                "linke_turbidity must be positive, got {}",
                self.solar.linke_turbidity
            )));
        }

        ordered(self.calendar.start_date, self.calendar.end_date)?;
        self.calendar.rows_per_day()?;

        let weather = &self.weather;
        frame::parse_timezone(&weather.timezone)?;
        weather.historical.validate()?;
        weather.forecast.validate()?;
        if weather.locations.is_empty() {
            return Err(PipelineError::Config("weather.locations is empty".to_string()));
        }
        MultiLocationWeatherAggregator::new(weather.location_weights.clone())?;
        for location in weather.location_weights.keys() {
            if !weather.locations.contains_key(location) {
                warn!(location = %location, "weight given for a location that is not configured");
            }
        }
        Ok(())
    }
}

fn ordered(start: chrono::NaiveDateTime, end: chrono::NaiveDateTime) -> Result<()> {
    if start > end {
        return Err(PipelineError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

/// Serde adapter for configuration timestamps.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM` and `YYYY-MM-DD HH:MM:SS`
/// (a `T` separator is accepted too); writes `YYYY-MM-DD HH:MM:SS`.
pub mod config_date {
    use chrono::{NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
    const READ_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];

    /// Parse a configuration timestamp.
    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        READ_FORMATS
            .iter()
            .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
            .or_else(|| {
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .ok()
                    .map(|d| d.and_time(chrono::NaiveTime::MIN))
            })
    }

    /// Serialize as `YYYY-MM-DD HH:MM:SS`.
    pub fn serialize<S: Serializer>(
        date: &NaiveDateTime,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(WRITE_FORMAT).to_string())
    }

    /// Deserialize any of the accepted formats.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<NaiveDateTime, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse(&value).ok_or_else(|| de::Error::custom(format!("invalid date `{value}`")))
    }
}
