//! Derived weather indices.

use crate::buckets::WIND_DIRECTION;

/// Base temperature in °C for degree days.
pub const BASE_TEMPERATURE: f64 = 18.0;

/// Number of quantile buckets for temperature and humidity levels.
pub const LEVELS: usize = 10;

/// Heating degrees below the base temperature.
pub fn heating_degrees(temperature: f64) -> f64 {
    (BASE_TEMPERATURE - temperature).max(0.0)
}

/// Cooling degrees above the base temperature.
pub fn cooling_degrees(temperature: f64) -> f64 {
    (temperature - BASE_TEMPERATURE).max(0.0)
}

/// Wind chill from temperature (°C) and wind speed (km/h).
pub fn wind_chill(temperature: f64, wind_speed: f64) -> f64 {
    let v = wind_speed.powf(0.16);
    13.12 + 0.6215 * temperature - 11.37 * v + 0.3965 * temperature * v
}

/// Rothfusz heat index; below 27 degrees the temperature itself.
///
/// The regression is applied to the raw inputs without unit conversion.
pub fn heat_index(temperature: f64, humidity: f64) -> f64 {
    if temperature < 27.0 {
        return temperature;
    }
    let (t, rh) = (temperature, humidity);
    -42.379 + 2.04901523 * t + 10.14333127 * rh
        - 0.22475541 * t * rh
        - 6.83783e-3 * t * t
        - 5.481717e-2 * rh * rh
        + 1.22874e-3 * t * t * rh
        + 8.5282e-4 * t * rh * rh
        - 1.99e-6 * t * t * rh * rh
}

/// Compass point for a wind direction in degrees, any multiple of 360 apart.
pub fn compass(degrees: f64) -> Option<&'static str> {
    WIND_DIRECTION.label(degrees.rem_euclid(360.0))
}

/// Equal-count level labels `{prefix}_level_1 ..= {prefix}_level_10`.
///
/// Values are ranked with ties broken by position, then the ranks are cut at
/// the deciles of `1..=n`. Nulls stay null. The cut points come from the
/// whole slice, so a label depends on every value passed in.
pub fn level_labels(values: &[Option<f64>], prefix: &str) -> Vec<Option<String>> {
    let mut order: Vec<(usize, f64)> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.filter(|v| !v.is_nan()).map(|v| (i, v)))
        .collect();
    order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let n = order.len();
    let edges: Vec<f64> = (1..=LEVELS)
        .map(|k| 1.0 + (n.saturating_sub(1)) as f64 * k as f64 / LEVELS as f64)
        .collect();

    let mut labels = vec![None; values.len()];
    for (rank0, (index, _)) in order.iter().enumerate() {
        let rank = (rank0 + 1) as f64;
        let level = edges
            .iter()
            .position(|edge| rank <= *edge + 1e-9)
            .map_or(LEVELS, |p| p + 1);
        labels[*index] = Some(format!("{prefix}_level_{level}"));
    }
    labels
}
