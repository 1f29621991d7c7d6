//! Solar position from the NOAA fractional-year equations.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::f64::consts::PI;

/// Sun angles at one instant, in degrees (equation of time in minutes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarPosition {
    /// Geometric zenith angle
    pub zenith: f64,
    /// Zenith angle corrected for atmospheric refraction
    pub apparent_zenith: f64,
    /// Geometric elevation above the horizon
    pub elevation: f64,
    /// Elevation corrected for atmospheric refraction
    pub apparent_elevation: f64,
    /// Azimuth clockwise from north
    pub azimuth: f64,
    /// Equation of time in minutes
    pub equation_of_time: f64,
}

fn days_in_year(year: i32) -> f64 {
    let leap = NaiveDate::from_ymd_opt(year, 2, 29).is_some();
    if leap { 366.0 } else { 365.0 }
}

/// Sun position seen from `(latitude, longitude)` at `instant`.
pub fn solar_position(instant: DateTime<Utc>, latitude: f64, longitude: f64) -> SolarPosition {
    let hours = instant.hour() as f64
        + instant.minute() as f64 / 60.0
        + instant.second() as f64 / 3600.0;
    let gamma = 2.0 * PI / days_in_year(instant.year())
        * (instant.ordinal() as f64 - 1.0 + (hours - 12.0) / 24.0);

    let equation_of_time = 229.18
        * (0.000075 + 0.001868 * gamma.cos()
            - 0.032077 * gamma.sin()
            - 0.014615 * (2.0 * gamma).cos()
            - 0.040849 * (2.0 * gamma).sin());
    let declination = 0.006918 - 0.399912 * gamma.cos() + 0.070257 * gamma.sin()
        - 0.006758 * (2.0 * gamma).cos()
        + 0.000907 * (2.0 * gamma).sin()
        - 0.002697 * (3.0 * gamma).cos()
        + 0.00148 * (3.0 * gamma).sin();

    // True solar time in minutes; the instant is already UTC.
    let true_solar_time = hours * 60.0 + equation_of_time + 4.0 * longitude;
    let hour_angle = (true_solar_time / 4.0 - 180.0).to_radians();
    let phi = latitude.to_radians();

    let cos_zenith = (phi.sin() * declination.sin()
        + phi.cos() * declination.cos() * hour_angle.cos())
    .clamp(-1.0, 1.0);
    let zenith = cos_zenith.acos().to_degrees();
    let elevation = 90.0 - zenith;

    let azimuth = (hour_angle.sin().atan2(
        hour_angle.cos() * phi.sin() - declination.tan() * phi.cos(),
    ))
    .to_degrees()
        + 180.0;

    let apparent_elevation = elevation + refraction(elevation);
    SolarPosition {
        zenith,
        apparent_zenith: 90.0 - apparent_elevation,
        elevation,
        apparent_elevation,
        azimuth: azimuth.rem_euclid(360.0),
        equation_of_time,
    }
}

/// Atmospheric refraction correction in degrees for a geometric elevation.
pub fn refraction(elevation: f64) -> f64 {
    let arcseconds = if elevation > 85.0 {
        0.0
    } else if elevation > 5.0 {
        let t = elevation.to_radians().tan();
        58.1 / t - 0.07 / t.powi(3) + 0.000086 / t.powi(5)
    } else if elevation > -0.575 {
        1735.0
            + elevation
                * (-518.2 + elevation * (103.4 + elevation * (-12.79 + elevation * 0.711)))
    } else {
        -20.772 / elevation.to_radians().tan()
    };
    arcseconds / 3600.0
}
