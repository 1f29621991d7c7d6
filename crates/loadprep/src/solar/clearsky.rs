//! Ineichen–Perez clear-sky irradiance.

/// Solar constant in W/m².
pub const SOLAR_CONSTANT: f64 = 1367.0;

/// Clear-sky irradiance components in W/m².
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearSky {
    /// Global horizontal irradiance
    pub ghi: f64,
    /// Direct normal irradiance
    pub dni: f64,
    /// Diffuse horizontal irradiance
    pub dhi: f64,
}

/// Extraterrestrial normal irradiance on `day_of_year`.
pub fn extraterrestrial_irradiance(day_of_year: u32) -> f64 {
    SOLAR_CONSTANT * (1.0 + 0.033 * (2.0 * std::f64::consts::PI * day_of_year as f64 / 365.0).cos())
}

/// Standard atmospheric pressure in Pa at `altitude` metres.
pub fn altitude_to_pressure(altitude: f64) -> f64 {
    101_325.0 * (1.0 - 2.25577e-5 * altitude).powf(5.25588)
}

/// Kasten–Young relative air mass for an apparent zenith in degrees.
pub fn relative_airmass(apparent_zenith: f64) -> f64 {
    1.0 / (apparent_zenith.to_radians().cos()
        + 0.50572 * (96.07995 - apparent_zenith).powf(-1.6364))
}

/// Clear-sky irradiance for a constant Linke turbidity.
///
/// Returns zeros once the sun is at or below the horizon.
pub fn ineichen(
    apparent_zenith: f64,
    altitude: f64,
    linke_turbidity: f64,
    day_of_year: u32,
) -> ClearSky {
    if apparent_zenith.is_nan() || apparent_zenith >= 90.0 {
        return ClearSky::default();
    }

    let tl = linke_turbidity;
    let dni_extra = extraterrestrial_irradiance(day_of_year);
    let airmass = relative_airmass(apparent_zenith) * altitude_to_pressure(altitude) / 101_325.0;
    let cos_zenith = apparent_zenith.to_radians().cos().max(0.0);

    let fh1 = (-altitude / 8000.0).exp();
    let fh2 = (-altitude / 1250.0).exp();
    let cg1 = 5.09e-5 * altitude + 0.868;
    let cg2 = 3.92e-5 * altitude + 0.0387;

    let ghi = (cg1 * dni_extra * cos_zenith * (-cg2 * airmass * (fh1 + fh2 * (tl - 1.0))).exp())
        .max(0.0);

    let b = 0.664 + 0.163 / fh1;
    let bnci = dni_extra * (b * (-0.09 * airmass * (tl - 1.0)).exp()).max(0.0);
    let bnci_2 = ghi
        * ((1.0 - (0.1 - 0.2 * (-tl).exp()) / (0.1 + 0.882 / fh1)) / cos_zenith).clamp(0.0, 1e20);
    let dni = bnci.min(bnci_2);
    let dhi = ghi - dni * cos_zenith;

    ClearSky { ghi, dni, dhi }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_overhead_sun_at_sea_level() {
        let sky = ineichen(0.0, 0.0, 3.0, 172);

        assert!(sky.ghi > 950.0 && sky.ghi < 1100.0, "ghi {}", sky.ghi);
        assert!(sky.dni > 0.0 && sky.dni <= sky.ghi);
        assert!(sky.dhi >= 0.0);
        assert_relative_eq!(sky.ghi, sky.dni + sky.dhi, epsilon = 1e-9);
    }

    #[rstest]
    #[case(90.0)]
    #[case(95.0)]
    #[case(f64::NAN)]
    fn test_no_irradiance_below_horizon(#[case] zenith: f64) {
        assert_eq!(ineichen(zenith, 100.0, 3.0, 10), ClearSky::default());
    }

    #[test]
    fn test_turbidity_dims_the_beam() {
        let clear = ineichen(30.0, 0.0, 2.0, 100);
        let hazy = ineichen(30.0, 0.0, 6.0, 100);
        assert!(hazy.dni < clear.dni);
        assert!(hazy.ghi < clear.ghi);
    }

    #[test]
    fn test_pressure_and_airmass() {
        assert_relative_eq!(altitude_to_pressure(0.0), 101_325.0);
        assert!(altitude_to_pressure(1000.0) < 90_000.0);
        assert_relative_eq!(relative_airmass(0.0), 1.0, epsilon = 1e-3);
        assert!(relative_airmass(80.0) > 5.0);
    }
}
