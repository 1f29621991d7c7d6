//! WMO weather interpretation codes.

/// Code, label and severity (0 = clear, 10 = thunderstorm).
const WMO_CODES: &[(i64, &str, i32)] = &[
    (0, "Clear sky", 0),
    (1, "Mainly clear", 0),
    (2, "Partly cloudy", 1),
    (3, "Overcast", 1),
    (45, "Fog", 2),
    (48, "Depositing rime fog", 2),
    (51, "Drizzle: Light", 3),
    (53, "Drizzle: Moderate", 3),
    (55, "Drizzle: Dense intensity", 3),
    (56, "Freezing Drizzle: Light", 4),
    (57, "Freezing Drizzle: Dense intensity", 4),
    (61, "Rain: Slight", 5),
    (63, "Rain: Moderate", 5),
    (65, "Rain: Heavy intensity", 5),
    (66, "Freezing Rain: Light", 6),
    (67, "Freezing Rain: Heavy intensity", 6),
    (71, "Snow fall: Slight", 7),
    (73, "Snow fall: Moderate", 7),
    (75, "Snow fall: Heavy intensity", 7),
    (77, "Snow grains", 7),
    (80, "Rain showers: Slight", 8),
    (81, "Rain showers: Moderate", 8),
    (82, "Rain showers: Violent", 8),
    (85, "Snow showers: Slight", 9),
    (86, "Snow showers: Heavy", 9),
    (95, "Thunderstorm: Slight or moderate", 10),
    (96, "Thunderstorm with slight hail", 10),
    (99, "Thunderstorm with heavy hail", 10),
];

/// Label and severity for a code, if it is a known integral WMO code.
pub fn describe(code: f64) -> Option<(&'static str, i32)> {
    if code.fract() != 0.0 {
        return None;
    }
    let code = code as i64;
    WMO_CODES
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, label, severity)| (*label, *severity))
}
