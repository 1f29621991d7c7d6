//! Ordered bucket tables mapping continuous values to labels.
//!
//! Each row carries its own boundary convention, so tables whose first or
//! last row closes differently from the rest are expressed directly instead
//! of through special cases in the caller.

use polars::prelude::*;

/// Whether a bucket boundary includes its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// Endpoint excluded
    Open,
    /// Endpoint included
    Closed,
}

/// One labelled interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Convention at `lower`
    pub lower_edge: Edge,
    /// Convention at `upper`
    pub upper_edge: Edge,
    /// Label assigned to values inside the interval
    pub label: &'static str,
}

impl Bucket {
    /// `[lower, upper)`
    pub const fn left_closed(lower: f64, upper: f64, label: &'static str) -> Self {
        Self {
            lower,
            upper,
            lower_edge: Edge::Closed,
            upper_edge: Edge::Open,
            label,
        }
    }

    /// `(lower, upper]`
    pub const fn right_closed(lower: f64, upper: f64, label: &'static str) -> Self {
        Self {
            lower,
            upper,
            lower_edge: Edge::Open,
            upper_edge: Edge::Closed,
            label,
        }
    }

    /// `[lower, upper]`
    pub const fn closed(lower: f64, upper: f64, label: &'static str) -> Self {
        Self {
            lower,
            upper,
            lower_edge: Edge::Closed,
            upper_edge: Edge::Closed,
            label,
        }
    }

    /// Whether `value` falls inside the interval.
    pub fn contains(&self, value: f64) -> bool {
        let above = match self.lower_edge {
            Edge::Open => value > self.lower,
            Edge::Closed => value >= self.lower,
        };
        let below = match self.upper_edge {
            Edge::Open => value < self.upper,
            Edge::Closed => value <= self.upper,
        };
        above && below
    }
}

/// An ordered list of buckets; the first match wins.
#[derive(Debug, Clone, Copy)]
pub struct BucketTable {
    name: &'static str,
    buckets: &'static [Bucket],
}

impl BucketTable {
    /// Create a table.
    pub const fn new(name: &'static str, buckets: &'static [Bucket]) -> Self {
        Self { name, buckets }
    }

    /// Table name, used as the output column name.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Rows of the table.
    pub const fn buckets(&self) -> &'static [Bucket] {
        self.buckets
    }

    /// Label for `value`, or `None` when no row matches (including NaN).
    pub fn label(&self, value: f64) -> Option<&'static str> {
        self.buckets
            .iter()
            .find(|b| b.contains(value))
            .map(|b| b.label)
    }

    /// Labels for a column of optional values; nulls stay null.
    pub fn labels(&self, values: &[Option<f64>]) -> Vec<Option<&'static str>> {
        values
            .iter()
            .map(|v| v.and_then(|v| self.label(v)))
            .collect()
    }

    /// Labels as a string column named after the table.
    pub fn label_column(&self, values: &[Option<f64>]) -> Column {
        Column::from(Series::new(self.name.into(), self.labels(values)))
    }
}

/// Part of day from the apparent zenith angle.
pub const SUN_POSITION: BucketTable = BucketTable::new(
    "sun_position",
    &[
        Bucket::left_closed(0.0, 30.0, "Morning"),
        Bucket::left_closed(30.0, 60.0, "Midday"),
        Bucket::left_closed(60.0, 90.0, "Afternoon"),
        Bucket::left_closed(90.0, 180.0, "Night"),
    ],
);

/// Compass octant from the solar azimuth.
///
/// The last bucket is closed, so an azimuth of exactly 360 is `North`.
pub const AZIMUTH_DIRECTION: BucketTable = BucketTable::new(
    "azimuth_direction",
    &[
        Bucket::left_closed(0.0, 22.5, "North"),
        Bucket::left_closed(22.5, 67.5, "North-East"),
        Bucket::left_closed(67.5, 112.5, "East"),
        Bucket::left_closed(112.5, 157.5, "South-East"),
        Bucket::left_closed(157.5, 202.5, "South"),
        Bucket::left_closed(202.5, 247.5, "South-West"),
        Bucket::left_closed(247.5, 292.5, "West"),
        Bucket::left_closed(292.5, 337.5, "North-West"),
        Bucket::closed(337.5, 360.0, "North"),
    ],
);

/// Elevation level of the sun.
pub const ELEVATION_CATEGORY: BucketTable = BucketTable::new(
    "elevation_category",
    &[
        Bucket::closed(-90.0, 0.0, "Night"),
        Bucket::right_closed(0.0, 30.0, "Low"),
        Bucket::right_closed(30.0, 60.0, "Medium"),
        Bucket::right_closed(60.0, 90.0, "High"),
    ],
);

/// Sign of the equation of time, in minutes.
pub const EQUATION_OF_TIME_CATEGORY: BucketTable = BucketTable::new(
    "equation_of_time_category",
    &[
        Bucket::right_closed(f64::NEG_INFINITY, -1.0, "Negative"),
        Bucket::right_closed(-1.0, 1.0, "Neutral"),
        Bucket::right_closed(1.0, f64::INFINITY, "Positive"),
    ],
);

/// Compass point from a wind direction already reduced to `[0, 360)`.
pub const WIND_DIRECTION: BucketTable = BucketTable::new(
    "wind_direction_10m",
    &[
        Bucket::left_closed(0.0, 22.5, "N"),
        Bucket::left_closed(22.5, 67.5, "NE"),
        Bucket::left_closed(67.5, 112.5, "E"),
        Bucket::left_closed(112.5, 157.5, "SE"),
        Bucket::left_closed(157.5, 202.5, "S"),
        Bucket::left_closed(202.5, 247.5, "SW"),
        Bucket::left_closed(247.5, 292.5, "W"),
        Bucket::left_closed(292.5, 337.5, "NW"),
        Bucket::left_closed(337.5, 360.0, "N"),
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, Some("Morning"))]
    #[case(29.999, Some("Morning"))]
    #[case(30.0, Some("Midday"))]
    #[case(60.0, Some("Afternoon"))]
    #[case(89.9, Some("Afternoon"))]
    #[case(90.0, Some("Night"))]
    #[case(179.9, Some("Night"))]
    #[case(180.0, None)]
    #[case(-0.1, None)]
    fn test_sun_position(#[case] zenith: f64, #[case] expected: Option<&str>) {
        assert_eq!(SUN_POSITION.label(zenith), expected);
    }

    #[rstest]
    #[case(0.0, Some("North"))]
    #[case(22.5, Some("North-East"))]
    #[case(90.0, Some("East"))]
    #[case(180.0, Some("South"))]
    #[case(292.5, Some("North-West"))]
    #[case(337.5, Some("North"))]
    #[case(360.0, Some("North"))]
    #[case(360.1, None)]
    fn test_azimuth_direction(#[case] azimuth: f64, #[case] expected: Option<&str>) {
        assert_eq!(AZIMUTH_DIRECTION.label(azimuth), expected);
    }

    #[rstest]
    #[case(-90.0, Some("Night"))]
    #[case(0.0, Some("Night"))]
    #[case(0.1, Some("Low"))]
    #[case(30.0, Some("Low"))]
    #[case(30.1, Some("Medium"))]
    #[case(60.0, Some("Medium"))]
    #[case(90.0, Some("High"))]
    #[case(-90.1, None)]
    fn test_elevation_category(#[case] elevation: f64, #[case] expected: Option<&str>) {
        assert_eq!(ELEVATION_CATEGORY.label(elevation), expected);
    }

    #[rstest]
    #[case(-15.0, Some("Negative"))]
    #[case(-1.0, Some("Negative"))]
    #[case(-0.5, Some("Neutral"))]
    #[case(1.0, Some("Neutral"))]
    #[case(1.01, Some("Positive"))]
    #[case(16.0, Some("Positive"))]
    fn test_equation_of_time_category(#[case] minutes: f64, #[case] expected: Option<&str>) {
        assert_eq!(EQUATION_OF_TIME_CATEGORY.label(minutes), expected);
    }

    #[rstest]
    #[case(0.0, "N")]
    #[case(22.4, "N")]
    #[case(22.5, "NE")]
    #[case(135.0, "SE")]
    #[case(202.5, "SW")]
    #[case(337.4, "NW")]
    #[case(337.5, "N")]
    #[case(359.9, "N")]
    fn test_wind_direction(#[case] degrees: f64, #[case] expected: &str) {
        assert_eq!(WIND_DIRECTION.label(degrees), Some(expected));
    }

    #[test]
    fn test_nan_and_null_have_no_label() {
        assert_eq!(SUN_POSITION.label(f64::NAN), None);
        assert_eq!(
            ELEVATION_CATEGORY.labels(&[None, Some(45.0)]),
            vec![None, Some("Medium")]
        );
    }
}
