//! Great-circle distance and coordinate handling.

use serde::{Deserialize, Serialize};

use crate::constants::{CLOSE_THRESHOLD_METERS, EARTH_RADIUS_METERS, NEARBY_THRESHOLD_METERS};
use crate::error::ValidationError;

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when either component is NaN/infinite or
    /// outside `[-90, 90]` / `[-180, 180]`.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        check_component("lat", lat, 90.0)?;
        check_component("lng", lng, 180.0)?;
        Ok(Self { lat, lng })
    }

    /// Re-run range validation on a coordinate built from raw fields.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Coordinate::new`].
    pub fn validated(self) -> Result<Self, ValidationError> {
        Self::new(self.lat, self.lng)
    }

    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        distance_meters(*self, *other)
    }
}

fn check_component(field: &'static str, value: f64, bound: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite { field, value });
    }
    if !(-bound..=bound).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            min: -bound,
            max: bound,
            value,
        });
    }
    Ok(())
}

/// Haversine distance in meters. NaN inputs propagate to the result.
#[must_use]
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Sum of the distances between consecutive coordinates.
#[must_use]
pub fn path_length_meters(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|pair| distance_meters(pair[0], pair[1]))
        .sum()
}

/// Human readable distance: whole meters below a kilometer, one decimal above.
#[must_use]
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{}m", meters.round())
    } else {
        format!("{:.1}km", meters / 1_000.0)
    }
}

/// Coarse proximity bucket used for list styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceBand {
    Close,
    Medium,
    Far,
}

impl DistanceBand {
    #[must_use]
    pub fn classify(meters: f64) -> Self {
        if meters <= CLOSE_THRESHOLD_METERS {
            Self::Close
        } else if meters <= NEARBY_THRESHOLD_METERS {
            Self::Medium
        } else {
            Self::Far
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nyc() -> Coordinate {
        Coordinate::new(40.7128, -74.0060).unwrap()
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = nyc();
        assert!(distance_meters(a, a).abs() < 1e-9);
    }

    #[test]
    fn distance_is_symmetric() {
        let a = nyc();
        let b = Coordinate::new(51.5074, -0.1278).unwrap();
        assert!((distance_meters(a, b) - distance_meters(b, a)).abs() < 1e-6);
    }

    #[test]
    fn thousandth_of_longitude_in_manhattan() {
        let b = Coordinate::new(40.7128, -74.0070).unwrap();
        let d = distance_meters(nyc(), b);
        assert!((d - 84.3).abs() < 0.5, "got {d}");
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        assert!(matches!(
            Coordinate::new(91.0, 0.0),
            Err(ValidationError::OutOfRange { field: "lat", .. })
        ));
        assert!(matches!(
            Coordinate::new(0.0, -180.5),
            Err(ValidationError::OutOfRange { field: "lng", .. })
        ));
        assert!(matches!(
            Coordinate::new(f64::NAN, 0.0),
            Err(ValidationError::NonFinite { .. })
        ));
        assert!(Coordinate::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn nan_propagates_through_distance() {
        let bad = Coordinate {
            lat: f64::NAN,
            lng: 0.0,
        };
        assert!(distance_meters(bad, nyc()).is_nan());
    }

    #[test]
    fn formats_and_bands() {
        assert_eq!(format_distance(84.4), "84m");
        assert_eq!(format_distance(1_240.0), "1.2km");
        assert_eq!(DistanceBand::classify(100.0), DistanceBand::Close);
        assert_eq!(DistanceBand::classify(999.0), DistanceBand::Medium);
        assert_eq!(DistanceBand::classify(1_000.1), DistanceBand::Far);
    }

    #[test]
    fn path_length_chains_segments() {
        let a = nyc();
        let b = Coordinate::new(40.7128, -74.0070).unwrap();
        let total = path_length_meters(&[a, b, a]);
        assert!((total - 2.0 * distance_meters(a, b)).abs() < 1e-9);
        assert!(path_length_meters(&[a]).abs() < f64::EPSILON);
    }
}
