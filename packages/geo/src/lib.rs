#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate conversion, great-circle distance, and radius filtering.
//!
//! The Oakland 311 dataset reports request locations as Web Mercator
//! (EPSG:3857) meters in its `srx`/`sry` columns. This crate converts
//! those to WGS84 latitude/longitude, measures Haversine distances
//! between points, and hides records outside a center/radius circle.

use dump_map_models::ServiceRequest;
use thiserror::Error;

/// Web Mercator sphere radius in meters, also used as the Haversine
/// Earth radius so distances agree with the projection.
pub const EARTH_RADIUS_METERS: f64 = 6_378_137.0;

/// Errors from geometry operations.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A coordinate component was not a finite number.
    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate {
        /// Description of what went wrong.
        message: String,
    },
}

fn require_finite(point: (f64, f64), label: &str) -> Result<(), GeoError> {
    if point.0.is_finite() && point.1.is_finite() {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate {
            message: format!("{label} must be finite, got ({}, {})", point.0, point.1),
        })
    }
}

/// Converts Web Mercator (EPSG:3857) coordinates to WGS84 `(lat, lon)`
/// degrees.
///
/// Pure and total: any finite meters input maps to a latitude in
/// `[-90, 90]` and a longitude proportional to `x`.
#[must_use]
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon_rad = x / EARTH_RADIUS_METERS;
    let lat_rad = 2.0 * (y / EARTH_RADIUS_METERS).exp().atan() - std::f64::consts::FRAC_PI_2;

    (lat_rad.to_degrees(), lon_rad.to_degrees())
}

/// Great-circle distance in kilometers between two `(lat, lon)` degree
/// points, via the Haversine formula.
///
/// Returns `0.0` for coincident points and stays stable for antipodal
/// ones (the `1 - a` term is clamped at zero before the square root).
///
/// # Errors
///
/// Returns [`GeoError::InvalidCoordinate`] if any component is NaN or
/// infinite.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> Result<f64, GeoError> {
    require_finite(a, "first point")?;
    require_finite(b, "second point")?;

    let lat1 = a.0.to_radians();
    let lon1 = a.1.to_radians();
    let lat2 = b.0.to_radians();
    let lon2 = b.1.to_radians();

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).max(0.0).sqrt());

    Ok(EARTH_RADIUS_METERS * c / 1000.0)
}

/// Hides every visible record farther than `radius_km` from `center`.
///
/// In-place and monotone: records already hidden stay hidden, and
/// visibility is never restored.
///
/// # Errors
///
/// Returns [`GeoError::InvalidCoordinate`] if `center` is not finite.
/// A record whose own coordinates fail the distance computation is left
/// visible and logged rather than aborting the pass.
pub fn filter_by_radius(
    records: &mut [ServiceRequest],
    center: (f64, f64),
    radius_km: f64,
) -> Result<(), GeoError> {
    require_finite(center, "center")?;

    for record in records.iter_mut().filter(|r| r.show_on_map) {
        match haversine_km(record.coordinates(), center) {
            Ok(distance_km) => {
                if distance_km > radius_km {
                    record.show_on_map = false;
                }
            }
            Err(e) => {
                log::warn!(
                    "Skipping radius check for request {:?}: {e}",
                    record.requestid
                );
            }
        }
    }

    Ok(())
}

/// Returns `true` when a raw `(x, y)` pair is already in WGS84 degree
/// range rather than Web Mercator meters. Some source rows arrive
/// pre-converted; those are taken as `(lat = y, lon = x)` directly.
#[must_use]
pub fn looks_like_wgs84(x: f64, y: f64) -> bool {
    x.abs() <= 180.0 && y.abs() <= 90.0
}

/// Parses a raw coordinate pair from optional string fields. Returns
/// `None` if either side is missing, unparseable, or zero.
#[must_use]
pub fn parse_coordinate_pair(x: Option<&str>, y: Option<&str>) -> Option<(f64, f64)> {
    let x = x?.trim().parse::<f64>().ok()?;
    let y = y?.trim().parse::<f64>().ok()?;
    if x == 0.0 || y == 0.0 {
        return None;
    }
    Some((x, y))
}
