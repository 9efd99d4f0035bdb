//! Row mapping from raw SODA JSON to [`ServiceRequest`] records.
//!
//! Coordinate attachment is per-row best-effort: a row whose `srx`/`sry`
//! pair is missing, zero, or unparseable keeps the `(0.0, 0.0)` sentinel
//! and the rest of the batch continues.

use dump_map_geo::{looks_like_wgs84, parse_coordinate_pair, web_mercator_to_wgs84};
use dump_map_models::{RequestCollection, ServiceRequest};

/// Maps raw response rows into service requests: every record is marked
/// visible, then gets WGS84 coordinates derived from its raw pair. Rows
/// that are not JSON objects are skipped and logged.
#[must_use]
pub fn map_rows(raw: Vec<serde_json::Value>) -> RequestCollection {
    let mut records = Vec::with_capacity(raw.len());

    for (index, row) in raw.into_iter().enumerate() {
        let mut record: ServiceRequest = match serde_json::from_value(row) {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping row {index}: {e}");
                continue;
            }
        };

        record.show_on_map = true;
        attach_coordinates(&mut record);
        records.push(record);
    }

    records
}

/// Derives `(lat, lon)` for one record from its raw coordinate pair.
///
/// Rows occasionally arrive already in WGS84 degree range; those are
/// taken as `(lat = sry, lon = srx)` without reprojection. Everything
/// else is treated as Web Mercator meters.
fn attach_coordinates(record: &mut ServiceRequest) {
    let Some((x, y)) = parse_coordinate_pair(record.srx.as_deref(), record.sry.as_deref()) else {
        return;
    };

    let (lat, lon) = if looks_like_wgs84(x, y) {
        (y, x)
    } else {
        web_mercator_to_wgs84(x, y)
    };

    record.lat = lat;
    record.lon = lon;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rows_and_attaches_mercator_coordinates() {
        let raw = vec![serde_json::json!({
            "requestid": "1462932",
            "datetimeinit": "2024-01-08T09:15:00.000",
            "srx": "-13610789.0",
            "sry": "4552055.0"
        })];

        let records = map_rows(raw);
        assert_eq!(records.len(), 1);
        assert!(records[0].show_on_map);
        assert!((records[0].lat - 37.8).abs() < 0.1);
        assert!((records[0].lon - -122.27).abs() < 0.1);
    }

    #[test]
    fn passes_through_wgs84_rows_without_reprojection() {
        let raw = vec![serde_json::json!({
            "requestid": "1462933",
            "srx": "-122.2712",
            "sry": "37.8044"
        })];

        let records = map_rows(raw);
        assert!((records[0].lat - 37.8044).abs() < f64::EPSILON);
        assert!((records[0].lon - -122.2712).abs() < f64::EPSILON);
    }

    #[test]
    fn leaves_sentinel_coordinates_on_bad_pairs() {
        let raw = vec![
            serde_json::json!({ "requestid": "1" }),
            serde_json::json!({ "requestid": "2", "srx": "0", "sry": "4552055.0" }),
            serde_json::json!({ "requestid": "3", "srx": "garbage", "sry": "4552055.0" }),
        ];

        let records = map_rows(raw);
        assert_eq!(records.len(), 3);
        for record in &records {
            assert!((record.lat - 0.0).abs() < f64::EPSILON);
            assert!((record.lon - 0.0).abs() < f64::EPSILON);
            assert!(record.show_on_map);
        }
    }

    #[test]
    fn skips_non_object_rows() {
        let raw = vec![
            serde_json::json!("not-an-object"),
            serde_json::json!({ "requestid": "4" }),
        ];

        let records = map_rows(raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].requestid.as_deref(), Some("4"));
    }

    #[test]
    fn zero_rows_map_to_empty_collection() {
        assert!(map_rows(Vec::new()).is_empty());
    }
}
