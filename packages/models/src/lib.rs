#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model types for the dump-map toolkit.
//!
//! The data client produces [`ServiceRequest`] records from the Oakland 311
//! Socrata dataset, the geometry crate mutates their visibility, and the
//! analytics crate reduces them into [`PeriodCount`] summaries that chart
//! consumers read as two parallel sequences.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of monthly buckets produced by month aggregation.
pub const MONTHS_IN_YEAR: usize = 12;

/// Number of weekly buckets produced by week aggregation. ISO week 53,
/// when it occurs, falls outside this range and is dropped.
pub const WEEKS_IN_YEAR: usize = 52;

const fn default_show_on_map() -> bool {
    true
}

/// One illegal-dumping service request row as fetched from the API.
///
/// Source columns are strings in the Socrata response. `lat`, `lon`, and
/// `show_on_map` are derived fields attached after fetch: coordinates stay
/// at the `(0.0, 0.0)` sentinel when conversion was skipped or failed
/// (never absent), and visibility defaults to `true` until a radius filter
/// hides the record. Columns the model does not name pass through in
/// `extra` unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Source identifier for the request (e.g., `"1462932"`).
    #[serde(default)]
    pub requestid: Option<String>,
    /// Request category code (e.g., `"ILLDUMP"`).
    #[serde(default)]
    pub reqcategory: Option<String>,
    /// Current request status (e.g., `"OPEN"`, `"CLOSED"`).
    #[serde(default)]
    pub status: Option<String>,
    /// Free-text description of the request.
    #[serde(default)]
    pub description: Option<String>,
    /// Approximate problem address.
    #[serde(default)]
    pub probaddress: Option<String>,
    /// Initiation timestamp, ISO-8601-ish (e.g., `"2024-01-08T09:15:00.000"`).
    #[serde(default)]
    pub datetimeinit: Option<String>,
    /// Raw X coordinate from the source, Web Mercator meters as a string.
    #[serde(default)]
    pub srx: Option<String>,
    /// Raw Y coordinate from the source, Web Mercator meters as a string.
    #[serde(default)]
    pub sry: Option<String>,
    /// Derived WGS84 latitude. `0.0` sentinel when conversion was skipped.
    #[serde(default)]
    pub lat: f64,
    /// Derived WGS84 longitude. `0.0` sentinel when conversion was skipped.
    #[serde(default)]
    pub lon: f64,
    /// Visibility flag. Starts `true`; only radius filtering clears it.
    #[serde(default = "default_show_on_map")]
    pub show_on_map: bool,
    /// Remaining source columns, passed through unchanged.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServiceRequest {
    /// Derived `(latitude, longitude)` pair for this record.
    #[must_use]
    pub const fn coordinates(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

/// Ordered sequence of service requests, in API response order
/// (by default descending `DATETIMEINIT`).
pub type RequestCollection = Vec<ServiceRequest>;

/// The two temporal bucketing policies.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PeriodKind {
    /// Calendar month of the year, buckets 1..=12.
    Month,
    /// ISO week of the year, buckets 1..=52.
    Week,
}

impl PeriodKind {
    /// Number of buckets this policy produces.
    #[must_use]
    pub const fn buckets(self) -> usize {
        match self {
            Self::Month => MONTHS_IN_YEAR,
            Self::Week => WEEKS_IN_YEAR,
        }
    }
}

/// Fixed-size period/count table produced by temporal aggregation.
///
/// Two parallel sequences: period indices (`1..=12` or `1..=52`) and the
/// request count per period. Built fresh per aggregation call; chart
/// consumers read the two sequences directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCount {
    kind: PeriodKind,
    periods: Vec<u32>,
    counts: Vec<u64>,
}

impl PeriodCount {
    /// Creates an all-zero table for the given bucketing policy.
    #[must_use]
    pub fn new(kind: PeriodKind) -> Self {
        let buckets = kind.buckets();
        Self {
            kind,
            periods: (1..=u32::try_from(buckets).unwrap_or(u32::MAX)).collect(),
            counts: vec![0; buckets],
        }
    }

    /// The bucketing policy this table was built with.
    #[must_use]
    pub const fn kind(&self) -> PeriodKind {
        self.kind
    }

    /// Period indices, `1..=N`.
    #[must_use]
    pub fn periods(&self) -> &[u32] {
        &self.periods
    }

    /// Count per period, parallel to [`Self::periods`].
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Count for a single 1-based period, or `None` when out of range.
    #[must_use]
    pub fn get(&self, period: u32) -> Option<u64> {
        let index = usize::try_from(period.checked_sub(1)?).ok()?;
        self.counts.get(index).copied()
    }

    /// Sum of all bucket counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Adds one to the bucket for a 1-based period. Returns `false`
    /// (without recording anything) when the period is out of range,
    /// which is how ISO week 53 gets dropped.
    pub fn increment(&mut self, period: u32) -> bool {
        let Some(index) = period
            .checked_sub(1)
            .and_then(|p| usize::try_from(p).ok())
            .filter(|p| *p < self.counts.len())
        else {
            return false;
        };
        self.counts[index] += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_count_starts_all_zero() {
        let table = PeriodCount::new(PeriodKind::Month);
        assert_eq!(table.periods(), (1..=12).collect::<Vec<u32>>());
        assert_eq!(table.counts(), vec![0_u64; 12]);
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn increment_records_in_range_periods() {
        let mut table = PeriodCount::new(PeriodKind::Week);
        assert!(table.increment(1));
        assert!(table.increment(52));
        assert_eq!(table.get(1), Some(1));
        assert_eq!(table.get(52), Some(1));
        assert_eq!(table.total(), 2);
    }

    #[test]
    fn increment_drops_out_of_range_periods() {
        let mut table = PeriodCount::new(PeriodKind::Week);
        assert!(!table.increment(53));
        assert!(!table.increment(0));
        assert_eq!(table.total(), 0);
    }

    #[test]
    fn service_request_deserializes_socrata_row() {
        let json = r#"{
            "requestid": "1462932",
            "reqcategory": "ILLDUMP",
            "datetimeinit": "2024-01-08T09:15:00.000",
            "srx": "-13610700.1",
            "sry": "4551850.5",
            "councildistrict": "3"
        }"#;
        let record: ServiceRequest = serde_json::from_str(json).unwrap();
        assert_eq!(record.requestid.as_deref(), Some("1462932"));
        assert!(record.show_on_map);
        assert!((record.lat - 0.0).abs() < f64::EPSILON);
        assert!((record.lon - 0.0).abs() < f64::EPSILON);
        assert_eq!(
            record.extra.get("councildistrict"),
            Some(&serde_json::json!("3"))
        );
    }

    #[test]
    fn period_kind_round_trips_strings() {
        assert_eq!(PeriodKind::Week.to_string(), "week");
        assert_eq!("month".parse::<PeriodKind>().unwrap(), PeriodKind::Month);
    }
}
