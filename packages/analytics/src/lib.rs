#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Temporal aggregation of service requests into chartable period counts.
//!
//! Aggregation is best-effort: records hidden by the radius filter are
//! skipped, and a malformed or missing `datetimeinit` skips that single
//! record with a log line rather than aborting the batch.

use std::collections::BTreeMap;

use chrono::{Datelike as _, NaiveDate};
use dump_map_models::{PeriodCount, PeriodKind, ServiceRequest};

/// Year/month/day components split out of a `datetimeinit` string.
///
/// The date is the substring before any `T` (or space) time separator,
/// split on `-`. Components are parsed but not validated as a calendar
/// date here.
fn split_date(datetimeinit: &str) -> Option<Vec<i64>> {
    let date_part = datetimeinit
        .split(['T', ' '])
        .next()
        .filter(|s| !s.is_empty())?;
    date_part
        .split('-')
        .map(|component| component.parse::<i64>().ok())
        .collect()
}

/// Counts visible requests per calendar month, buckets 1..=12.
///
/// Records with an unparseable date, or a month outside 1..=12, are
/// skipped and logged.
#[must_use]
pub fn aggregate_by_month(records: &[ServiceRequest]) -> PeriodCount {
    let mut table = PeriodCount::new(PeriodKind::Month);

    for record in records.iter().filter(|r| r.show_on_map) {
        let Some(month) = record
            .datetimeinit
            .as_deref()
            .and_then(split_date)
            .filter(|ymd| ymd.len() >= 2)
            .and_then(|ymd| u32::try_from(ymd[1]).ok())
        else {
            log::debug!(
                "Skipping request {:?}: unparseable date {:?}",
                record.requestid,
                record.datetimeinit
            );
            continue;
        };
        if !table.increment(month) {
            log::debug!(
                "Skipping request {:?}: month {month} out of range",
                record.requestid
            );
        }
    }

    table
}

/// Counts visible requests per ISO week, buckets 1..=52.
///
/// Week numbering follows ISO 8601 (Monday-start weeks, week 1 holds the
/// year's first Thursday). ISO week 53 falls outside the table and is
/// dropped. Records with an unparseable or invalid calendar date are
/// skipped and logged.
#[must_use]
pub fn aggregate_by_week(records: &[ServiceRequest]) -> PeriodCount {
    let mut table = PeriodCount::new(PeriodKind::Week);

    for record in records.iter().filter(|r| r.show_on_map) {
        let Some(date) = record
            .datetimeinit
            .as_deref()
            .and_then(split_date)
            .filter(|ymd| ymd.len() >= 3)
            .and_then(|ymd| {
                let year = i32::try_from(ymd[0]).ok()?;
                let month = u32::try_from(ymd[1]).ok()?;
                let day = u32::try_from(ymd[2]).ok()?;
                NaiveDate::from_ymd_opt(year, month, day)
            })
        else {
            log::debug!(
                "Skipping request {:?}: unparseable date {:?}",
                record.requestid,
                record.datetimeinit
            );
            continue;
        };
        table.increment(date.iso_week().week());
    }

    table
}

/// Weekly tables for several years of data at once, for multi-year trend
/// charts. Output order follows input order.
#[must_use]
pub fn weekly_by_year(per_year: &[(i32, Vec<ServiceRequest>)]) -> Vec<(i32, PeriodCount)> {
    per_year
        .iter()
        .map(|(year, records)| (*year, aggregate_by_week(records)))
        .collect()
}

/// Distribution of visible requests by status string. Records with no
/// status land under `"UNKNOWN"`.
#[must_use]
pub fn count_by_status(records: &[ServiceRequest]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();

    for record in records.iter().filter(|r| r.show_on_map) {
        let status = record
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("UNKNOWN");
        *counts.entry(status.to_string()).or_insert(0) += 1;
    }

    counts
}
