#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the Oakland 311 illegal dumping data tool.
//!
//! Fetches service requests, optionally restricts them to a radius
//! around a center point, and emits records or weekly/monthly count
//! tables as CSV or JSON for downstream charting and mapping.

use clap::{Parser, Subcommand, ValueEnum};
use dump_map_analytics::{aggregate_by_month, count_by_status, weekly_by_year};
use dump_map_client::{DumpClient, QueryOptions, soql};
use dump_map_geo::filter_by_radius;
use dump_map_models::{PeriodCount, RequestCollection, WEEKS_IN_YEAR};

/// Default map center: downtown Oakland.
const OAKLAND_CENTER_LAT: f64 = 37.804_747;
const OAKLAND_CENTER_LON: f64 = -122.272;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

#[derive(Parser)]
#[command(name = "dump_map_cli", about = "Oakland 311 illegal dumping data tool")]
struct Cli {
    /// Socrata app token (falls back to the `OAK311_API_TOKEN` env var)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch one page of requests, optionally radius-filtered
    Fetch {
        /// Restrict to requests initiated in this year
        #[arg(long)]
        year: Option<i32>,
        /// Maximum number of records to return
        #[arg(long, default_value = "1000")]
        limit: u64,
        /// Number of records to skip
        #[arg(long, default_value = "0")]
        offset: u64,
        /// Hide records farther than this many kilometers from the center
        #[arg(long)]
        radius_km: Option<f64>,
        /// Radius center latitude
        #[arg(long, default_value_t = OAKLAND_CENTER_LAT)]
        center_lat: f64,
        /// Radius center longitude
        #[arg(long, default_value_t = OAKLAND_CENTER_LON)]
        center_lon: f64,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Weekly request counts for one or more years
    Weekly {
        /// Comma-separated years, e.g., "2024,2025"
        #[arg(long)]
        years: String,
        /// Rows fetched per API page
        #[arg(long, default_value = "5000")]
        page_size: u64,
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },
    /// Monthly request counts for a year
    Monthly {
        #[arg(long)]
        year: i32,
        /// Rows fetched per API page
        #[arg(long, default_value = "5000")]
        page_size: u64,
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
    },
    /// Server-side count of matching requests
    Count {
        /// Restrict the count to this year
        #[arg(long)]
        year: Option<i32>,
    },
    /// Request status distribution for a year
    Status {
        #[arg(long)]
        year: i32,
        /// Rows fetched per API page
        #[arg(long, default_value = "5000")]
        page_size: u64,
    },
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();
    let mut client = DumpClient::new(cli.token);

    match cli.command {
        Commands::Fetch {
            year,
            limit,
            offset,
            radius_km,
            center_lat,
            center_lon,
            format,
        } => {
            let where_clause = year.map_or_else(soql::category_filter, soql::year_filter);
            let mut records = client
                .query(&QueryOptions {
                    offset,
                    limit,
                    where_clause: Some(where_clause),
                    order: Some(soql::newest_first()),
                })
                .await?;

            if let Some(radius_km) = radius_km {
                filter_by_radius(&mut records, (center_lat, center_lon), radius_km)?;
            }
            print_records(&records, format)?;
        }
        Commands::Weekly {
            years,
            page_size,
            format,
        } => {
            let years = parse_years(&years)?;
            let mut per_year = Vec::with_capacity(years.len());
            for year in years {
                let records = client
                    .query_all(
                        Some(&soql::year_filter(year)),
                        Some(&soql::newest_first()),
                        page_size,
                    )
                    .await?;
                per_year.push((year, records));
            }
            print_weekly_tables(&weekly_by_year(&per_year), format)?;
        }
        Commands::Monthly {
            year,
            page_size,
            format,
        } => {
            let records = client
                .query_all(
                    Some(&soql::year_filter(year)),
                    Some(&soql::newest_first()),
                    page_size,
                )
                .await?;
            print_period_table("month", &aggregate_by_month(&records), format)?;
        }
        Commands::Count { year } => {
            let where_clause = year.map_or_else(soql::category_filter, soql::year_filter);
            let total = client.count(Some(&where_clause)).await?;
            println!("{total}");
        }
        Commands::Status { year, page_size } => {
            let records = client
                .query_all(
                    Some(&soql::year_filter(year)),
                    Some(&soql::newest_first()),
                    page_size,
                )
                .await?;
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(["status", "count"])?;
            for (status, count) in count_by_status(&records) {
                writer.write_record([status, count.to_string()])?;
            }
            writer.flush()?;
        }
    }

    client.close();
    Ok(())
}

fn parse_years(years: &str) -> Result<Vec<i32>, Box<dyn std::error::Error>> {
    let parsed = years
        .split(',')
        .map(str::trim)
        .filter(|y| !y.is_empty())
        .map(str::parse::<i32>)
        .collect::<Result<Vec<_>, _>>()?;
    if parsed.is_empty() {
        return Err("no years given".into());
    }
    Ok(parsed)
}

/// Emits visible records for map/table consumers.
fn print_records(
    records: &RequestCollection,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    let visible: Vec<_> = records.iter().filter(|r| r.show_on_map).collect();
    log::info!("{} of {} records visible", visible.len(), records.len());

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&visible)?),
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record([
                "requestid",
                "datetimeinit",
                "status",
                "probaddress",
                "lat",
                "lon",
                "description",
            ])?;
            for record in visible {
                writer.write_record([
                    record.requestid.clone().unwrap_or_default(),
                    record.datetimeinit.clone().unwrap_or_default(),
                    record.status.clone().unwrap_or_default(),
                    record.probaddress.clone().unwrap_or_default(),
                    record.lat.to_string(),
                    record.lon.to_string(),
                    record.description.clone().unwrap_or_default(),
                ])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// Emits a single period/count table.
fn print_period_table(
    label: &str,
    table: &PeriodCount,
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(table)?),
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record([label, "count"])?;
            for (period, count) in table.periods().iter().zip(table.counts()) {
                writer.write_record([period.to_string(), count.to_string()])?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}

/// Emits week-by-year count columns for multi-year trend charts.
fn print_weekly_tables(
    tables: &[(i32, PeriodCount)],
    format: Format,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        Format::Json => {
            let by_year: serde_json::Map<String, serde_json::Value> = tables
                .iter()
                .map(|(year, table)| Ok((year.to_string(), serde_json::to_value(table)?)))
                .collect::<Result<_, serde_json::Error>>()?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::Value::Object(by_year))?
            );
        }
        Format::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            let mut header = vec!["week".to_string()];
            header.extend(tables.iter().map(|(year, _)| year.to_string()));
            writer.write_record(&header)?;

            for week in 1..=u32::try_from(WEEKS_IN_YEAR).unwrap_or(u32::MAX) {
                let mut row = vec![week.to_string()];
                for (_, table) in tables {
                    row.push(table.get(week).unwrap_or(0).to_string());
                }
                writer.write_record(&row)?;
            }
            writer.flush()?;
        }
    }
    Ok(())
}
