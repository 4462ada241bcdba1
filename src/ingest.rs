//! Bulk loading of the flat-file datasets into the SQLite observation store.

use crate::error::AppError;
use crate::store::sqlite::SqliteStore;
use crate::store::{
    DAYS_PER_WEEK, Observation, ObservationStatus, OpenHoursWindow, StoreError, StoreTimezone,
    parse_local_time,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::{info, warn};

pub const STATUS_FILE: &str = "store_status.csv";
pub const BUSINESS_HOURS_FILE: &str = "menu_hours.csv";
pub const TIMEZONES_FILE: &str = "timezones.csv";

/// Rows inserted per transaction.
pub const INSERT_CHUNK_SIZE: usize = 20_000;

#[derive(Debug, Deserialize)]
struct StatusRecord {
    store_id: String,
    status: String,
    timestamp_utc: String,
}

#[derive(Debug, Deserialize)]
struct BusinessHoursRecord {
    store_id: String,
    #[serde(rename = "dayOfWeek")]
    day_of_week: i64,
    start_time_local: String,
    end_time_local: String,
}

#[derive(Debug, Deserialize)]
struct TimezoneRecord {
    store_id: String,
    timezone_str: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSummary {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestSummary {
    pub timezones: FileSummary,
    pub business_hours: FileSummary,
    pub status: FileSummary,
}

/// Load `timezones.csv`, `menu_hours.csv` and `store_status.csv` from `data_dir`, in that order.
pub fn ingest_directory(store: &mut SqliteStore, data_dir: &Path) -> Result<IngestSummary, AppError> {
    info!(data_dir = %data_dir.display(), "Starting ingest");

    let timezones = load_file(
        &data_dir.join(TIMEZONES_FILE),
        parse_timezone,
        |rows| store.insert_timezones(rows),
    )?;
    let business_hours = load_file(
        &data_dir.join(BUSINESS_HOURS_FILE),
        parse_business_hours,
        |rows| store.insert_open_hours(rows),
    )?;
    let status = load_file(
        &data_dir.join(STATUS_FILE),
        parse_status,
        |rows| store.insert_observations(rows),
    )?;

    let summary = IngestSummary {
        timezones,
        business_hours,
        status,
    };
    info!(
        timezones_loaded = summary.timezones.loaded,
        timezones_skipped = summary.timezones.skipped,
        business_hours_loaded = summary.business_hours.loaded,
        business_hours_skipped = summary.business_hours.skipped,
        status_loaded = summary.status.loaded,
        status_skipped = summary.status.skipped,
        "Ingest complete"
    );

    let counts = store
        .table_counts()
        .map_err(|err| AppError::Ingest(format!("failed to count rows: {err}")))?;
    info!(
        status_rows = counts.status_rows,
        business_hours_rows = counts.business_hours_rows,
        timezone_rows = counts.timezone_rows,
        "Table counts"
    );

    Ok(summary)
}

fn load_file<R, T>(
    path: &Path,
    parse: impl Fn(R) -> Result<T, String>,
    mut insert: impl FnMut(&[T]) -> Result<usize, StoreError>,
) -> Result<FileSummary, AppError>
where
    R: DeserializeOwned,
{
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| AppError::Ingest(format!("{}: {err}", path.display())))?;

    let mut summary = FileSummary::default();
    let mut chunk = Vec::with_capacity(INSERT_CHUNK_SIZE);
    let mut flush = |chunk: &mut Vec<T>, summary: &mut FileSummary| -> Result<(), AppError> {
        if chunk.is_empty() {
            return Ok(());
        }
        summary.loaded += insert(chunk)
            .map_err(|err| AppError::Ingest(format!("{}: {err}", path.display())))?;
        chunk.clear();
        info!(file = %path.display(), loaded = summary.loaded, "Chunk inserted");
        Ok(())
    };

    for (index, record) in reader.deserialize::<R>().enumerate() {
        // Line 1 is the header.
        let line = index + 2;
        let parsed = record
            .map_err(|err| err.to_string())
            .and_then(&parse);
        match parsed {
            Ok(row) => {
                chunk.push(row);
                if chunk.len() >= INSERT_CHUNK_SIZE {
                    flush(&mut chunk, &mut summary)?;
                }
            }
            Err(reason) => {
                summary.skipped += 1;
                warn!(file = %path.display(), line, reason = %reason, "Skipping malformed row");
            }
        }
    }
    flush(&mut chunk, &mut summary)?;

    Ok(summary)
}

fn parse_status(record: StatusRecord) -> Result<Observation, String> {
    let status: ObservationStatus = record.status.parse().map_err(|err: StoreError| err.to_string())?;
    Ok(Observation {
        store_id: non_empty(record.store_id)?,
        status,
        timestamp_utc: parse_timestamp(&record.timestamp_utc)?,
    })
}

fn parse_business_hours(record: BusinessHoursRecord) -> Result<OpenHoursWindow, String> {
    let day_of_week = u8::try_from(record.day_of_week)
        .ok()
        .filter(|day| *day < DAYS_PER_WEEK)
        .ok_or_else(|| format!("dayOfWeek out of range: {}", record.day_of_week))?;
    let open_local = parse_local_time(&record.start_time_local)
        .map_err(|err| format!("start_time_local {:?}: {err}", record.start_time_local))?;
    let close_local = parse_local_time(&record.end_time_local)
        .map_err(|err| format!("end_time_local {:?}: {err}", record.end_time_local))?;
    Ok(OpenHoursWindow {
        store_id: non_empty(record.store_id)?,
        day_of_week,
        open_local,
        close_local,
    })
}

fn parse_timezone(record: TimezoneRecord) -> Result<StoreTimezone, String> {
    Ok(StoreTimezone {
        store_id: non_empty(record.store_id)?,
        timezone: non_empty(record.timezone_str)?,
    })
}

fn non_empty(value: String) -> Result<String, String> {
    if value.is_empty() {
        Err("empty field".to_string())
    } else {
        Ok(value)
    }
}

/// Parse an observation timestamp. Values without an offset are taken as UTC.
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS[.ffffff]`, either optionally followed by ` UTC`.
pub fn parse_timestamp(value: &str) -> Result<OffsetDateTime, String> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed.to_offset(time::UtcOffset::UTC));
    }

    let naive = trimmed.replacen('T', " ", 1);
    PrimitiveDateTime::parse(
        &naive,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .map(PrimitiveDateTime::assume_utc)
    .map_err(|err| format!("timestamp {value:?}: {err}"))
}
