use crate::error::AppError;
use crate::report::ReportRow;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::warn;

pub const REPORT_FILE_PREFIX: &str = "store_report_";

pub const REPORT_COLUMNS: [&str; 7] = [
    "store_id",
    "uptime_last_hour(in minutes)",
    "uptime_last_day(in hours)",
    "uptime_last_week(in hours)",
    "downtime_last_hour(in minutes)",
    "downtime_last_day(in hours)",
    "downtime_last_week(in hours)",
];

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// `YYYYMMDD_HHMMSS` in UTC.
pub fn timestamp_suffix(now: OffsetDateTime) -> Result<String, AppError> {
    now.to_offset(time::UtcOffset::UTC)
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .map_err(|err| AppError::OutputWrite(format!("timestamp format error: {err}")))
}

/// Write the report table to a new CSV file under `output_dir`.
///
/// The file is never overwritten: when the timestamped name is taken, `_1`, `_2`, ... is appended.
pub fn write_report(
    rows: &[ReportRow],
    output_dir: &Path,
    now: OffsetDateTime,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(output_dir).map_err(|err| {
        AppError::OutputWrite(format!(
            "failed to create {}: {err}",
            output_dir.display()
        ))
    })?;

    let stem = format!("{REPORT_FILE_PREFIX}{}", timestamp_suffix(now)?);
    let (file, path) = create_unique(output_dir, &stem)?;

    if let Err(err) = write_rows(file, rows) {
        if let Err(remove_err) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %remove_err, "Failed to remove partial report");
        }
        return Err(AppError::OutputWrite(format!("{}: {err}", path.display())));
    }

    Ok(path)
}

fn write_rows(file: File, rows: &[ReportRow]) -> Result<(), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(REPORT_COLUMNS)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn create_unique(output_dir: &Path, stem: &str) -> Result<(File, PathBuf), AppError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.csv")
        } else {
            format!("{stem}_{attempt}.csv")
        };
        let path = output_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((file, path)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(AppError::OutputWrite(format!(
                    "failed to create {}: {err}",
                    path.display()
                )));
            }
        }
    }
    Err(AppError::OutputWrite(format!(
        "no free report name for {stem} in {}",
        output_dir.display()
    )))
}
