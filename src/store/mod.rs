use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use time::macros::format_description;
use time::{OffsetDateTime, Time};

pub mod memory;
pub mod sqlite;

pub type StoreId = String;

/// Days are numbered from Monday (0) to Sunday (6).
pub const DAYS_PER_WEEK: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationStatus {
    Active,
    Inactive,
}

impl ObservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub store_id: StoreId,
    pub status: ObservationStatus,
    pub timestamp_utc: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenHoursWindow {
    pub store_id: StoreId,
    pub day_of_week: u8,
    pub open_local: Time,
    pub close_local: Time,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTimezone {
    pub store_id: StoreId,
    pub timezone: String,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid status value: {0:?}")]
    InvalidStatus(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid open hours for store {store_id}: {reason}")]
    InvalidOpenHours { store_id: StoreId, reason: String },
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Read side of the observation store consumed by a report run.
pub trait ObservationStore {
    /// Stores present in the status, open-hours and timezone datasets, ascending.
    fn list_eligible_store_ids(&self) -> Result<Vec<StoreId>, StoreError>;

    /// Observations for one store with `start <= timestamp <= end`, ascending by timestamp.
    fn observations_in_range(
        &self,
        store_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Observation>, StoreError>;

    fn timezone(&self, store_id: &str) -> Result<Option<String>, StoreError>;

    fn open_hours(&self, store_id: &str) -> Result<Vec<OpenHoursWindow>, StoreError>;

    /// Latest observation timestamp across every store.
    fn max_observation_timestamp(&self) -> Result<Option<OffsetDateTime>, StoreError>;
}

/// Hands out one independent store session per report run.
pub trait StoreConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn ObservationStore + Send>, StoreError>;
}

pub fn timestamp_to_micros(timestamp: OffsetDateTime) -> i64 {
    (timestamp.unix_timestamp_nanos() / 1_000) as i64
}

pub fn timestamp_from_micros(micros: i64) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|err| StoreError::InvalidTimestamp(format!("{micros}us: {err}")))
}

pub fn parse_local_time(value: &str) -> Result<Time, time::error::Parse> {
    Time::parse(value.trim(), format_description!("[hour]:[minute]:[second]"))
}

pub fn format_local_time(value: Time) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        value.hour(),
        value.minute(),
        value.second()
    )
}
