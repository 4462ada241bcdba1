use crate::store::{
    DAYS_PER_WEEK, Observation, ObservationStore, OpenHoursWindow, StoreConnector, StoreError,
    StoreId, StoreTimezone, format_local_time, parse_local_time, timestamp_from_micros,
    timestamp_to_micros,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS store_status (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    store_id TEXT NOT NULL,
    status TEXT NOT NULL,
    timestamp_utc INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_store_status_store_ts ON store_status (store_id, timestamp_utc);
CREATE INDEX IF NOT EXISTS idx_store_status_ts ON store_status (timestamp_utc);

CREATE TABLE IF NOT EXISTS business_hours (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    store_id TEXT NOT NULL,
    day_of_week INTEGER NOT NULL,
    start_time_local TEXT NOT NULL,
    end_time_local TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_business_hours_store ON business_hours (store_id);

CREATE TABLE IF NOT EXISTS store_timezone (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    store_id TEXT NOT NULL UNIQUE,
    timezone_str TEXT NOT NULL
);
";

const ELIGIBLE_STORES_SQL: &str = "
SELECT DISTINCT ss.store_id
FROM store_status ss
WHERE EXISTS (SELECT 1 FROM business_hours bh WHERE bh.store_id = ss.store_id)
  AND EXISTS (SELECT 1 FROM store_timezone st WHERE st.store_id = ss.store_id)
ORDER BY ss.store_id
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableCounts {
    pub status_rows: u64,
    pub business_hours_rows: u64,
    pub timezone_rows: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetOverview {
    pub counts: TableCounts,
    pub status_stores: u64,
    pub business_hours_stores: u64,
    pub timezone_stores: u64,
    pub eligible_stores: u64,
    pub earliest_observation: Option<OffsetDateTime>,
    pub latest_observation: Option<OffsetDateTime>,
}

/// SQLite-backed observation store. One instance owns one connection.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database for writing and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn insert_observations(&mut self, rows: &[Observation]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO store_status (store_id, status, timestamp_utc) VALUES (?1, ?2, ?3)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.store_id,
                    row.status.as_str(),
                    timestamp_to_micros(row.timestamp_utc)
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn insert_open_hours(&mut self, rows: &[OpenHoursWindow]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO business_hours (store_id, day_of_week, start_time_local, end_time_local)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.store_id,
                    row.day_of_week,
                    format_local_time(row.open_local),
                    format_local_time(row.close_local)
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// A store keeps at most one zone; a later row for the same store replaces the earlier one.
    pub fn insert_timezones(&mut self, rows: &[StoreTimezone]) -> Result<usize, StoreError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO store_timezone (store_id, timezone_str) VALUES (?1, ?2)
                 ON CONFLICT(store_id) DO UPDATE SET timezone_str = excluded.timezone_str",
            )?;
            for row in rows {
                stmt.execute(params![row.store_id, row.timezone])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn table_counts(&self) -> Result<TableCounts, StoreError> {
        Ok(TableCounts {
            status_rows: self.count("SELECT COUNT(*) FROM store_status")?,
            business_hours_rows: self.count("SELECT COUNT(*) FROM business_hours")?,
            timezone_rows: self.count("SELECT COUNT(*) FROM store_timezone")?,
        })
    }

    pub fn overview(&self) -> Result<DatasetOverview, StoreError> {
        let (earliest, latest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(timestamp_utc), MAX(timestamp_utc) FROM store_status",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DatasetOverview {
            counts: self.table_counts()?,
            status_stores: self.count("SELECT COUNT(DISTINCT store_id) FROM store_status")?,
            business_hours_stores: self
                .count("SELECT COUNT(DISTINCT store_id) FROM business_hours")?,
            timezone_stores: self.count("SELECT COUNT(DISTINCT store_id) FROM store_timezone")?,
            eligible_stores: self.count(&format!("SELECT COUNT(*) FROM ({ELIGIBLE_STORES_SQL})"))?,
            earliest_observation: earliest.map(timestamp_from_micros).transpose()?,
            latest_observation: latest.map(timestamp_from_micros).transpose()?,
        })
    }

    fn count(&self, sql: &str) -> Result<u64, StoreError> {
        let value: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(value.max(0) as u64)
    }
}

impl ObservationStore for SqliteStore {
    fn list_eligible_store_ids(&self) -> Result<Vec<StoreId>, StoreError> {
        let mut stmt = self.conn.prepare_cached(ELIGIBLE_STORES_SQL)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn observations_in_range(
        &self,
        store_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Observation>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT status, timestamp_utc FROM store_status
             WHERE store_id = ?1 AND timestamp_utc >= ?2 AND timestamp_utc <= ?3
             ORDER BY timestamp_utc ASC",
        )?;
        let raw = stmt
            .query_map(
                params![
                    store_id,
                    timestamp_to_micros(start),
                    timestamp_to_micros(end)
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(status, micros)| {
                Ok(Observation {
                    store_id: store_id.to_string(),
                    status: status.parse()?,
                    timestamp_utc: timestamp_from_micros(micros)?,
                })
            })
            .collect()
    }

    fn timezone(&self, store_id: &str) -> Result<Option<String>, StoreError> {
        let zone = self
            .conn
            .query_row(
                "SELECT timezone_str FROM store_timezone WHERE store_id = ?1",
                params![store_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(zone)
    }

    fn open_hours(&self, store_id: &str) -> Result<Vec<OpenHoursWindow>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT day_of_week, start_time_local, end_time_local FROM business_hours
             WHERE store_id = ?1 ORDER BY id ASC",
        )?;
        let raw = stmt
            .query_map(params![store_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(day, open, close)| {
                let invalid = |reason: String| StoreError::InvalidOpenHours {
                    store_id: store_id.to_string(),
                    reason,
                };
                let day_of_week = u8::try_from(day)
                    .ok()
                    .filter(|day| *day < DAYS_PER_WEEK)
                    .ok_or_else(|| invalid(format!("day_of_week out of range: {day}")))?;
                let open_local = parse_local_time(&open)
                    .map_err(|err| invalid(format!("start time {open:?}: {err}")))?;
                let close_local = parse_local_time(&close)
                    .map_err(|err| invalid(format!("end time {close:?}: {err}")))?;
                Ok(OpenHoursWindow {
                    store_id: store_id.to_string(),
                    day_of_week,
                    open_local,
                    close_local,
                })
            })
            .collect()
    }

    fn max_observation_timestamp(&self) -> Result<Option<OffsetDateTime>, StoreError> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(timestamp_utc) FROM store_status", [], |row| {
                    row.get(0)
                })?;
        max.map(timestamp_from_micros).transpose()
    }
}

/// Opens a fresh read-only connection to the database file for every run.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StoreConnector for SqliteConnector {
    fn connect(&self) -> Result<Box<dyn ObservationStore + Send>, StoreError> {
        debug!(path = %self.path.display(), "Opening observation store session");
        Ok(Box::new(SqliteStore::open_read_only(&self.path)?))
    }
}
