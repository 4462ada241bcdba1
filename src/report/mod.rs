//! Report assembly: one row per eligible store, written as a single CSV artifact.

use crate::error::AppError;
use crate::estimation::{
    MetadataCache, ReferenceTime, ReportWindow, WindowEstimate, estimate_window,
};
use crate::store::{ObservationStore, StoreConnector, StoreError, StoreId};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub mod summary;
pub mod writer;

pub use summary::ReportSummary;
pub use writer::{REPORT_COLUMNS, write_report};

pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub store_id: StoreId,
    #[serde(rename = "uptime_last_hour(in minutes)")]
    pub uptime_last_hour: f64,
    #[serde(rename = "uptime_last_day(in hours)")]
    pub uptime_last_day: f64,
    #[serde(rename = "uptime_last_week(in hours)")]
    pub uptime_last_week: f64,
    #[serde(rename = "downtime_last_hour(in minutes)")]
    pub downtime_last_hour: f64,
    #[serde(rename = "downtime_last_day(in hours)")]
    pub downtime_last_day: f64,
    #[serde(rename = "downtime_last_week(in hours)")]
    pub downtime_last_week: f64,
}

impl ReportRow {
    pub fn from_windows(
        store_id: impl Into<StoreId>,
        last_hour: WindowEstimate,
        last_day: WindowEstimate,
        last_week: WindowEstimate,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            uptime_last_hour: last_hour.uptime,
            uptime_last_day: last_day.uptime,
            uptime_last_week: last_week.uptime,
            downtime_last_hour: last_hour.downtime,
            downtime_last_day: last_day.downtime,
            downtime_last_week: last_week.downtime,
        }
    }

    /// Placeholder row for a store whose estimation failed.
    pub fn zeroed(store_id: impl Into<StoreId>) -> Self {
        Self::from_windows(
            store_id,
            WindowEstimate::ZERO,
            WindowEstimate::ZERO,
            WindowEstimate::ZERO,
        )
    }
}

#[derive(Debug, Error)]
#[error("failed to estimate store {store_id}: {source}")]
pub struct EstimationError {
    pub store_id: StoreId,
    #[source]
    pub source: StoreError,
}

#[derive(Debug)]
pub enum StoreOutcome {
    Computed(ReportRow),
    /// Estimation failed; the row is zeroed so the run can continue.
    Contained { row: ReportRow, error: EstimationError },
}

impl StoreOutcome {
    pub fn row(&self) -> &ReportRow {
        match self {
            Self::Computed(row) | Self::Contained { row, .. } => row,
        }
    }

    pub fn into_row(self) -> ReportRow {
        match self {
            Self::Computed(row) | Self::Contained { row, .. } => row,
        }
    }

    pub fn is_contained(&self) -> bool {
        matches!(self, Self::Contained { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub default_timezone: String,
}

/// State scoped to a single report run: the store session and the per-run memos.
///
/// Dropping the context releases the store session.
pub struct RunContext {
    store: Box<dyn ObservationStore + Send>,
    reference: ReferenceTime,
    metadata: MetadataCache,
}

impl RunContext {
    pub fn new(store: Box<dyn ObservationStore + Send>, default_timezone: &str) -> Self {
        Self {
            store,
            reference: ReferenceTime::new(),
            metadata: MetadataCache::new(default_timezone),
        }
    }

    pub fn store(&self) -> &dyn ObservationStore {
        self.store.as_ref()
    }

    pub fn reference_time(&mut self) -> Result<OffsetDateTime, StoreError> {
        self.reference.get(self.store.as_ref())
    }

    pub fn metadata(&self) -> &MetadataCache {
        &self.metadata
    }
}

#[derive(Debug, Default)]
pub struct ReportTable {
    pub rows: Vec<ReportRow>,
    pub contained_failures: usize,
}

/// Build the row for one store. Failures are contained into a zeroed row.
pub fn build_store_report(ctx: &mut RunContext, store_id: &str) -> StoreOutcome {
    match try_build_store_report(ctx, store_id) {
        Ok(row) => StoreOutcome::Computed(row),
        Err(source) => {
            let error = EstimationError {
                store_id: store_id.to_string(),
                source,
            };
            warn!(store_id, error = %error, "Store estimation failed, emitting zeroed row");
            StoreOutcome::Contained {
                row: ReportRow::zeroed(store_id),
                error,
            }
        }
    }
}

fn try_build_store_report(ctx: &mut RunContext, store_id: &str) -> Result<ReportRow, StoreError> {
    let reference_time = ctx.reference_time()?;

    // Metadata is loaded for every store but does not feed into the ratio.
    let timezone = ctx
        .metadata
        .timezone(ctx.store.as_ref(), store_id)?
        .to_string();
    let open_days = ctx.metadata.open_hours(ctx.store.as_ref(), store_id)?.len();
    debug!(store_id, timezone = %timezone, open_days, "Store metadata loaded");

    let store = ctx.store.as_ref();
    let last_hour = estimate_window(store, store_id, reference_time, ReportWindow::LastHour)?;
    let last_day = estimate_window(store, store_id, reference_time, ReportWindow::LastDay)?;
    let last_week = estimate_window(store, store_id, reference_time, ReportWindow::LastWeek)?;

    Ok(ReportRow::from_windows(
        store_id, last_hour, last_day, last_week,
    ))
}

/// Enumerate eligible stores and build their rows in fixed-size batches, preserving order.
pub fn build_report_table(
    ctx: &mut RunContext,
    batch_size: usize,
) -> Result<ReportTable, AppError> {
    let store_ids = ctx
        .store()
        .list_eligible_store_ids()
        .map_err(AppError::StorageUnavailable)?;
    info!(stores = store_ids.len(), "Eligible stores found");

    if store_ids.is_empty() {
        return Ok(ReportTable::default());
    }

    let reference_time = ctx
        .reference_time()
        .map_err(AppError::StorageUnavailable)?;
    info!(reference_time = %reference_time, "Report windows anchored");

    let batch_size = batch_size.max(1);
    let total_batches = store_ids.len().div_ceil(batch_size);
    let mut table = ReportTable {
        rows: Vec::with_capacity(store_ids.len()),
        contained_failures: 0,
    };

    for (index, batch) in store_ids.chunks(batch_size).enumerate() {
        info!(batch = index + 1, total_batches, size = batch.len(), "Processing batch");
        for store_id in batch {
            let outcome = build_store_report(ctx, store_id);
            if outcome.is_contained() {
                table.contained_failures += 1;
            }
            table.rows.push(outcome.into_row());
        }
        info!(
            processed = table.rows.len(),
            total = store_ids.len(),
            "Batch complete"
        );
    }

    Ok(table)
}

/// Run one full report: connect, estimate every eligible store, write the artifact.
///
/// Returns the path of the written CSV file.
pub fn generate_report(
    connector: &dyn StoreConnector,
    settings: &ReportSettings,
) -> Result<PathBuf, AppError> {
    let started = Instant::now();
    info!(output_dir = %settings.output_dir.display(), "Starting report generation");

    let store = connector.connect().map_err(AppError::StorageUnavailable)?;
    let mut ctx = RunContext::new(store, &settings.default_timezone);
    let table = build_report_table(&mut ctx, settings.batch_size)?;
    drop(ctx);

    let path = write_report(&table.rows, &settings.output_dir, OffsetDateTime::now_utc())?;

    ReportSummary::from_table(&table).log();
    info!(
        path = %path.display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Report generated"
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{Observation, ObservationStatus, OpenHoursWindow, StoreTimezone};
    use time::Duration;
    use time::macros::{datetime, time};

    const WATERMARK: OffsetDateTime = datetime!(2023-01-25 18:00 UTC);

    fn register(store: &mut MemoryStore, store_id: &str) {
        store.add_open_hours(OpenHoursWindow {
            store_id: store_id.to_string(),
            day_of_week: 0,
            open_local: time!(9:00),
            close_local: time!(17:00),
        });
        store.set_timezone(StoreTimezone {
            store_id: store_id.to_string(),
            timezone: "America/New_York".to_string(),
        });
    }

    fn observe(store: &mut MemoryStore, store_id: &str, minutes_before: i64, active: bool) {
        store.add_observation(Observation {
            store_id: store_id.to_string(),
            status: if active {
                ObservationStatus::Active
            } else {
                ObservationStatus::Inactive
            },
            timestamp_utc: WATERMARK - Duration::minutes(minutes_before),
        });
    }

    fn context(store: MemoryStore) -> RunContext {
        RunContext::new(Box::new(store), "America/Chicago")
    }

    #[test]
    fn rows_follow_eligible_order() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            register(&mut store, id);
            observe(&mut store, id, 10, true);
        }

        let table = build_report_table(&mut context(store), 50)?;

        let ids: Vec<_> = table.rows.iter().map(|row| row.store_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(table.contained_failures, 0);
        Ok(())
    }

    #[test]
    fn reference_time_is_global_not_per_store() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        register(&mut store, "fresh");
        register(&mut store, "stale");
        observe(&mut store, "fresh", 0, true);
        // Latest sample of "stale" is two hours before the global watermark.
        observe(&mut store, "stale", 120, true);

        let table = build_report_table(&mut context(store), 50)?;

        let fresh = &table.rows[0];
        let stale = &table.rows[1];
        assert_eq!(fresh.uptime_last_hour, 60.0);
        assert_eq!(stale.uptime_last_hour, 0.0);
        assert_eq!(stale.downtime_last_hour, 60.0);
        assert_eq!(stale.uptime_last_day, 24.0);
        Ok(())
    }

    #[test]
    fn store_without_observations_is_fully_down() {
        let mut ctx = context(MemoryStore::new());

        let outcome = build_store_report(&mut ctx, "ghost");

        let row = outcome.row();
        assert!(!outcome.is_contained());
        assert_eq!(row.uptime_last_hour, 0.0);
        assert_eq!(row.downtime_last_hour, 60.0);
        assert_eq!(row.uptime_last_day, 0.0);
        assert_eq!(row.downtime_last_day, 24.0);
        assert_eq!(row.uptime_last_week, 0.0);
        assert_eq!(row.downtime_last_week, 168.0);
    }

    #[test]
    fn missing_metadata_does_not_change_numbers() -> Result<(), StoreError> {
        let mut with_meta = MemoryStore::new();
        register(&mut with_meta, "s1");
        let mut without_meta = MemoryStore::new();
        for store in [&mut with_meta, &mut without_meta] {
            observe(store, "s1", 5, true);
            observe(store, "s1", 15, false);
            observe(store, "s1", 300, true);
        }
        let mut ctx_with = context(with_meta);
        let mut ctx_without = context(without_meta);

        let row_with = build_store_report(&mut ctx_with, "s1").into_row();
        let row_without = build_store_report(&mut ctx_without, "s1").into_row();

        assert_eq!(row_with, row_without);
        let mut cache = MetadataCache::new("America/Chicago");
        assert_eq!(cache.timezone(ctx_without.store(), "s1")?, "America/Chicago");
        assert_eq!(cache.open_hours(ctx_without.store(), "s1")?.len(), 7);
        assert_eq!(ctx_without.metadata().cached_stores(), 1);
        Ok(())
    }

    #[test]
    fn failing_store_is_contained() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            register(&mut store, id);
            observe(&mut store, id, 10, true);
            observe(&mut store, id, 20, false);
        }
        store.fail_observations_for("b");

        let table = build_report_table(&mut context(store), 50)?;

        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.contained_failures, 1);
        assert_eq!(table.rows[1], ReportRow::zeroed("b"));
        for row in [&table.rows[0], &table.rows[2]] {
            assert_eq!(row.uptime_last_hour, 30.0);
            assert_eq!(row.downtime_last_hour, 30.0);
        }
        Ok(())
    }

    #[test]
    fn listing_failure_aborts_run() {
        let mut store = MemoryStore::new();
        store.failures_mut().list_fails = true;

        let result = build_report_table(&mut context(store), 50);

        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }

    #[test]
    fn watermark_failure_aborts_run() {
        let mut store = MemoryStore::new();
        register(&mut store, "a");
        observe(&mut store, "a", 1, true);
        store.failures_mut().max_timestamp_fails = true;

        let result = build_report_table(&mut context(store), 50);

        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }

    #[test]
    fn small_batches_cover_every_store() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        let ids: Vec<String> = (0..7).map(|i| format!("store-{i:02}")).collect();
        for id in &ids {
            register(&mut store, id);
            observe(&mut store, id, 3, true);
        }

        let table = build_report_table(&mut context(store), 2)?;

        let row_ids: Vec<_> = table.rows.iter().map(|row| row.store_id.clone()).collect();
        assert_eq!(row_ids, ids);
        Ok(())
    }

    #[test]
    fn rerun_on_unchanged_data_is_identical() -> Result<(), AppError> {
        let mut store = MemoryStore::new();
        for (offset, id) in ["a", "b"].into_iter().enumerate() {
            register(&mut store, id);
            for minute in 0..40 {
                observe(&mut store, id, minute * 37, (minute + offset as i64) % 3 != 0);
            }
        }

        let first = build_report_table(&mut context(store.clone()), 50)?;
        let second = build_report_table(&mut context(store), 50)?;

        assert_eq!(first.rows, second.rows);
        Ok(())
    }

    #[test]
    fn generate_report_writes_artifact() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let mut store = MemoryStore::new();
        register(&mut store, "s1");
        observe(&mut store, "s1", 1, true);
        let settings = ReportSettings {
            output_dir: dir.path().join("reports"),
            batch_size: DEFAULT_BATCH_SIZE,
            default_timezone: "America/Chicago".to_string(),
        };

        let path = generate_report(&store, &settings)?;

        assert!(path.starts_with(dir.path().join("reports")));
        let contents = std::fs::read_to_string(&path)?;
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some(REPORT_COLUMNS.join(",").as_str()));
        assert_eq!(lines.next(), Some("s1,60.0,24.0,168.0,0.0,0.0,0.0"));
        Ok(())
    }

    #[test]
    fn generate_report_propagates_storage_failure() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = MemoryStore::new();
        store.failures_mut().list_fails = true;
        let settings = ReportSettings {
            output_dir: dir.path().join("reports"),
            batch_size: DEFAULT_BATCH_SIZE,
            default_timezone: "America/Chicago".to_string(),
        };

        let result = generate_report(&store, &settings);

        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
        assert!(!dir.path().join("reports").exists());
    }
}
