use crate::store::{
    Observation, ObservationStore, OpenHoursWindow, StoreConnector, StoreError, StoreId,
    StoreTimezone,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use time::OffsetDateTime;

/// Injected failures for exercising error paths without a database.
#[derive(Debug, Clone, Default)]
pub struct MemoryFailures {
    pub list_fails: bool,
    pub max_timestamp_fails: bool,
    pub observation_reads_fail_for: HashSet<StoreId>,
    pub metadata_reads_fail_for: HashSet<StoreId>,
}

/// In-process observation store. Cloning yields an independent session over a copy of the data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    observations: HashMap<StoreId, Vec<Observation>>,
    open_hours: HashMap<StoreId, Vec<OpenHoursWindow>>,
    timezones: HashMap<StoreId, String>,
    failures: MemoryFailures,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observation(&mut self, observation: Observation) {
        let rows = self
            .observations
            .entry(observation.store_id.clone())
            .or_default();
        let position = rows.partition_point(|row| row.timestamp_utc <= observation.timestamp_utc);
        rows.insert(position, observation);
    }

    pub fn add_open_hours(&mut self, window: OpenHoursWindow) {
        self.open_hours
            .entry(window.store_id.clone())
            .or_default()
            .push(window);
    }

    pub fn set_timezone(&mut self, timezone: StoreTimezone) {
        self.timezones.insert(timezone.store_id, timezone.timezone);
    }

    pub fn failures_mut(&mut self) -> &mut MemoryFailures {
        &mut self.failures
    }

    pub fn fail_observations_for(&mut self, store_id: &str) {
        self.failures
            .observation_reads_fail_for
            .insert(store_id.to_string());
    }

    fn unavailable(what: &str) -> StoreError {
        StoreError::Unavailable(format!("injected failure: {what}"))
    }
}

impl ObservationStore for MemoryStore {
    fn list_eligible_store_ids(&self) -> Result<Vec<StoreId>, StoreError> {
        if self.failures.list_fails {
            return Err(Self::unavailable("list eligible stores"));
        }
        let ids: BTreeSet<&StoreId> = self
            .observations
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(id, _)| id)
            .filter(|id| self.open_hours.contains_key(*id) && self.timezones.contains_key(*id))
            .collect();
        Ok(ids.into_iter().cloned().collect())
    }

    fn observations_in_range(
        &self,
        store_id: &str,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<Observation>, StoreError> {
        if self.failures.observation_reads_fail_for.contains(store_id) {
            return Err(Self::unavailable(&format!("observations for {store_id}")));
        }
        Ok(self
            .observations
            .get(store_id)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.timestamp_utc >= start && row.timestamp_utc <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn timezone(&self, store_id: &str) -> Result<Option<String>, StoreError> {
        if self.failures.metadata_reads_fail_for.contains(store_id) {
            return Err(Self::unavailable(&format!("timezone for {store_id}")));
        }
        Ok(self.timezones.get(store_id).cloned())
    }

    fn open_hours(&self, store_id: &str) -> Result<Vec<OpenHoursWindow>, StoreError> {
        if self.failures.metadata_reads_fail_for.contains(store_id) {
            return Err(Self::unavailable(&format!("open hours for {store_id}")));
        }
        Ok(self.open_hours.get(store_id).cloned().unwrap_or_default())
    }

    fn max_observation_timestamp(&self) -> Result<Option<OffsetDateTime>, StoreError> {
        if self.failures.max_timestamp_fails {
            return Err(Self::unavailable("max observation timestamp"));
        }
        Ok(self
            .observations
            .values()
            .filter_map(|rows| rows.last())
            .map(|row| row.timestamp_utc)
            .max())
    }
}

impl StoreConnector for MemoryStore {
    fn connect(&self) -> Result<Box<dyn ObservationStore + Send>, StoreError> {
        Ok(Box::new(self.clone()))
    }
}
