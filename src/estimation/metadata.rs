use crate::store::{DAYS_PER_WEEK, ObservationStore, StoreError, StoreId};
use std::collections::{BTreeMap, HashMap};
use time::Time;
use time::macros::time;

pub const DEFAULT_TIMEZONE: &str = "America/Chicago";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyHours {
    pub open: Time,
    pub close: Time,
}

impl DailyHours {
    pub const ALL_DAY: DailyHours = DailyHours {
        open: time!(0:00),
        close: time!(23:59:59),
    };
}

/// Local opening hours keyed by day of week (0 = Monday).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: BTreeMap<u8, DailyHours>,
}

impl WeeklySchedule {
    /// Open every hour of every day.
    pub fn always_open() -> Self {
        Self {
            days: (0..DAYS_PER_WEEK)
                .map(|day| (day, DailyHours::ALL_DAY))
                .collect(),
        }
    }

    pub fn day(&self, day_of_week: u8) -> Option<DailyHours> {
        self.days.get(&day_of_week).copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Per-run memo of store timezones and weekly schedules.
///
/// Entries are never evicted; the cache lives exactly as long as the run that owns it.
#[derive(Debug)]
pub struct MetadataCache {
    default_timezone: String,
    timezones: HashMap<StoreId, String>,
    schedules: HashMap<StoreId, WeeklySchedule>,
}

impl MetadataCache {
    pub fn new(default_timezone: impl Into<String>) -> Self {
        Self {
            default_timezone: default_timezone.into(),
            timezones: HashMap::new(),
            schedules: HashMap::new(),
        }
    }

    pub fn timezone(
        &mut self,
        store: &dyn ObservationStore,
        store_id: &str,
    ) -> Result<&str, StoreError> {
        if !self.timezones.contains_key(store_id) {
            let zone = store
                .timezone(store_id)?
                .unwrap_or_else(|| self.default_timezone.clone());
            self.timezones.insert(store_id.to_string(), zone);
        }
        Ok(self.timezones[store_id].as_str())
    }

    pub fn open_hours(
        &mut self,
        store: &dyn ObservationStore,
        store_id: &str,
    ) -> Result<&WeeklySchedule, StoreError> {
        if !self.schedules.contains_key(store_id) {
            let rows = store.open_hours(store_id)?;
            let schedule = if rows.is_empty() {
                WeeklySchedule::always_open()
            } else {
                WeeklySchedule {
                    days: rows
                        .into_iter()
                        .map(|row| {
                            (
                                row.day_of_week,
                                DailyHours {
                                    open: row.open_local,
                                    close: row.close_local,
                                },
                            )
                        })
                        .collect(),
                }
            };
            self.schedules.insert(store_id.to_string(), schedule);
        }
        Ok(&self.schedules[store_id])
    }

    /// Stores whose schedule has been loaded; timezones are filled in the same pass.
    pub fn cached_stores(&self) -> usize {
        self.schedules.len()
    }
}
