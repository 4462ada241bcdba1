use crate::store::{ObservationStore, StoreError};
use time::OffsetDateTime;
use tracing::{info, warn};

/// The single "now" that anchors every window of a run.
///
/// Resolved lazily on first use as the latest observation across all stores, or the
/// wall clock when nothing has been observed yet. Once resolved it never changes for
/// the lifetime of the run.
#[derive(Debug, Default)]
pub struct ReferenceTime {
    resolved: Option<OffsetDateTime>,
}

impl ReferenceTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, store: &dyn ObservationStore) -> Result<OffsetDateTime, StoreError> {
        self.get_or_fallback(store, OffsetDateTime::now_utc)
    }

    fn get_or_fallback(
        &mut self,
        store: &dyn ObservationStore,
        wall_clock: impl FnOnce() -> OffsetDateTime,
    ) -> Result<OffsetDateTime, StoreError> {
        if let Some(resolved) = self.resolved {
            return Ok(resolved);
        }

        let resolved = match store.max_observation_timestamp()? {
            Some(watermark) => {
                info!(reference_time = %watermark, "Reference time resolved from observations");
                watermark
            }
            None => {
                let now = wall_clock();
                warn!(reference_time = %now, "No observations found, using wall clock as reference time");
                now
            }
        };
        self.resolved = Some(resolved);
        Ok(resolved)
    }

    pub fn resolved(&self) -> Option<OffsetDateTime> {
        self.resolved
    }
}
