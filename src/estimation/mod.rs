//! Uptime estimation over trailing windows.
//!
//! Each window is sampled from the raw observations of one store and converted
//! into an uptime/downtime pair by the share of observations marked active.
//! The share is applied uniformly across the whole window: open hours and
//! the spacing between observations do not influence the result.

use crate::store::{ObservationStore, StoreError};
use time::{Duration, OffsetDateTime};
use tracing::trace;

pub mod metadata;
pub mod reference;

pub use metadata::{DailyHours, MetadataCache, WeeklySchedule};
pub use reference::ReferenceTime;

/// Unit in which a window's uptime and downtime are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Minutes,
    Hours,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    LastHour,
    LastDay,
    LastWeek,
}

impl ReportWindow {
    pub const ALL: [ReportWindow; 3] = [Self::LastHour, Self::LastDay, Self::LastWeek];

    pub fn hours(self) -> i64 {
        match self {
            Self::LastHour => 1,
            Self::LastDay => 24,
            Self::LastWeek => 24 * 7,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::hours(self.hours())
    }

    pub fn unit(self) -> WindowUnit {
        match self {
            Self::LastHour => WindowUnit::Minutes,
            Self::LastDay | Self::LastWeek => WindowUnit::Hours,
        }
    }

    /// Window length expressed in its reporting unit.
    pub fn length_in_unit(self) -> f64 {
        match self.unit() {
            WindowUnit::Minutes => (self.hours() * 60) as f64,
            WindowUnit::Hours => self.hours() as f64,
        }
    }

    /// Decimal places kept after rounding.
    pub fn precision(self) -> u32 {
        match self.unit() {
            WindowUnit::Minutes => 1,
            WindowUnit::Hours => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::LastHour => "last_hour",
            Self::LastDay => "last_day",
            Self::LastWeek => "last_week",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowEstimate {
    pub uptime: f64,
    pub downtime: f64,
}

impl WindowEstimate {
    pub const ZERO: WindowEstimate = WindowEstimate {
        uptime: 0.0,
        downtime: 0.0,
    };

    /// Estimate for a window in which nothing was observed: all of it is downtime.
    pub fn unobserved(window: ReportWindow) -> Self {
        Self {
            uptime: 0.0,
            downtime: window.length_in_unit(),
        }
    }

    pub fn from_ratio(window: ReportWindow, ratio: f64) -> Self {
        let length = window.length_in_unit();
        let precision = window.precision();
        Self {
            uptime: round_to(ratio * length, precision),
            downtime: round_to((1.0 - ratio) * length, precision),
        }
    }
}

/// Sample `[reference_time - window, reference_time]` for one store and estimate its uptime.
pub fn estimate_window(
    store: &dyn ObservationStore,
    store_id: &str,
    reference_time: OffsetDateTime,
    window: ReportWindow,
) -> Result<WindowEstimate, StoreError> {
    let start = reference_time - window.duration();
    let observations = store.observations_in_range(store_id, start, reference_time)?;

    if observations.is_empty() {
        return Ok(WindowEstimate::unobserved(window));
    }

    let active = observations
        .iter()
        .filter(|observation| observation.status.is_active())
        .count();
    let ratio = active as f64 / observations.len() as f64;
    trace!(
        store_id,
        window = window.label(),
        samples = observations.len(),
        active,
        "Window sampled"
    );

    Ok(WindowEstimate::from_ratio(window, ratio))
}

/// Round the exact binary value of `value` to `decimals` places, ties to even.
///
/// Float formatting works on the exact value, so `0.25` becomes `0.2` and
/// `11.25` becomes `11.2`, while `0.35` (stored just below) becomes `0.3`.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let precision = decimals as usize;
    format!("{value:.precision$}").parse().unwrap_or(value)
}
