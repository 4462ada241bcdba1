use crate::estimation::round_to;
use crate::report::{ReportRow, ReportTable};
use tracing::info;

/// Aggregate figures logged after each run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub stores: usize,
    pub mean_uptime_last_hour: f64,
    pub mean_uptime_last_day: f64,
    pub mean_uptime_last_week: f64,
    pub zero_uptime_last_hour: usize,
    pub contained_failures: usize,
}

impl ReportSummary {
    pub fn from_table(table: &ReportTable) -> Self {
        let rows = &table.rows;
        Self {
            stores: rows.len(),
            mean_uptime_last_hour: mean(rows, |row| row.uptime_last_hour, 1),
            mean_uptime_last_day: mean(rows, |row| row.uptime_last_day, 2),
            mean_uptime_last_week: mean(rows, |row| row.uptime_last_week, 2),
            zero_uptime_last_hour: rows
                .iter()
                .filter(|row| row.uptime_last_hour == 0.0)
                .count(),
            contained_failures: table.contained_failures,
        }
    }

    pub fn log(&self) {
        info!(
            stores = self.stores,
            mean_uptime_last_hour = self.mean_uptime_last_hour,
            mean_uptime_last_day = self.mean_uptime_last_day,
            mean_uptime_last_week = self.mean_uptime_last_week,
            zero_uptime_last_hour = self.zero_uptime_last_hour,
            contained_failures = self.contained_failures,
            "Report summary"
        );
    }
}

fn mean(rows: &[ReportRow], value: impl Fn(&ReportRow) -> f64, decimals: u32) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let total: f64 = rows.iter().map(value).sum();
    round_to(total / rows.len() as f64, decimals)
}
