//! Rebalance calendar: scheduled calendar dates resolved onto trading dates.

use chrono::{Days, NaiveDate};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceDate {
    /// Calendar date produced by stepping `holding_period` days.
    pub scheduled: NaiveDate,
    /// Most recent date with data on or before `scheduled`.
    pub effective: NaiveDate,
}

/// `start, start + hp, start + 2hp, ...` while `<= end`.
pub fn scheduled_dates(start: NaiveDate, end: NaiveDate, holding_period: u64) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    if holding_period == 0 {
        return dates;
    }

    let mut current = start;
    while current <= end {
        dates.push(current);
        match current.checked_add_days(Days::new(holding_period)) {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

/// Resolves each scheduled date against a sorted `timeline`.
///
/// Dates with no data on or before them are skipped. A scheduled date
/// resolving to the same effective date as the previous event is dropped.
pub fn resolve_rebalance_dates(
    timeline: &[NaiveDate],
    start: NaiveDate,
    end: NaiveDate,
    holding_period: u64,
) -> Vec<RebalanceDate> {
    let mut resolved: Vec<RebalanceDate> = Vec::new();

    for scheduled in scheduled_dates(start, end, holding_period) {
        let idx = timeline.partition_point(|d| *d <= scheduled);
        let Some(&effective) = idx.checked_sub(1).and_then(|i| timeline.get(i)) else {
            warn!(%scheduled, "no data on or before scheduled date, skipping");
            continue;
        };

        if resolved.last().is_some_and(|prev| prev.effective == effective) {
            continue;
        }
        resolved.push(RebalanceDate {
            scheduled,
            effective,
        });
    }

    resolved
}
