use chrono::{DateTime, Duration, Utc};

use super::runs::offending_runs;
use crate::data::{Discrepancy, DiscrepancyKind, MetricKey};

/// Gaps between consecutive samples of at least 1.5 times `max_difference`.
///
/// Each gap is reported at the timestamp of the sample that precedes it.
pub fn find_gaps(metric: &MetricKey, timestamps: &[DateTime<Utc>], max_difference: Duration) -> Vec<Discrepancy> {
    // No representable gap reaches an overflowing limit
    let Some(limit) = max_difference.checked_add(&(max_difference / 2)) else {
        return Vec::new();
    };

    let mut ordered = timestamps.to_vec();
    ordered.sort();

    ordered
        .windows(2)
        .filter(|pair| pair[1] - pair[0] >= limit)
        .map(|pair| Discrepancy::new(DiscrepancyKind::GapInData, metric, pair[0]))
        .collect()
}

/// Runs of more than `max_consecutive` load samples at or above `threshold`
pub fn find_high_loads(
    metric: &MetricKey,
    samples: &[(DateTime<Utc>, i64)],
    threshold: i64,
    max_consecutive: u32,
) -> Vec<Discrepancy> {
    let classified: Vec<(DateTime<Utc>, bool)> = samples
        .iter()
        .map(|&(ts, value)| (ts, load_ok(value, threshold)))
        .collect();

    offending_runs(&classified, max_consecutive)
        .into_iter()
        .map(|start| Discrepancy::new(DiscrepancyKind::HighLoad, metric, start))
        .collect()
}

/// Runs of more than `max_failures` failed probes
pub fn find_ping_failures(metric: &MetricKey, samples: &[(DateTime<Utc>, bool)], max_failures: u32) -> Vec<Discrepancy> {
    offending_runs(samples, max_failures)
        .into_iter()
        .map(|start| Discrepancy::new(DiscrepancyKind::PingFailedNTimes, metric, start))
        .collect()
}

/// Runs of more than `max_consecutive` health reports below `threshold`
pub fn find_low_healths(
    metric: &MetricKey,
    samples: &[(DateTime<Utc>, i64)],
    threshold: i64,
    max_consecutive: u32,
) -> Vec<Discrepancy> {
    let classified: Vec<(DateTime<Utc>, bool)> = samples
        .iter()
        .map(|&(ts, health)| (ts, health_ok(health, threshold)))
        .collect();

    offending_runs(&classified, max_consecutive)
        .into_iter()
        .map(|start| Discrepancy::new(DiscrepancyKind::LowHealth, metric, start))
        .collect()
}

pub(crate) fn load_ok(value: i64, threshold: i64) -> bool {
    value < threshold
}

pub(crate) fn health_ok(health: i64, threshold: i64) -> bool {
    health >= threshold
}
