use chrono::{DateTime, Duration, Utc};

use crate::data::{AutoLabel, MetricKind};

/// Number of most recent samples the load label is computed from
pub const LABEL_SAMPLES: usize = 5;
pub const CRITICAL_LOAD: f64 = 90.0;
pub const WARNING_LOAD: f64 = 50.0;

/// Running min/max/sum over integer samples
#[derive(Debug, Clone, Default)]
pub struct RangeAccumulator {
    min: Option<i64>,
    max: Option<i64>,
    sum: i128,
    count: u64,
}

/// Finished min/max/avg of a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Range {
    pub min: i64,
    pub max: i64,
    /// Rounded to the nearest integer
    pub avg: i64,
}

impl RangeAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accumulate(&mut self, value: i64) {
        self.min = Some(self.min.map_or(value, |m| m.min(value)));
        self.max = Some(self.max.map_or(value, |m| m.max(value)));
        self.sum += value as i128;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &RangeAccumulator) {
        if let Some(min) = other.min {
            self.min = Some(self.min.map_or(min, |m| m.min(min)));
        }
        if let Some(max) = other.max {
            self.max = Some(self.max.map_or(max, |m| m.max(max)));
        }
        self.sum += other.sum;
        self.count += other.count;
    }

    /// `None` for an empty window
    pub fn result(&self) -> Option<Range> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(Range {
                min,
                max,
                avg: (self.sum as f64 / self.count as f64).round() as i64,
            }),
            _ => None,
        }
    }
}

/// Rolling statistics for one metric over the last day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowStats {
    pub current: i64,
    pub last_updated: DateTime<Utc>,
    pub day: Range,
    /// Zeroed when the last hour holds no samples
    pub hour: Range,
    pub label: AutoLabel,
}

impl WindowStats {
    /// Compute statistics from `(timestamp, value)` samples.
    ///
    /// Samples need not be ordered; anything older than a day before `now`
    /// is ignored. Returns `None` when no sample falls in the window.
    pub fn compute(kind: MetricKind, samples: &[(DateTime<Utc>, i64)], now: DateTime<Utc>) -> Option<Self> {
        let day_start = now - Duration::hours(24);
        let hour_start = now - Duration::hours(1);

        let mut window: Vec<(DateTime<Utc>, i64)> = samples
            .iter()
            .copied()
            .filter(|(ts, _)| *ts >= day_start)
            .collect();
        window.sort_by_key(|(ts, _)| *ts);

        let (last_updated, current) = *window.last()?;

        let mut day = RangeAccumulator::new();
        let mut hour = RangeAccumulator::new();
        for &(ts, value) in &window {
            day.accumulate(value);
            if ts >= hour_start {
                hour.accumulate(value);
            }
        }

        let recent: Vec<i64> = window.iter().rev().take(LABEL_SAMPLES).map(|(_, v)| *v).collect();

        Some(Self {
            current,
            last_updated,
            day: day.result().unwrap_or_default(),
            hour: hour.result().unwrap_or_default(),
            label: classify(kind, &recent),
        })
    }
}

/// Label for a metric given its most recent values.
///
/// Only load is classified; everything else stays `Normal`.
pub fn classify(kind: MetricKind, recent: &[i64]) -> AutoLabel {
    match kind {
        MetricKind::CpuLoad if recent.len() >= LABEL_SAMPLES => {
            let window = &recent[..LABEL_SAMPLES];
            let avg = window.iter().sum::<i64>() as f64 / LABEL_SAMPLES as f64;
            if avg >= CRITICAL_LOAD {
                AutoLabel::Critical
            } else if avg >= WARNING_LOAD {
                AutoLabel::Warning
            } else {
                AutoLabel::Normal
            }
        }
        _ => AutoLabel::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_accumulator() {
        let mut acc = RangeAccumulator::new();
        assert_eq!(acc.result(), None);

        for v in [3, 1, 4] {
            acc.accumulate(v);
        }
        let mut other = RangeAccumulator::new();
        other.accumulate(10);
        acc.merge(&other);

        // (3 + 1 + 4 + 10) / 4 = 4.5 rounds up
        assert_eq!(acc.result(), Some(Range { min: 1, max: 10, avg: 5 }));
    }

    #[test]
    fn test_compute_day_and_hour_windows() {
        let now = Utc::now();
        let samples = vec![
            (now - Duration::hours(30), 1000),
            (now - Duration::hours(5), 10),
            (now - Duration::hours(2), 30),
            (now - Duration::minutes(30), 20),
            (now - Duration::minutes(10), 40),
        ];

        let stats = WindowStats::compute(MetricKind::Log, &samples, now).unwrap();

        assert_eq!(stats.current, 40);
        assert_eq!(stats.last_updated, now - Duration::minutes(10));
        assert_eq!(stats.day, Range { min: 10, max: 40, avg: 25 });
        assert_eq!(stats.hour, Range { min: 20, max: 40, avg: 30 });
        assert_eq!(stats.label, AutoLabel::Normal);
    }

    #[test]
    fn test_empty_hour_is_zeroed() {
        let now = Utc::now();
        let samples = vec![(now - Duration::hours(3), 7)];

        let stats = WindowStats::compute(MetricKind::CpuLoad, &samples, now).unwrap();

        assert_eq!(stats.hour, Range::default());
        assert_eq!(stats.day, Range { min: 7, max: 7, avg: 7 });
    }

    #[test]
    fn test_no_samples_in_window() {
        let now = Utc::now();
        assert!(WindowStats::compute(MetricKind::CpuLoad, &[], now).is_none());
        assert!(WindowStats::compute(MetricKind::CpuLoad, &[(now - Duration::days(2), 1)], now).is_none());
    }

    #[test]
    fn test_classify_load() {
        assert_eq!(classify(MetricKind::CpuLoad, &[95, 90, 92, 88, 91]), AutoLabel::Critical);
        assert_eq!(classify(MetricKind::CpuLoad, &[50, 50, 50, 50, 50]), AutoLabel::Warning);
        assert_eq!(classify(MetricKind::CpuLoad, &[10, 20, 30, 40, 49]), AutoLabel::Normal);
        // Fewer than five samples
        assert_eq!(classify(MetricKind::CpuLoad, &[99, 99, 99, 99]), AutoLabel::Normal);
        // Other kinds are never classified
        assert_eq!(classify(MetricKind::Ping, &[5000; 5]), AutoLabel::Normal);
    }

    #[test]
    fn test_label_uses_most_recent_samples() {
        let now = Utc::now();
        let mut samples: Vec<(DateTime<Utc>, i64)> =
            (0..5).map(|i| (now - Duration::minutes(60 - i), 10)).collect();
        samples.extend((0..5).map(|i| (now - Duration::minutes(5 - i), 95)));

        let stats = WindowStats::compute(MetricKind::CpuLoad, &samples, now).unwrap();
        assert_eq!(stats.label, AutoLabel::Critical);
    }
}
