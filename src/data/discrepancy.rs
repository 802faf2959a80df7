use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::metric::{MetricKey, MetricKind};
use super::zone::DisplayZone;

/// Kind of anomaly a discrepancy records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    GapInData,
    PingFailedNTimes,
    HighLoad,
    LowHealth,
}

impl DiscrepancyKind {
    /// Metric kind this discrepancy kind is detected on
    pub fn metric_kind(self) -> MetricKind {
        match self {
            DiscrepancyKind::GapInData | DiscrepancyKind::HighLoad => MetricKind::CpuLoad,
            DiscrepancyKind::PingFailedNTimes => MetricKind::Ping,
            DiscrepancyKind::LowHealth => MetricKind::Health,
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscrepancyKind::GapInData => "gap_in_data",
            DiscrepancyKind::PingFailedNTimes => "ping_failed_n_times",
            DiscrepancyKind::HighLoad => "high_load",
            DiscrepancyKind::LowHealth => "low_health",
        };
        f.write_str(name)
    }
}

/// Natural key of a discrepancy
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscrepancyKey {
    pub kind: DiscrepancyKind,
    pub metric_kind: MetricKind,
    pub metric_source: String,
    pub date_first_offense: DateTime<Utc>,
}

/// A recorded anomaly finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub kind: DiscrepancyKind,
    pub metric_kind: MetricKind,
    pub metric_source: String,
    /// Well-defined start of the problem
    pub date_first_offense: DateTime<Utc>,
    pub resolved: bool,
    pub date_resolved: Option<DateTime<Utc>>,
}

impl Discrepancy {
    /// New, unresolved discrepancy for a metric
    pub fn new(kind: DiscrepancyKind, metric: &MetricKey, date_first_offense: DateTime<Utc>) -> Self {
        Self {
            kind,
            metric_kind: metric.kind,
            metric_source: metric.source.clone(),
            date_first_offense,
            resolved: false,
            date_resolved: None,
        }
    }

    pub fn key(&self) -> DiscrepancyKey {
        DiscrepancyKey {
            kind: self.kind,
            metric_kind: self.metric_kind,
            metric_source: self.metric_source.clone(),
            date_first_offense: self.date_first_offense,
        }
    }

    pub fn metric_key(&self) -> MetricKey {
        MetricKey::new(self.metric_kind, self.metric_source.clone())
    }

    /// Human-readable description with the offense rendered in `zone`
    pub fn describe(&self, zone: &DisplayZone) -> String {
        let when = zone.format(self.date_first_offense);
        match self.kind {
            DiscrepancyKind::GapInData => format!(
                "Gap in data from {} has been detected. The gap starts on {}.",
                self.metric_source, when
            ),
            DiscrepancyKind::HighLoad => {
                format!("{} reported high load starting from {}.", self.metric_source, when)
            }
            DiscrepancyKind::PingFailedNTimes => format!(
                "Requests to {} failed too many consecutive times. First failure occurred on {}.",
                self.metric_source, when
            ),
            DiscrepancyKind::LowHealth => format!(
                "System health reported by {} has been low starting from {}.",
                self.metric_source, when
            ),
        }
    }
}
