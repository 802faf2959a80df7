use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a metric. The numeric ids are stable and used in storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    CpuLoad = 1,
    UserAction = 2,
    Compilation = 3,
    Log = 4,
    Ping = 5,
    Health = 6,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::CpuLoad,
        MetricKind::UserAction,
        MetricKind::Compilation,
        MetricKind::Log,
        MetricKind::Ping,
        MetricKind::Health,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    /// Human-readable title used when a metric is created lazily
    pub fn title(self) -> &'static str {
        match self {
            MetricKind::CpuLoad => "CPU load",
            MetricKind::UserAction => "User actions",
            MetricKind::Compilation => "Compilation",
            MetricKind::Log => "Log entries",
            MetricKind::Ping => "Ping",
            MetricKind::Health => "System health",
        }
    }

    /// Whether metrics of this kind are public when created
    pub fn public_by_default(self) -> bool {
        matches!(self, MetricKind::CpuLoad | MetricKind::Ping)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::CpuLoad => "cpu_load",
            MetricKind::UserAction => "user_action",
            MetricKind::Compilation => "compilation",
            MetricKind::Log => "log",
            MetricKind::Ping => "ping",
            MetricKind::Health => "health",
        };
        f.write_str(name)
    }
}

/// Identity of a metric: (kind, source) is unique
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    pub kind: MetricKind,
    pub source: String,
}

impl MetricKey {
    pub fn new(kind: MetricKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.source)
    }
}

/// Label assigned automatically by the aggregator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoLabel {
    #[default]
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for AutoLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AutoLabel::Normal => "normal",
            AutoLabel::Warning => "warning",
            AutoLabel::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Current state of a metric.
///
/// A metric is a category of data points, not a data point itself. The
/// numeric fields are a cached snapshot recomputed by the aggregator on each
/// cache cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub kind: MetricKind,
    pub source: String,
    pub title: String,
    pub public: bool,
    pub auto_label: AutoLabel,
    /// Timestamp of the sample `current_value` was taken from
    pub last_updated: Option<DateTime<Utc>>,
    pub current_value: i64,
    pub hour_min: i64,
    pub hour_max: i64,
    pub hour_avg: i64,
    pub day_min: i64,
    pub day_max: i64,
    pub day_avg: i64,
}

impl Metric {
    /// Create an empty metric with defaults derived from its kind
    pub fn new(kind: MetricKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            source: source.into(),
            title: kind.title().to_string(),
            public: kind.public_by_default(),
            auto_label: AutoLabel::Normal,
            last_updated: None,
            current_value: 0,
            hour_min: 0,
            hour_max: 0,
            hour_avg: 0,
            day_min: 0,
            day_max: 0,
            day_avg: 0,
        }
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.kind, self.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metric_defaults() {
        let cpu = Metric::new(MetricKind::CpuLoad, "web-1");
        assert!(cpu.public);
        assert_eq!(cpu.auto_label, AutoLabel::Normal);
        assert_eq!(cpu.title, "CPU load");

        let log = Metric::new(MetricKind::Log, "web-1");
        assert!(!log.public);
    }

    #[test]
    fn test_kind_ids_are_stable() {
        let ids: Vec<u8> = MetricKind::ALL.iter().map(|k| k.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }
}
