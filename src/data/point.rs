use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::metric::{AutoLabel, MetricKey, MetricKind};
use crate::config::millis;

/// Single observation for a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub metric: MetricKey,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

/// Type-specific content of a data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    /// Plain number, e.g. a load percentage
    Numeric { value: i64 },
    /// Outcome of one probe against a ping target
    Ping {
        /// Zero when the probe did not complete in time
        #[serde(with = "millis")]
        response_time: Duration,
        status_code: u16,
        success: bool,
        message: String,
    },
    /// Periodic system health report
    Health {
        health: i64,
        entries: Vec<HealthEntry>,
    },
    /// Number of log messages of a given severity
    Log { severity: String, count: i64 },
    UserAction { action: String, count: i64 },
    Compilation {
        /// Bytes
        source_size: i64,
        #[serde(with = "millis")]
        compile_time: Duration,
        stage: String,
    },
}

/// One line of a health report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthEntry {
    pub source: String,
    pub kind: MetricKind,
    pub label: AutoLabel,
}

impl DataPoint {
    pub fn new(metric: MetricKey, timestamp: DateTime<Utc>, payload: Payload) -> Self {
        Self {
            metric,
            timestamp,
            payload,
        }
    }

    pub fn numeric(metric: MetricKey, timestamp: DateTime<Utc>, value: i64) -> Self {
        Self::new(metric, timestamp, Payload::Numeric { value })
    }

    pub fn health(metric: MetricKey, timestamp: DateTime<Utc>, health: i64) -> Self {
        Self::new(
            metric,
            timestamp,
            Payload::Health {
                health,
                entries: Vec::new(),
            },
        )
    }

    /// Integer that represents this point in the metric's aggregates.
    ///
    /// Failed pings have no value: a zero latency would drag averages down.
    pub fn normalized_value(&self) -> Option<i64> {
        match &self.payload {
            Payload::Numeric { value } => Some(*value),
            Payload::Ping {
                response_time,
                success,
                ..
            } => success.then(|| response_time.as_millis() as i64),
            Payload::Health { health, .. } => Some(*health),
            Payload::Log { count, .. } => Some(*count),
            Payload::UserAction { count, .. } => Some(*count),
            Payload::Compilation { compile_time, .. } => Some(compile_time.as_millis() as i64),
        }
    }

    /// Probe success flag, `None` for non-ping points
    pub fn ping_success(&self) -> Option<bool> {
        match &self.payload {
            Payload::Ping { success, .. } => Some(*success),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: MetricKind) -> MetricKey {
        MetricKey::new(kind, "src")
    }

    #[test]
    fn test_failed_ping_has_no_normalized_value() {
        let now = Utc::now();
        let ok = DataPoint::new(
            key(MetricKind::Ping),
            now,
            Payload::Ping {
                response_time: Duration::from_millis(120),
                status_code: 200,
                success: true,
                message: "OK".into(),
            },
        );
        let failed = DataPoint::new(
            key(MetricKind::Ping),
            now,
            Payload::Ping {
                response_time: Duration::ZERO,
                status_code: 503,
                success: false,
                message: "Timeout".into(),
            },
        );

        assert_eq!(ok.normalized_value(), Some(120));
        assert_eq!(failed.normalized_value(), None);
        assert_eq!(failed.ping_success(), Some(false));
    }

    #[test]
    fn test_payload_json_shape() {
        let point = DataPoint::numeric(key(MetricKind::CpuLoad), Utc::now(), 42);
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["payload"]["type"], "numeric");
        assert_eq!(json["payload"]["value"], 42);
    }
}
