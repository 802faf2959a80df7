//! System health reports

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::data::{AutoLabel, DataPoint, HealthEntry, MetricKey, MetricKind, Payload};
use crate::storage::{MetricStore, StoreError};

/// Source of the health metric the reports are stored under
pub const HEALTH_SOURCE: &str = "system";

/// Builds periodic health reports from the labels of public metrics
pub struct HealthReporter {
    store: Arc<dyn MetricStore>,
}

impl HealthReporter {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Report on every public, non-health metric. `None` when there is nothing to report on.
    pub async fn report(&self, now: DateTime<Utc>) -> Result<Option<DataPoint>, StoreError> {
        let entries: Vec<HealthEntry> = self
            .store
            .metrics(None)
            .await?
            .into_iter()
            .filter(|m| m.public && m.kind != MetricKind::Health)
            .map(|m| HealthEntry {
                source: m.source,
                kind: m.kind,
                label: m.auto_label,
            })
            .collect();

        if entries.is_empty() {
            debug!("No public metrics, skipping health report");
            return Ok(None);
        }

        let health = health_score(&entries);
        debug!(health, entries = entries.len(), "Health report built");

        Ok(Some(DataPoint::new(
            MetricKey::new(MetricKind::Health, HEALTH_SOURCE),
            now,
            Payload::Health { health, entries },
        )))
    }
}

/// Mean of per-entry scores, rounded: Normal 100, Warning 50, Critical 0
pub fn health_score(entries: &[HealthEntry]) -> i64 {
    if entries.is_empty() {
        return 100;
    }
    let total: i64 = entries
        .iter()
        .map(|e| match e.label {
            AutoLabel::Normal => 100,
            AutoLabel::Warning => 50,
            AutoLabel::Critical => 0,
        })
        .sum();
    (total as f64 / entries.len() as f64).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Metric;
    use crate::storage::{ChangeSet, MemoryStore};

    #[tokio::test]
    async fn test_report_over_public_metrics() {
        let store = Arc::new(MemoryStore::new());
        let mut hot = Metric::new(MetricKind::CpuLoad, "web-1");
        hot.auto_label = AutoLabel::Critical;
        let mut warm = Metric::new(MetricKind::CpuLoad, "web-2");
        warm.auto_label = AutoLabel::Warning;
        let ping = Metric::new(MetricKind::Ping, "a.example");
        // Private, left out
        let mut log = Metric::new(MetricKind::Log, "web-1");
        log.auto_label = AutoLabel::Critical;

        store
            .apply(ChangeSet {
                metrics: vec![hot, warm, ping, log],
                ..Default::default()
            })
            .await
            .unwrap();

        let reporter = HealthReporter::new(store);
        let point = reporter.report(Utc::now()).await.unwrap().unwrap();

        assert_eq!(point.metric, MetricKey::new(MetricKind::Health, "system"));
        match point.payload {
            Payload::Health { health, entries } => {
                assert_eq!(entries.len(), 3);
                assert_eq!(health, 50);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_metrics_no_report() {
        let reporter = HealthReporter::new(Arc::new(MemoryStore::new()));
        assert!(reporter.report(Utc::now()).await.unwrap().is_none());
    }

    #[test]
    fn test_health_score_rounds() {
        let entry = |label| HealthEntry {
            source: "s".into(),
            kind: MetricKind::CpuLoad,
            label,
        };
        let entries = vec![entry(AutoLabel::Normal), entry(AutoLabel::Normal), entry(AutoLabel::Warning)];
        assert_eq!(health_score(&entries), 83);
    }
}
