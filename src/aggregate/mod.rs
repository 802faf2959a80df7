//! Rolling statistics and auto labels for metrics

pub mod stats;

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::data::{Metric, MetricKey};
use crate::storage::{ChangeSet, MetricStore, StoreError};

pub use stats::{classify, Range, RangeAccumulator, WindowStats};

/// Recomputes the cached aggregates of metrics
pub struct MetricAggregator {
    store: Arc<dyn MetricStore>,
}

impl MetricAggregator {
    pub fn new(store: Arc<dyn MetricStore>) -> Self {
        Self { store }
    }

    /// Compute the updated aggregate for `metric` without persisting it.
    ///
    /// Returns `None` when the metric has no valued samples in the last day.
    pub async fn aggregate(
        &self,
        metric: &Metric,
        now: DateTime<Utc>,
    ) -> Result<Option<Metric>, AggregateError> {
        let key = metric.key();
        let points = self.store.data_points(&key, now - Duration::hours(24)).await?;
        let samples: Vec<(DateTime<Utc>, i64)> = points
            .iter()
            .filter_map(|p| p.normalized_value().map(|v| (p.timestamp, v)))
            .collect();

        let Some(stats) = WindowStats::compute(metric.kind, &samples, now) else {
            debug!(metric = %key, "No samples to aggregate");
            return Ok(None);
        };

        let mut updated = metric.clone();
        updated.current_value = stats.current;
        updated.last_updated = Some(stats.last_updated);
        updated.day_min = stats.day.min;
        updated.day_max = stats.day.max;
        updated.day_avg = stats.day.avg;
        updated.hour_min = stats.hour.min;
        updated.hour_max = stats.hour.max;
        updated.hour_avg = stats.hour.avg;
        updated.auto_label = stats.label;

        debug!(
            metric = %key,
            current = updated.current_value,
            label = %updated.auto_label,
            "Aggregated metric"
        );
        Ok(Some(updated))
    }

    /// Aggregate one metric and persist the result
    pub async fn refresh(&self, key: &MetricKey) -> Result<Option<Metric>, AggregateError> {
        let metric = self
            .store
            .metric(key)
            .await?
            .ok_or_else(|| StoreError::MetricNotFound(key.clone()))?;

        let updated = self.aggregate(&metric, Utc::now()).await?;
        if let Some(updated) = &updated {
            self.store
                .apply(ChangeSet {
                    metrics: vec![updated.clone()],
                    ..Default::default()
                })
                .await?;
        }
        Ok(updated)
    }
}

/// Aggregation errors
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{AutoLabel, DataPoint, MetricKind, Payload};
    use crate::storage::MemoryStore;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn test_refresh_persists_aggregate() {
        let store = Arc::new(MemoryStore::new());
        let key = MetricKey::new(MetricKind::CpuLoad, "web-1");
        let now = Utc::now();
        for (i, v) in [92, 95, 90, 91, 99].into_iter().enumerate() {
            store.insert_data_point(DataPoint::numeric(
                key.clone(),
                now - Duration::minutes(10 - i as i64),
                v,
            ));
        }

        let aggregator = MetricAggregator::new(store.clone());
        aggregator.refresh(&key).await.unwrap();

        let metric = store.metric(&key).await.unwrap().unwrap();
        assert_eq!(metric.current_value, 99);
        assert_eq!(metric.day_min, 90);
        assert_eq!(metric.day_max, 99);
        assert_eq!(metric.auto_label, AutoLabel::Critical);
    }

    #[tokio::test]
    async fn test_failed_pings_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let key = MetricKey::new(MetricKind::Ping, "a.example");
        let now = Utc::now();
        let ping = |ms: u64, success: bool| Payload::Ping {
            response_time: StdDuration::from_millis(ms),
            status_code: if success { 200 } else { 503 },
            success,
            message: String::new(),
        };
        store.insert_data_point(DataPoint::new(key.clone(), now - Duration::minutes(2), ping(100, true)));
        store.insert_data_point(DataPoint::new(key.clone(), now - Duration::minutes(1), ping(0, false)));

        let aggregator = MetricAggregator::new(store.clone());
        let metric = store.metric(&key).await.unwrap().unwrap();
        let updated = aggregator.aggregate(&metric, now).await.unwrap().unwrap();

        assert_eq!(updated.current_value, 100);
        assert_eq!(updated.hour_min, 100);
    }

    #[tokio::test]
    async fn test_empty_metric_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let metric = store.get_or_create_metric(MetricKind::Log, "web-1").await.unwrap();

        let aggregator = MetricAggregator::new(store.clone());
        assert!(aggregator.refresh(&metric.key()).await.unwrap().is_none());
        assert_eq!(store.metric(&metric.key()).await.unwrap().unwrap(), metric);
    }

    #[tokio::test]
    async fn test_refresh_missing_metric() {
        let aggregator = MetricAggregator::new(Arc::new(MemoryStore::new()));
        let key = MetricKey::new(MetricKind::Log, "nowhere");
        assert!(matches!(
            aggregator.refresh(&key).await,
            Err(AggregateError::Store(StoreError::MetricNotFound(_)))
        ));
    }
}
