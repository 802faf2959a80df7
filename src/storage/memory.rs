use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{ChangeSet, DiscrepancyFilter, MetricStore, RetentionStats, StoreError};
use crate::data::{
    DataPoint, Discrepancy, DiscrepancyKey, Metric, MetricKey, MetricKind, Notification,
    PingSetting, Severity,
};

/// In-memory metric store
pub struct MemoryStore {
    /// Metrics indexed by (kind, source)
    metrics: DashMap<MetricKey, Metric>,
    /// Data points per metric, kept sorted by timestamp
    points: DashMap<MetricKey, Vec<DataPoint>>,
    /// Discrepancies indexed by natural key
    discrepancies: DashMap<DiscrepancyKey, Discrepancy>,
    /// Notifications indexed by id (ids increase with creation time)
    notifications: RwLock<BTreeMap<u64, Notification>>,
    next_notification_id: AtomicU64,
    ping_settings: RwLock<Vec<PingSetting>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            metrics: DashMap::new(),
            points: DashMap::new(),
            discrepancies: DashMap::new(),
            notifications: RwLock::new(BTreeMap::new()),
            next_notification_id: AtomicU64::new(1),
            ping_settings: RwLock::new(Vec::new()),
        }
    }

    pub fn with_ping_settings(settings: Vec<PingSetting>) -> Self {
        let store = Self::new();
        *store.ping_settings.write() = settings;
        store
    }

    /// Record a sample, creating its metric if needed
    pub fn insert_data_point(&self, point: DataPoint) {
        self.ensure_metric(&point.metric);
        let mut series = self.points.entry(point.metric.clone()).or_default();
        insert_sorted(&mut series, point);
    }

    /// Number of stored data points across all metrics
    pub fn data_point_count(&self) -> usize {
        self.points.iter().map(|e| e.value().len()).sum()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.read().len()
    }

    fn ensure_metric(&self, key: &MetricKey) -> Metric {
        self.metrics
            .entry(key.clone())
            .or_insert_with(|| Metric::new(key.kind, key.source.clone()))
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_sorted(series: &mut Vec<DataPoint>, point: DataPoint) {
    let idx = series.partition_point(|p| p.timestamp <= point.timestamp);
    series.insert(idx, point);
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn metrics(&self, kind: Option<MetricKind>) -> Result<Vec<Metric>, StoreError> {
        let mut metrics: Vec<Metric> = self
            .metrics
            .iter()
            .filter(|e| kind.map_or(true, |k| e.key().kind == k))
            .map(|e| e.value().clone())
            .collect();
        metrics.sort_by(|a, b| (a.kind, &a.source).cmp(&(b.kind, &b.source)));
        Ok(metrics)
    }

    async fn metric(&self, key: &MetricKey) -> Result<Option<Metric>, StoreError> {
        Ok(self.metrics.get(key).map(|m| m.clone()))
    }

    async fn get_or_create_metric(
        &self,
        kind: MetricKind,
        source: &str,
    ) -> Result<Metric, StoreError> {
        Ok(self.ensure_metric(&MetricKey::new(kind, source)))
    }

    async fn data_points(
        &self,
        key: &MetricKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StoreError> {
        Ok(self
            .points
            .get(key)
            .map(|series| {
                let start = series.partition_point(|p| p.timestamp < since);
                series[start..].to_vec()
            })
            .unwrap_or_default())
    }

    async fn ping_settings(&self) -> Result<Vec<PingSetting>, StoreError> {
        Ok(self.ping_settings.read().clone())
    }

    async fn discrepancies(&self, filter: DiscrepancyFilter) -> Result<Vec<Discrepancy>, StoreError> {
        let mut found: Vec<Discrepancy> = self
            .discrepancies
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(found)
    }

    async fn discrepancy(&self, key: &DiscrepancyKey) -> Result<Option<Discrepancy>, StoreError> {
        Ok(self.discrepancies.get(key).map(|d| d.clone()))
    }

    async fn discrepancy_exists(&self, key: &DiscrepancyKey) -> Result<bool, StoreError> {
        Ok(self.discrepancies.contains_key(key))
    }

    async fn add_notification(
        &self,
        message: String,
        severity: Severity,
        created: DateTime<Utc>,
    ) -> Result<Notification, StoreError> {
        let id = self.next_notification_id.fetch_add(1, Ordering::SeqCst);
        let notification = Notification {
            id,
            message,
            severity,
            is_sent: false,
            date_created: created,
            date_sent: None,
        };
        self.notifications.write().insert(id, notification.clone());
        Ok(notification)
    }

    async fn unsent_notifications(&self) -> Result<Vec<Notification>, StoreError> {
        let mut unsent: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| !n.is_sent)
            .cloned()
            .collect();
        unsent.sort_by_key(|n| (n.date_created, n.id));
        Ok(unsent)
    }

    async fn last_sent(&self, severity: Severity) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .notifications
            .read()
            .values()
            .filter(|n| n.is_sent && n.severity == severity)
            .filter_map(|n| n.date_sent)
            .max())
    }

    async fn apply(&self, changes: ChangeSet) -> Result<(), StoreError> {
        // Validate sent marks first so a bad batch leaves the store untouched
        {
            let notifications = self.notifications.read();
            if let Some((id, _)) = changes.sent.iter().find(|(id, _)| !notifications.contains_key(id)) {
                return Err(StoreError::NotificationNotFound(*id));
            }
        }

        for point in changes.data_points {
            self.insert_data_point(point);
        }

        for metric in changes.metrics {
            self.metrics.insert(metric.key(), metric);
        }

        for discrepancy in changes.discrepancies {
            self.discrepancies.insert(discrepancy.key(), discrepancy);
        }

        if !changes.sent.is_empty() {
            let mut notifications = self.notifications.write();
            for (id, when) in changes.sent {
                if let Some(n) = notifications.get_mut(&id) {
                    n.is_sent = true;
                    n.date_sent = Some(when);
                }
            }
        }

        Ok(())
    }

    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<RetentionStats, StoreError> {
        let mut stats = RetentionStats::default();

        for mut series in self.points.iter_mut() {
            let old = series.partition_point(|p| p.timestamp < cutoff);
            series.drain(..old);
            stats.data_points += old;
        }

        {
            let mut notifications = self.notifications.write();
            let before = notifications.len();
            notifications.retain(|_, n| !(n.is_sent && n.date_created < cutoff));
            stats.notifications = before - notifications.len();
        }

        let before = self.discrepancies.len();
        self.discrepancies.retain(|key, _| key.date_first_offense >= cutoff);
        stats.discrepancies = before - self.discrepancies.len();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DiscrepancyKind;
    use chrono::Duration;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let store = MemoryStore::new();
        let a = store.get_or_create_metric(MetricKind::CpuLoad, "web-1").await.unwrap();
        let b = store.get_or_create_metric(MetricKind::CpuLoad, "web-1").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.metrics(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_data_points_window_is_sorted() {
        let store = MemoryStore::new();
        let key = MetricKey::new(MetricKind::CpuLoad, "web-1");
        let now = Utc::now();

        for offset in [5, 1, 3, 10] {
            store.insert_data_point(DataPoint::numeric(
                key.clone(),
                now - Duration::minutes(offset),
                offset,
            ));
        }

        let points = store.data_points(&key, now - Duration::minutes(5)).await.unwrap();
        let values: Vec<i64> = points.iter().filter_map(|p| p.normalized_value()).collect();
        assert_eq!(values, vec![5, 3, 1]);
    }

    #[tokio::test]
    async fn test_apply_rejects_unknown_notification() {
        let store = MemoryStore::new();
        let key = MetricKey::new(MetricKind::CpuLoad, "web-1");
        let changes = ChangeSet {
            data_points: vec![DataPoint::numeric(key, Utc::now(), 1)],
            sent: vec![(42, Utc::now())],
            ..Default::default()
        };

        assert!(matches!(
            store.apply(changes).await,
            Err(StoreError::NotificationNotFound(42))
        ));
        assert_eq!(store.data_point_count(), 0);
    }

    #[tokio::test]
    async fn test_last_sent_per_severity() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let high = store.add_notification("a".into(), Severity::High, now).await.unwrap();
        store.add_notification("b".into(), Severity::Low, now).await.unwrap();

        store
            .apply(ChangeSet {
                sent: vec![(high.id, now)],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(store.last_sent(Severity::High).await.unwrap(), Some(now));
        assert_eq!(store.last_sent(Severity::Low).await.unwrap(), None);
        assert_eq!(store.unsent_notifications().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_remove_older_than() {
        let store = MemoryStore::new();
        let key = MetricKey::new(MetricKind::CpuLoad, "web-1");
        let now = Utc::now();
        let cutoff = now - Duration::days(30);

        store.insert_data_point(DataPoint::numeric(key.clone(), cutoff - Duration::hours(1), 1));
        store.insert_data_point(DataPoint::numeric(key.clone(), now, 2));

        let old = store.add_notification("old".into(), Severity::Low, cutoff - Duration::hours(1)).await.unwrap();
        store.add_notification("queued".into(), Severity::Low, cutoff - Duration::hours(1)).await.unwrap();
        store
            .apply(ChangeSet {
                sent: vec![(old.id, now)],
                discrepancies: vec![
                    Discrepancy::new(DiscrepancyKind::GapInData, &key, cutoff - Duration::hours(2)),
                    Discrepancy::new(DiscrepancyKind::GapInData, &key, now),
                ],
                ..Default::default()
            })
            .await
            .unwrap();

        let stats = store.remove_older_than(cutoff).await.unwrap();

        assert_eq!(
            stats,
            RetentionStats {
                data_points: 1,
                notifications: 1,
                discrepancies: 1
            }
        );
        // Unsent notifications survive regardless of age
        assert_eq!(store.unsent_notifications().await.unwrap().len(), 1);
    }
}
