use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::fanout::{fan_out, FanOutError};
use super::{Job, JobError};
use crate::aggregate::MetricAggregator;
use crate::alerts::NotificationThrottle;
use crate::data::{Discrepancy, MetricKind};
use crate::detect::DiscrepancyService;
use crate::health::HealthReporter;
use crate::probe::Prober;
use crate::retention::run_retention;
use crate::storage::{DiscrepancyFilter, UnitOfWork};

/// Keep successful results, log the rest
fn collect_ok<R>(job: &'static str, results: Vec<Result<R, FanOutError>>) -> Vec<R> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(job, error = %e, "Task failed");
                None
            }
        })
        .collect()
}

/// Probes every ping target and records the outcome
pub struct PingJob {
    prober: Arc<dyn Prober>,
}

impl PingJob {
    pub fn new(prober: Arc<dyn Prober>) -> Self {
        Self { prober }
    }
}

#[async_trait]
impl Job for PingJob {
    async fn run(&self, uow: &mut UnitOfWork) -> Result<(), JobError> {
        let settings = uow.store().ping_settings().await?;
        if settings.is_empty() {
            debug!("No ping targets configured");
            return Ok(());
        }

        let store = uow.store().clone();
        let results = fan_out(settings, |setting| {
            let prober = self.prober.clone();
            let store = store.clone();
            async move {
                let source = setting.source().map_err(JobError::Other)?;
                store.get_or_create_metric(MetricKind::Ping, &source).await?;
                let timestamp = Utc::now();
                let result = prober.probe(&setting).await?;
                Ok::<_, JobError>(result.into_data_point(source, timestamp))
            }
        })
        .await;

        for point in collect_ok("ping", results) {
            uow.stage_data_point(point);
        }
        uow.commit().await?;
        Ok(())
    }
}

/// Recomputes the aggregates of every metric
pub struct CacheJob {
    aggregator: Arc<MetricAggregator>,
}

impl CacheJob {
    pub fn new(aggregator: Arc<MetricAggregator>) -> Self {
        Self { aggregator }
    }
}

#[async_trait]
impl Job for CacheJob {
    async fn run(&self, uow: &mut UnitOfWork) -> Result<(), JobError> {
        let metrics = uow.store().metrics(None).await?;
        let now = Utc::now();

        let results = fan_out(metrics, |metric| {
            let aggregator = self.aggregator.clone();
            async move { Ok::<_, JobError>(aggregator.aggregate(&metric, now).await?) }
        })
        .await;

        for metric in collect_ok("cache", results).into_iter().flatten() {
            uow.stage_metric(metric);
        }
        uow.commit().await?;
        Ok(())
    }
}

/// Removes expired data
pub struct CleanJob {
    max_age: Duration,
}

impl CleanJob {
    pub fn new(max_age: Duration) -> Self {
        Self { max_age }
    }
}

#[async_trait]
impl Job for CleanJob {
    async fn run(&self, uow: &mut UnitOfWork) -> Result<(), JobError> {
        run_retention(uow.store().as_ref(), self.max_age).await?;
        Ok(())
    }
}

/// Resolves discrepancies that cleared up, then records new ones
pub struct DiscrepancyJob {
    service: Arc<DiscrepancyService>,
}

impl DiscrepancyJob {
    pub fn new(service: Arc<DiscrepancyService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Job for DiscrepancyJob {
    async fn run(&self, uow: &mut UnitOfWork) -> Result<(), JobError> {
        let open = uow.store().discrepancies(DiscrepancyFilter::Open).await?;
        let resolvable = self.service.find_resolved(&open).await?;
        let resolved = self.service.resolve(resolvable).await?;

        let metrics: Vec<_> = uow
            .store()
            .metrics(None)
            .await?
            .into_iter()
            .filter(|m| matches!(m.kind, MetricKind::CpuLoad | MetricKind::Ping | MetricKind::Health))
            .collect();

        let results = fan_out(metrics, |metric| {
            let service = self.service.clone();
            async move { Ok::<_, JobError>(service.find_all(&metric).await?) }
        })
        .await;

        let found: Vec<Discrepancy> = collect_ok("discrepancy", results).into_iter().flatten().collect();
        let recorded = self.service.record(found).await?;

        if !recorded.is_empty() || !resolved.is_empty() {
            info!(
                recorded = recorded.len(),
                resolved = resolved.len(),
                "Discrepancies updated"
            );
        }
        Ok(())
    }
}

/// Flushes the notification queue when due
pub struct NotificationJob {
    throttle: Arc<NotificationThrottle>,
}

impl NotificationJob {
    pub fn new(throttle: Arc<NotificationThrottle>) -> Self {
        Self { throttle }
    }
}

#[async_trait]
impl Job for NotificationJob {
    async fn run(&self, _uow: &mut UnitOfWork) -> Result<(), JobError> {
        self.throttle.process_queue().await?;
        Ok(())
    }
}

/// Records a system health report
pub struct HealthJob {
    reporter: Arc<HealthReporter>,
}

impl HealthJob {
    pub fn new(reporter: Arc<HealthReporter>) -> Self {
        Self { reporter }
    }
}

#[async_trait]
impl Job for HealthJob {
    async fn run(&self, uow: &mut UnitOfWork) -> Result<(), JobError> {
        if let Some(report) = self.reporter.report(Utc::now()).await? {
            uow.stage_data_point(report);
            uow.commit().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Frequencies, Notifier, Verbosity};
    use crate::data::{DataPoint, DisplayZone, MetricKey, PingSetting};
    use crate::detect::DetectionConfig;
    use crate::probe::{ProbeError, ProbeResult};
    use crate::storage::{MemoryStore, MetricStore};
    use chrono::Duration as ChronoDuration;

    /// Prober that fails for one host and succeeds for the rest
    struct FakeProber;

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, setting: &PingSetting) -> Result<ProbeResult, ProbeError> {
            if setting.server_url.contains("broken") {
                return Err(ProbeError::Client("boom".into()));
            }
            Ok(ProbeResult::completed(Duration::from_millis(42), 200))
        }
    }

    fn throttle(store: Arc<MemoryStore>) -> Arc<NotificationThrottle> {
        Arc::new(NotificationThrottle::new(
            store,
            Notifier::new(),
            Frequencies::default(),
            Verbosity::Brief,
            DisplayZone::Utc,
        ))
    }

    #[tokio::test]
    async fn test_ping_job_records_successful_probes() {
        let store = Arc::new(MemoryStore::with_ping_settings(vec![
            PingSetting::new("https://a.example"),
            PingSetting::new("https://broken.example"),
        ]));
        let job = PingJob::new(Arc::new(FakeProber));

        let mut uow = UnitOfWork::new(store.clone());
        job.run(&mut uow).await.unwrap();

        let key = MetricKey::new(MetricKind::Ping, "a.example");
        let points = store.data_points(&key, Utc::now() - ChronoDuration::minutes(1)).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].normalized_value(), Some(42));
        // Metric is created even when the probe fails
        assert!(store
            .metric(&MetricKey::new(MetricKind::Ping, "broken.example"))
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.data_point_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_job_updates_every_metric() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for source in ["web-1", "web-2"] {
            store.insert_data_point(DataPoint::numeric(
                MetricKey::new(MetricKind::CpuLoad, source),
                now - ChronoDuration::minutes(1),
                33,
            ));
        }
        store.get_or_create_metric(MetricKind::Log, "empty").await.unwrap();

        let job = CacheJob::new(Arc::new(MetricAggregator::new(store.clone())));
        job.run(&mut UnitOfWork::new(store.clone())).await.unwrap();

        for metric in store.metrics(Some(MetricKind::CpuLoad)).await.unwrap() {
            assert_eq!(metric.current_value, 33);
            assert_eq!(metric.hour_avg, 33);
        }
    }

    #[tokio::test]
    async fn test_discrepancy_job_records_then_resolves() {
        let store = Arc::new(MemoryStore::new());
        let key = MetricKey::new(MetricKind::CpuLoad, "web-1");
        let start = Utc::now() - ChronoDuration::minutes(30);
        for (i, v) in [10, 95, 96, 97, 98, 99].iter().enumerate() {
            store.insert_data_point(DataPoint::numeric(key.clone(), start + ChronoDuration::minutes(i as i64), *v));
        }

        let service = Arc::new(DiscrepancyService::new(
            store.clone(),
            throttle(store.clone()),
            DetectionConfig::default(),
            DisplayZone::Utc,
        ));
        let job = DiscrepancyJob::new(service);

        job.run(&mut UnitOfWork::new(store.clone())).await.unwrap();
        let open = store.discrepancies(DiscrepancyFilter::Open).await.unwrap();
        assert_eq!(open.len(), 1);

        // Running again finds nothing new
        job.run(&mut UnitOfWork::new(store.clone())).await.unwrap();
        assert_eq!(store.discrepancies(DiscrepancyFilter::All).await.unwrap().len(), 1);

        store.insert_data_point(DataPoint::numeric(key.clone(), start + ChronoDuration::minutes(6), 20));
        job.run(&mut UnitOfWork::new(store.clone())).await.unwrap();

        assert!(store.discrepancies(DiscrepancyFilter::Open).await.unwrap().is_empty());
        assert_eq!(store.discrepancies(DiscrepancyFilter::Resolved).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_job_stores_report() {
        let store = Arc::new(MemoryStore::new());
        store.get_or_create_metric(MetricKind::CpuLoad, "web-1").await.unwrap();

        let job = HealthJob::new(Arc::new(HealthReporter::new(store.clone())));
        job.run(&mut UnitOfWork::new(store.clone())).await.unwrap();

        let health = MetricKey::new(MetricKind::Health, "system");
        let points = store.data_points(&health, Utc::now() - ChronoDuration::minutes(1)).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].normalized_value(), Some(100));
    }

    #[tokio::test]
    async fn test_notification_job_flushes() {
        let store = Arc::new(MemoryStore::new());
        let throttle = throttle(store.clone());
        throttle.schedule("hello".into(), crate::data::Severity::Low).await.unwrap();

        NotificationJob::new(throttle)
            .run(&mut UnitOfWork::new(store.clone()))
            .await
            .unwrap();

        assert!(store.unsent_notifications().await.unwrap().is_empty());
    }
}
