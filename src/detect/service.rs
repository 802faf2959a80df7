use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::detectors::{self, health_ok, load_ok};
use super::{DetectError, DetectionConfig};
use crate::alerts::NotificationThrottle;
use crate::data::{DataPoint, Discrepancy, DiscrepancyKind, DisplayZone, Metric, MetricKind, Severity};
use crate::storage::{ChangeSet, MetricStore};

/// Finds discrepancies in stored metrics and manages their lifecycle
pub struct DiscrepancyService {
    store: Arc<dyn MetricStore>,
    throttle: Arc<NotificationThrottle>,
    config: DetectionConfig,
    zone: DisplayZone,
    /// Serializes check-then-insert and resolve against the store
    guard: Mutex<()>,
}

impl DiscrepancyService {
    pub fn new(
        store: Arc<dyn MetricStore>,
        throttle: Arc<NotificationThrottle>,
        config: DetectionConfig,
        zone: DisplayZone,
    ) -> Self {
        Self {
            store,
            throttle,
            config,
            zone,
            guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Gaps in the load samples of `metric` within the last `lookback`
    pub async fn find_gaps(&self, metric: &Metric, lookback: Duration) -> Result<Vec<Discrepancy>, DetectError> {
        expect_kind("find_gaps", metric, MetricKind::CpuLoad)?;
        let points = self.window(metric, lookback).await?;
        let timestamps: Vec<DateTime<Utc>> = points.iter().map(|p| p.timestamp).collect();
        let max_difference = to_chrono(self.config.gap_max_difference)?;

        Ok(detectors::find_gaps(&metric.key(), &timestamps, max_difference))
    }

    pub async fn find_high_loads(&self, metric: &Metric, lookback: Duration) -> Result<Vec<Discrepancy>, DetectError> {
        expect_kind("find_high_loads", metric, MetricKind::CpuLoad)?;
        let samples = values(&self.window(metric, lookback).await?);

        Ok(detectors::find_high_loads(
            &metric.key(),
            &samples,
            self.config.load_threshold,
            self.config.load_max_consecutive,
        ))
    }

    pub async fn find_ping_failures(&self, metric: &Metric, lookback: Duration) -> Result<Vec<Discrepancy>, DetectError> {
        expect_kind("find_ping_failures", metric, MetricKind::Ping)?;
        let points = self.window(metric, lookback).await?;
        let samples: Vec<(DateTime<Utc>, bool)> = points
            .iter()
            .filter_map(|p| p.ping_success().map(|ok| (p.timestamp, ok)))
            .collect();
        let max_failures = self.max_failures(&metric.source).await?;

        Ok(detectors::find_ping_failures(&metric.key(), &samples, max_failures))
    }

    pub async fn find_low_healths(&self, metric: &Metric, lookback: Duration) -> Result<Vec<Discrepancy>, DetectError> {
        expect_kind("find_low_healths", metric, MetricKind::Health)?;
        let samples = values(&self.window(metric, lookback).await?);

        Ok(detectors::find_low_healths(
            &metric.key(),
            &samples,
            self.config.health_threshold,
            self.config.health_max_consecutive,
        ))
    }

    /// Run every detector that applies to the metric's kind over the configured lookback
    pub async fn find_all(&self, metric: &Metric) -> Result<Vec<Discrepancy>, DetectError> {
        let lookback = self.config.lookback;
        let found = match metric.kind {
            MetricKind::CpuLoad => {
                let mut found = self.find_gaps(metric, lookback).await?;
                found.extend(self.find_high_loads(metric, lookback).await?);
                found
            }
            MetricKind::Ping => self.find_ping_failures(metric, lookback).await?,
            MetricKind::Health => self.find_low_healths(metric, lookback).await?,
            _ => Vec::new(),
        };

        if !found.is_empty() {
            debug!(metric = %metric.key(), count = found.len(), "Detected discrepancies");
        }
        Ok(found)
    }

    /// Store candidates that are not recorded yet and notify about each.
    ///
    /// Returns only the newly stored discrepancies.
    pub async fn record(&self, candidates: Vec<Discrepancy>) -> Result<Vec<Discrepancy>, DetectError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let recorded = {
            let _guard = self.guard.lock().await;
            let mut seen = HashSet::new();
            let mut fresh = Vec::new();

            for candidate in candidates {
                if candidate.resolved {
                    warn!(
                        kind = %candidate.kind,
                        source = %candidate.metric_source,
                        "Resolved discrepancy passed to record, skipping"
                    );
                    continue;
                }

                let key = candidate.key();
                if seen.contains(&key) || self.store.discrepancy_exists(&key).await? {
                    warn!(
                        kind = %candidate.kind,
                        source = %candidate.metric_source,
                        offense = %candidate.date_first_offense,
                        "Discrepancy already recorded, skipping"
                    );
                    continue;
                }

                seen.insert(key);
                fresh.push(candidate);
            }

            if !fresh.is_empty() {
                self.store
                    .apply(ChangeSet {
                        discrepancies: fresh.clone(),
                        ..Default::default()
                    })
                    .await?;
            }
            fresh
        };

        for discrepancy in &recorded {
            info!(
                kind = %discrepancy.kind,
                source = %discrepancy.metric_source,
                offense = %discrepancy.date_first_offense,
                "Discrepancy recorded"
            );
            self.throttle
                .schedule(discrepancy.describe(&self.zone), Severity::High)
                .await?;
        }

        Ok(recorded)
    }

    /// Open discrepancies that the data no longer reproduces
    pub async fn find_resolved(&self, open: &[Discrepancy]) -> Result<Vec<Discrepancy>, DetectError> {
        let mut resolvable = Vec::new();

        for discrepancy in open {
            if discrepancy.resolved {
                warn!(
                    kind = %discrepancy.kind,
                    source = %discrepancy.metric_source,
                    "Resolved discrepancy passed to find_resolved, skipping"
                );
                continue;
            }

            let offense = discrepancy.date_first_offense;
            let later: Vec<DataPoint> = self
                .store
                .data_points(&discrepancy.metric_key(), offense)
                .await?
                .into_iter()
                .filter(|p| p.timestamp > offense)
                .collect();

            let cleared = match discrepancy.kind {
                DiscrepancyKind::GapInData => !later.is_empty(),
                DiscrepancyKind::HighLoad => later
                    .iter()
                    .filter_map(DataPoint::normalized_value)
                    .any(|v| load_ok(v, self.config.load_threshold)),
                DiscrepancyKind::LowHealth => later
                    .iter()
                    .filter_map(DataPoint::normalized_value)
                    .any(|h| health_ok(h, self.config.health_threshold)),
                DiscrepancyKind::PingFailedNTimes => {
                    later.iter().any(|p| p.ping_success() == Some(true))
                }
            };

            if cleared {
                resolvable.push(discrepancy.clone());
            }
        }

        Ok(resolvable)
    }

    /// Mark discrepancies resolved and notify about each.
    ///
    /// Entries that are already resolved, or were never recorded, are
    /// skipped and left out of the result.
    pub async fn resolve(&self, discrepancies: Vec<Discrepancy>) -> Result<Vec<Discrepancy>, DetectError> {
        if discrepancies.is_empty() {
            return Ok(discrepancies);
        }

        let now = Utc::now();
        let resolved = {
            let _guard = self.guard.lock().await;
            let mut resolved = Vec::new();

            for discrepancy in discrepancies {
                if discrepancy.resolved {
                    warn!(
                        kind = %discrepancy.kind,
                        source = %discrepancy.metric_source,
                        "Resolved discrepancy passed to resolve, skipping"
                    );
                    continue;
                }

                match self.store.discrepancy(&discrepancy.key()).await? {
                    None => {
                        warn!(
                            kind = %discrepancy.kind,
                            source = %discrepancy.metric_source,
                            "Cannot resolve a discrepancy that was never recorded"
                        );
                    }
                    Some(stored) if stored.resolved => {
                        warn!(
                            kind = %discrepancy.kind,
                            source = %discrepancy.metric_source,
                            "Discrepancy already resolved, skipping"
                        );
                    }
                    Some(mut stored) => {
                        stored.resolved = true;
                        stored.date_resolved = Some(now);
                        resolved.push(stored);
                    }
                }
            }

            if !resolved.is_empty() {
                self.store
                    .apply(ChangeSet {
                        discrepancies: resolved.clone(),
                        ..Default::default()
                    })
                    .await?;
            }
            resolved
        };

        for discrepancy in &resolved {
            info!(
                kind = %discrepancy.kind,
                source = %discrepancy.metric_source,
                "Discrepancy resolved"
            );
            self.throttle
                .schedule(
                    format!("Discrepancy \"{}\" has been resolved!", discrepancy.describe(&self.zone)),
                    Severity::Medium,
                )
                .await?;
        }

        Ok(resolved)
    }

    async fn window(&self, metric: &Metric, lookback: Duration) -> Result<Vec<DataPoint>, DetectError> {
        let since = Utc::now()
            .checked_sub_signed(to_chrono(lookback)?)
            .ok_or_else(|| DetectError::InvalidArgument(format!("lookback out of range: {:?}", lookback)))?;
        Ok(self.store.data_points(&metric.key(), since).await?)
    }

    /// Failure limit for the ping target whose host is `source`
    async fn max_failures(&self, source: &str) -> Result<u32, DetectError> {
        let settings = self.store.ping_settings().await?;
        Ok(settings
            .iter()
            .find(|s| s.source().map_or(false, |host| host == source))
            .map(|s| s.max_failures)
            .unwrap_or(self.config.ping_max_failures))
    }
}

fn expect_kind(operation: &'static str, metric: &Metric, expected: MetricKind) -> Result<(), DetectError> {
    if metric.kind != expected {
        return Err(DetectError::WrongMetricKind {
            operation,
            expected,
            actual: metric.kind,
        });
    }
    Ok(())
}

fn values(points: &[DataPoint]) -> Vec<(DateTime<Utc>, i64)> {
    points
        .iter()
        .filter_map(|p| p.normalized_value().map(|v| (p.timestamp, v)))
        .collect()
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration, DetectError> {
    chrono::Duration::from_std(duration)
        .map_err(|_| DetectError::InvalidArgument(format!("duration out of range: {:?}", duration)))
}
