//! Metric store interface and the in-memory implementation
//!
//! The engine never talks to a database directly: every job reads through
//! [`MetricStore`] and writes through a per-iteration [`UnitOfWork`].

pub mod memory;
pub mod unit;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::{
    DataPoint, Discrepancy, DiscrepancyKey, Metric, MetricKey, MetricKind, Notification,
    PingSetting, Severity,
};

pub use memory::MemoryStore;
pub use unit::UnitOfWork;

/// Which discrepancies to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscrepancyFilter {
    Open,
    Resolved,
    All,
}

impl DiscrepancyFilter {
    pub fn matches(self, discrepancy: &Discrepancy) -> bool {
        match self {
            DiscrepancyFilter::Open => !discrepancy.resolved,
            DiscrepancyFilter::Resolved => discrepancy.resolved,
            DiscrepancyFilter::All => true,
        }
    }
}

/// Batch of writes applied atomically by [`MetricStore::apply`]
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub data_points: Vec<DataPoint>,
    /// Upserted by (kind, source)
    pub metrics: Vec<Metric>,
    /// Upserted by natural key
    pub discrepancies: Vec<Discrepancy>,
    /// Notification ids to mark sent, with the dispatch time
    pub sent: Vec<(u64, DateTime<Utc>)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.data_points.is_empty()
            && self.metrics.is_empty()
            && self.discrepancies.is_empty()
            && self.sent.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data_points.len() + self.metrics.len() + self.discrepancies.len() + self.sent.len()
    }
}

/// Counts removed by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub data_points: usize,
    pub notifications: usize,
    pub discrepancies: usize,
}

impl RetentionStats {
    pub fn total(&self) -> usize {
        self.data_points + self.notifications + self.discrepancies
    }
}

/// Persistence collaborator consumed by every job
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// All metrics, optionally restricted to one kind
    async fn metrics(&self, kind: Option<MetricKind>) -> Result<Vec<Metric>, StoreError>;

    async fn metric(&self, key: &MetricKey) -> Result<Option<Metric>, StoreError>;

    /// Return the metric for (kind, source), creating it if it does not exist
    async fn get_or_create_metric(
        &self,
        kind: MetricKind,
        source: &str,
    ) -> Result<Metric, StoreError>;

    /// Data points of a metric with `timestamp >= since`, oldest first
    async fn data_points(
        &self,
        key: &MetricKey,
        since: DateTime<Utc>,
    ) -> Result<Vec<DataPoint>, StoreError>;

    async fn ping_settings(&self) -> Result<Vec<PingSetting>, StoreError>;

    async fn discrepancies(&self, filter: DiscrepancyFilter) -> Result<Vec<Discrepancy>, StoreError>;

    async fn discrepancy(&self, key: &DiscrepancyKey) -> Result<Option<Discrepancy>, StoreError>;

    async fn discrepancy_exists(&self, key: &DiscrepancyKey) -> Result<bool, StoreError> {
        Ok(self.discrepancy(key).await?.is_some())
    }

    /// Queue a new notification and return it with its assigned id
    async fn add_notification(
        &self,
        message: String,
        severity: Severity,
        created: DateTime<Utc>,
    ) -> Result<Notification, StoreError>;

    /// Unsent notifications ordered by creation time
    async fn unsent_notifications(&self) -> Result<Vec<Notification>, StoreError>;

    /// Most recent dispatch time of any notification of `severity`
    async fn last_sent(&self, severity: Severity) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Apply a batch of writes
    async fn apply(&self, changes: ChangeSet) -> Result<(), StoreError>;

    /// Remove data points, sent notifications and discrepancies older than `cutoff`
    async fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<RetentionStats, StoreError>;
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Metric not found: {0}")]
    MetricNotFound(MetricKey),

    #[error("Notification not found: {0}")]
    NotificationNotFound(u64),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
