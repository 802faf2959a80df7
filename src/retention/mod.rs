//! Removal of old monitoring data

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::seconds;
use crate::storage::{MetricStore, RetentionStats, StoreError};

/// How long data is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    #[serde(with = "seconds")]
    pub max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

/// Remove data points, sent notifications and discrepancies older than `max_age`
pub async fn run_retention(store: &dyn MetricStore, max_age: Duration) -> Result<RetentionStats, StoreError> {
    let cutoff = chrono::Duration::from_std(max_age)
        .ok()
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| StoreError::InvalidArgument(format!("retention age out of range: {:?}", max_age)))?;

    let stats = store.remove_older_than(cutoff).await?;

    if stats.total() > 0 {
        tracing::info!(
            data_points = stats.data_points,
            notifications = stats.notifications,
            discrepancies = stats.discrepancies,
            cutoff = %cutoff,
            "Removed expired data"
        );
    }

    Ok(stats)
}
