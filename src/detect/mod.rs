//! Anomaly detection over metric time series
//!
//! [`detectors`] holds the pure algorithms; [`DiscrepancyService`] fetches
//! samples from the store, runs them and manages the record/resolve
//! lifecycle of what they find.

pub mod detectors;
pub mod runs;
pub mod service;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::alerts::ThrottleError;
use crate::config::seconds;
use crate::data::MetricKind;
use crate::storage::StoreError;

pub use detectors::{find_gaps, find_high_loads, find_low_healths, find_ping_failures};
pub use runs::{encode_runs, offending_runs, Run};
pub use service::DiscrepancyService;

/// Detector thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Expected spacing of load samples; gaps of 1.5x this are reported
    #[serde(with = "seconds")]
    pub gap_max_difference: Duration,
    /// Load at or above this value is high
    pub load_threshold: i64,
    pub load_max_consecutive: u32,
    /// Health below this value is low
    pub health_threshold: i64,
    pub health_max_consecutive: u32,
    /// Used for ping targets without their own setting
    pub ping_max_failures: u32,
    /// How far back each detection cycle looks
    #[serde(with = "seconds")]
    pub lookback: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            gap_max_difference: Duration::from_secs(60),
            load_threshold: 90,
            load_max_consecutive: 3,
            health_threshold: 70,
            health_max_consecutive: 3,
            ping_max_failures: 3,
            lookback: Duration::from_secs(3600),
        }
    }
}

/// Detection errors
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("{operation} requires a {expected} metric, got {actual}")]
    WrongMetricKind {
        operation: &'static str,
        expected: MetricKind,
        actual: MetricKind,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notification(#[from] ThrottleError),
}
