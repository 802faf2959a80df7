//! Network probes for ping targets
//!
//! Two interchangeable implementations of [`Prober`]: [`HttpProber`] issues
//! the request itself, [`RemoteProber`] asks an external probing service to
//! do it. Both race the probe against the target's max response time.

pub mod http;
pub mod remote;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::data::{DataPoint, MetricKey, MetricKind, Payload, PingSetting};

pub use http::HttpProber;
pub use remote::RemoteProber;

/// Status code recorded for probes that did not complete
pub const UNAVAILABLE_STATUS: u16 = 503;

/// Outcome of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Zero when the probe failed to complete
    pub latency: Duration,
    pub status_code: u16,
    pub success: bool,
    pub message: String,
}

impl ProbeResult {
    pub fn completed(latency: Duration, status_code: u16) -> Self {
        let success = (200..300).contains(&status_code);
        Self {
            latency,
            status_code,
            success,
            message: if success {
                "OK".to_string()
            } else {
                format!("Server responded {}", status_code)
            },
        }
    }

    /// Probe that never produced a response
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            latency: Duration::ZERO,
            status_code: UNAVAILABLE_STATUS,
            success: false,
            message: message.into(),
        }
    }

    pub fn timed_out() -> Self {
        Self::unavailable("Timeout")
    }

    /// Ping data point for the target's metric
    pub fn into_data_point(self, source: impl Into<String>, timestamp: DateTime<Utc>) -> DataPoint {
        DataPoint::new(
            MetricKey::new(MetricKind::Ping, source),
            timestamp,
            Payload::Ping {
                response_time: self.latency,
                status_code: self.status_code,
                success: self.success,
                message: self.message,
            },
        )
    }
}

/// Executes one probe against a ping target
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, setting: &PingSetting) -> Result<ProbeResult, ProbeError>;
}

/// Probe errors
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Remote prober error: {0}")]
    Remote(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_classifies_2xx() {
        assert!(ProbeResult::completed(Duration::from_millis(5), 204).success);

        let failed = ProbeResult::completed(Duration::from_millis(5), 500);
        assert!(!failed.success);
        assert_eq!(failed.message, "Server responded 500");
    }

    #[test]
    fn test_timed_out_has_zero_latency() {
        let result = ProbeResult::timed_out();
        assert_eq!(result.latency, Duration::ZERO);
        assert_eq!(result.status_code, 503);
        assert_eq!(result.message, "Timeout");

        let point = result.into_data_point("a.example", Utc::now());
        assert_eq!(point.metric, MetricKey::new(MetricKind::Ping, "a.example"));
        assert_eq!(point.ping_success(), Some(false));
    }
}
