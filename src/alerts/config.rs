//! Notification configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::config::seconds;
use crate::data::Severity;

/// Notification settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub frequencies: Frequencies,
    /// IANA zone name used to render timestamps, UTC when unset
    pub time_zone: Option<String>,
    pub verbosity: Verbosity,
    /// Subject line of email digests
    pub subject: String,
    pub channels: Vec<ChannelConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            frequencies: Frequencies::default(),
            time_zone: None,
            verbosity: Verbosity::Normal,
            subject: "Status Site notifications".to_string(),
            channels: vec![ChannelConfig::Log],
        }
    }
}

/// Minimum interval between two digests that carry a given severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frequencies {
    #[serde(with = "seconds")]
    pub low: Duration,
    #[serde(with = "seconds")]
    pub medium: Duration,
    #[serde(with = "seconds")]
    pub high: Duration,
}

impl Frequencies {
    pub fn for_severity(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Low => self.low,
            Severity::Medium => self.medium,
            Severity::High => self.high,
        }
    }
}

impl Default for Frequencies {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(24 * 3600),
            medium: Duration::from_secs(3600),
            high: Duration::from_secs(60),
        }
    }
}

/// How digests are rendered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Letter with greeting, per-severity sections and sign-off
    #[default]
    Normal,
    /// Timestamped lines and the footer only
    Brief,
}

/// Notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    /// Log to tracing
    Log,
    /// Chat webhook accepting `{"text": ...}`
    Chat {
        webhook_url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Email over SMTP
    Email {
        to: Vec<String>,
        from: String,
        smtp_host: String,
        #[serde(default = "default_smtp_port")]
        smtp_port: u16,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
    },
}

fn default_smtp_port() -> u16 {
    587
}
