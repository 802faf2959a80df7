//! Daemon configuration
//!
//! Loaded from a YAML file, with a few environment overrides:
//! - VIGIL_CONFIG: Path of the config file (default: vigil.yml, optional)
//! - VIGIL_STATUS_HOST / VIGIL_STATUS_PORT: Status endpoint address, enables it
//! - VIGIL_TIME_ZONE: Zone used to render timestamps in notifications

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::alerts::{ChannelConfig, NotificationConfig};
use crate::api::ServerConfig;
use crate::daemon::JobKind;
use crate::data::{DisplayZone, PingSetting};
use crate::detect::DetectionConfig;
use crate::retention::RetentionConfig;

pub const DEFAULT_CONFIG_PATH: &str = "vigil.yml";

/// Longest accepted lookback, gap spacing or retention age
pub const MAX_WINDOW: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Full daemon configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub jobs: JobsConfig,
    pub discrepancy: DetectionConfig,
    pub notification: NotificationConfig,
    pub clean: RetentionConfig,
    pub ping: PingConfig,
    /// Status endpoint, disabled when absent
    pub status: Option<ServerConfig>,
}

/// Schedule of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(with = "seconds")]
    pub interval: Duration,
}

fn enabled() -> bool {
    true
}

impl JobConfig {
    pub fn every(secs: u64) -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(secs),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Schedules of every job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub ping: JobConfig,
    pub cache: JobConfig,
    pub clean: JobConfig,
    pub demo: JobConfig,
    pub discrepancy: JobConfig,
    pub notification: JobConfig,
    pub health: JobConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ping: JobConfig::every(30),
            cache: JobConfig::every(30),
            clean: JobConfig::every(3600),
            demo: JobConfig::every(60).disabled(),
            discrepancy: JobConfig::every(60),
            notification: JobConfig::every(30),
            health: JobConfig::every(60),
        }
    }
}

impl JobsConfig {
    pub fn get(&self, kind: JobKind) -> JobConfig {
        match kind {
            JobKind::Ping => self.ping,
            JobKind::Cache => self.cache,
            JobKind::Clean => self.clean,
            JobKind::Demo => self.demo,
            JobKind::Discrepancy => self.discrepancy,
            JobKind::Notification => self.notification,
            JobKind::Health => self.health,
        }
    }
}

/// Ping targets and how to probe them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingConfig {
    pub targets: Vec<PingSetting>,
    /// Probing service to delegate to instead of probing directly
    pub remote_endpoint: Option<String>,
}

impl MonitorConfig {
    /// Load from `VIGIL_CONFIG` (or `vigil.yml`) and apply environment overrides.
    ///
    /// The default path may be absent, in which case defaults are used; an
    /// explicitly configured path must exist.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("VIGIL_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("VIGIL_STATUS_HOST") {
            self.status.get_or_insert_with(ServerConfig::default).host = host;
        }
        if let Some(port) = lookup("VIGIL_STATUS_PORT") {
            let port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("VIGIL_STATUS_PORT is not a port: {}", port)))?;
            self.status.get_or_insert_with(ServerConfig::default).port = port;
        }
        if let Some(zone) = lookup("VIGIL_TIME_ZONE") {
            self.notification.time_zone = Some(zone);
        }
        Ok(())
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in JobKind::ALL {
            if self.jobs.get(kind).interval.is_zero() {
                return Err(ConfigError::Invalid(format!("{} job interval must be positive", kind)));
            }
        }

        DisplayZone::parse(self.notification.time_zone.as_deref()).map_err(ConfigError::Invalid)?;

        for channel in &self.notification.channels {
            if let ChannelConfig::Email { to, .. } = channel {
                if to.is_empty() {
                    return Err(ConfigError::Invalid("email channel has no recipients".into()));
                }
            }
        }

        for target in &self.ping.targets {
            target.source().map_err(ConfigError::Invalid)?;
        }

        if let Some(endpoint) = &self.ping.remote_endpoint {
            reqwest::Url::parse(endpoint)
                .map_err(|e| ConfigError::Invalid(format!("invalid remote ping endpoint {}: {}", endpoint, e)))?;
        }

        if self.clean.max_age.is_zero() {
            return Err(ConfigError::Invalid("retention max age must be positive".into()));
        }

        let windows = [
            ("discrepancy lookback", self.discrepancy.lookback),
            ("discrepancy gap max difference", self.discrepancy.gap_max_difference),
            ("retention max age", self.clean.max_age),
        ];
        for (name, window) in windows {
            if window > MAX_WINDOW {
                return Err(ConfigError::Invalid(format!(
                    "{} must not exceed {} seconds",
                    name,
                    MAX_WINDOW.as_secs()
                )));
            }
        }

        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Durations as whole seconds
pub mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Durations as whole milliseconds
pub mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::Verbosity;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();

        assert_eq!(config.jobs.ping.interval, Duration::from_secs(30));
        assert_eq!(config.jobs.clean.interval, Duration::from_secs(3600));
        assert!(!config.jobs.demo.enabled);
        assert_eq!(config.discrepancy.load_threshold, 90);
        assert_eq!(config.clean.max_age, Duration::from_secs(30 * 24 * 3600));
        assert!(config.status.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
jobs:
  ping:
    interval: 10
  cache:
    enabled: false
    interval: 45
discrepancy:
  load_threshold: 80
notification:
  time_zone: America/New_York
  verbosity: brief
  frequencies:
    high: 120
ping:
  targets:
    - server_url: https://a.example/health
      max_response_time_ms: 500
status:
  port: 9100
"#
        )
        .unwrap();

        let config = MonitorConfig::from_file(file.path()).unwrap();

        assert_eq!(config.jobs.ping.interval, Duration::from_secs(10));
        assert!(!config.jobs.cache.enabled);
        // Sections not mentioned keep their defaults
        assert_eq!(config.jobs.health, JobConfig::every(60));
        assert_eq!(config.discrepancy.load_threshold, 80);
        assert_eq!(config.discrepancy.load_max_consecutive, 3);
        assert_eq!(config.notification.verbosity, Verbosity::Brief);
        assert_eq!(config.notification.frequencies.high, Duration::from_secs(120));
        assert_eq!(config.notification.frequencies.low, Duration::from_secs(86400));
        assert_eq!(config.ping.targets[0].max_response_time, Duration::from_millis(500));
        assert_eq!(config.status.as_ref().unwrap().port, 9100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_probe_timeouts_in_millis() {
        let mut config = MonitorConfig::default();
        config
            .ping
            .targets
            .push(PingSetting::new("http://a.example").with_timeout(Duration::from_millis(750)));

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("max_response_time_ms: 750"));
        assert!(yaml.contains("lookback: 3600"));
    }

    #[test]
    fn test_missing_file() {
        let err = MonitorConfig::from_file("/nonexistent/vigil.yml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VIGIL_STATUS_PORT", "9200"),
            ("VIGIL_TIME_ZONE", "Europe/Berlin"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();

        let status = config.status.unwrap();
        assert_eq!(status.port, 9200);
        assert_eq!(status.host, ServerConfig::default().host);
        assert_eq!(config.notification.time_zone.as_deref(), Some("Europe/Berlin"));

        let mut config = MonitorConfig::default();
        let bad = config.apply_overrides(|name| (name == "VIGIL_STATUS_PORT").then(|| "http".to_string()));
        assert!(matches!(bad, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects() {
        let mut config = MonitorConfig::default();
        config.jobs.cache.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.notification.time_zone = Some("Mars/Olympus".into());
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.notification.channels.push(ChannelConfig::Email {
            to: vec![],
            from: "monitor@example.com".into(),
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: None,
            password: None,
        });
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.ping.targets.push(PingSetting::new("not a url"));
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.discrepancy.lookback = Duration::from_secs(10_000_000_000_000);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = MonitorConfig::default();
        config.clean.max_age = MAX_WINDOW + Duration::from_secs(1);
        assert!(config.validate().is_err());
    }
}
