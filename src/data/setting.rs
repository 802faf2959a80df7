use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::millis;

/// HTTP method used to probe a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    #[default]
    Head,
    Get,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Head => f.write_str("HEAD"),
            ProbeMethod::Get => f.write_str("GET"),
        }
    }
}

/// Parameters for one ping target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingSetting {
    pub server_url: String,
    /// Time after which the server is considered unresponsive
    #[serde(default = "default_max_response_time", rename = "max_response_time_ms", with = "millis")]
    pub max_response_time: Duration,
    /// Consecutive failures tolerated before a discrepancy is raised
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default)]
    pub method: ProbeMethod,
}

fn default_max_response_time() -> Duration {
    Duration::from_millis(2000)
}

fn default_max_failures() -> u32 {
    3
}

impl PingSetting {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            max_response_time: default_max_response_time(),
            max_failures: default_max_failures(),
            method: ProbeMethod::Head,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.max_response_time = timeout;
        self
    }

    pub fn with_method(mut self, method: ProbeMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Metric source for this target: the host part of its URL
    pub fn source(&self) -> Result<String, String> {
        let url = reqwest::Url::parse(&self.server_url)
            .map_err(|e| format!("invalid ping url {:?}: {}", self.server_url, e))?;
        url.host_str()
            .map(str::to_string)
            .ok_or_else(|| format!("ping url {:?} has no host", self.server_url))
    }
}
