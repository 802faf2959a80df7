use async_trait::async_trait;
use reqwest::Method;
use std::time::Instant;
use tracing::{debug, warn};

use super::{ProbeError, ProbeResult, Prober};
use crate::data::{PingSetting, ProbeMethod};

/// Probes targets directly over HTTP
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn http_method(method: ProbeMethod) -> Method {
    match method {
        ProbeMethod::Head => Method::HEAD,
        ProbeMethod::Get => Method::GET,
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, setting: &PingSetting) -> Result<ProbeResult, ProbeError> {
        let url = reqwest::Url::parse(&setting.server_url)
            .map_err(|e| ProbeError::InvalidTarget(format!("{}: {}", setting.server_url, e)))?;

        let request = self.client.request(http_method(setting.method), url).send();
        let start = Instant::now();

        match tokio::time::timeout(setting.max_response_time, request).await {
            Err(_) => {
                warn!(
                    url = %setting.server_url,
                    timeout_ms = setting.max_response_time.as_millis() as u64,
                    "Ping timed out"
                );
                Ok(ProbeResult::timed_out())
            }
            Ok(Err(e)) => {
                warn!(url = %setting.server_url, error = %e, "Ping request failed");
                Ok(ProbeResult::unavailable(e.to_string()))
            }
            Ok(Ok(response)) => {
                let result = ProbeResult::completed(start.elapsed(), response.status().as_u16());
                debug!(
                    url = %setting.server_url,
                    status = result.status_code,
                    latency_ms = result.latency.as_millis() as u64,
                    "Ping completed"
                );
                Ok(result)
            }
        }
    }
}
