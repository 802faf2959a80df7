use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::{ProbeError, ProbeResult, Prober};
use crate::data::PingSetting;

/// Delegates probes to an external probing service.
///
/// The service is called as `GET {endpoint}?url=..&method=..&timeout=<ms>`
/// and answers with the outcome of the probe it performed.
#[derive(Debug, Clone)]
pub struct RemoteProber {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

/// Response body of the probing service
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RemoteResponse {
    #[serde(rename = "URL", default)]
    #[allow(dead_code)]
    url: String,
    /// Milliseconds
    #[serde(default)]
    latency: u64,
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    error: String,
    #[serde(default)]
    is_error: bool,
}

impl RemoteResponse {
    fn into_result(self) -> ProbeResult {
        if self.is_error {
            return ProbeResult {
                latency: Duration::ZERO,
                status_code: self.status_code,
                success: false,
                message: self.error,
            };
        }

        ProbeResult::completed(Duration::from_millis(self.latency), self.status_code)
    }
}

impl RemoteProber {
    pub fn new(endpoint: &str) -> Result<Self, ProbeError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|e| ProbeError::InvalidTarget(format!("{}: {}", endpoint, e)))?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    async fn call(&self, setting: &PingSetting) -> Result<RemoteResponse, ProbeError> {
        let timeout_ms = setting.max_response_time.as_millis().to_string();
        let method = setting.method.to_string();

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("url", setting.server_url.as_str()),
                ("method", method.as_str()),
                ("timeout", timeout_ms.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProbeError::Remote(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProbeError::Remote(format!(
                "probing service responded {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProbeError::Remote(format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl Prober for RemoteProber {
    async fn probe(&self, setting: &PingSetting) -> Result<ProbeResult, ProbeError> {
        match tokio::time::timeout(setting.max_response_time, self.call(setting)).await {
            Err(_) => {
                warn!(url = %setting.server_url, endpoint = %self.endpoint, "Remote ping timed out");
                Ok(ProbeResult::timed_out())
            }
            Ok(Err(e)) => Err(e),
            Ok(Ok(response)) => {
                let result = response.into_result();
                debug!(
                    url = %setting.server_url,
                    status = result.status_code,
                    success = result.success,
                    "Remote ping completed"
                );
                Ok(result)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProbeMethod;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn setting() -> PingSetting {
        PingSetting::new("https://my.url.com")
            .with_timeout(Duration::from_millis(500))
            .with_method(ProbeMethod::Get)
    }

    #[tokio::test]
    async fn test_remote_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("url", "https://my.url.com"))
            .and(query_param("method", "GET"))
            .and(query_param("timeout", "500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "URL": "https://my.url.com",
                "Method": "GET",
                "Timeout": 500,
                "Latency": 100,
                "StatusCode": 200,
                "IsError": false
            })))
            .mount(&server)
            .await;

        let prober = RemoteProber::new(&server.uri()).unwrap();
        let result = prober.probe(&setting()).await.unwrap();

        assert_eq!(result, ProbeResult::completed(Duration::from_millis(100), 200));
        assert_eq!(result.message, "OK");
    }

    #[tokio::test]
    async fn test_remote_error_maps_to_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "StatusCode": 503,
                "IsError": true,
                "Error": "Some error"
            })))
            .mount(&server)
            .await;

        let prober = RemoteProber::new(&server.uri()).unwrap();
        let result = prober.probe(&setting()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.status_code, 503);
        assert_eq!(result.latency, Duration::ZERO);
        assert_eq!(result.message, "Some error");
    }

    #[tokio::test]
    async fn test_remote_call_is_raced_against_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"Latency": 1, "StatusCode": 200}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let prober = RemoteProber::new(&server.uri()).unwrap();
        let setting = setting().with_timeout(Duration::from_millis(50));

        assert_eq!(prober.probe(&setting).await.unwrap(), ProbeResult::timed_out());
    }

    #[tokio::test]
    async fn test_remote_garbage_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("nope"))
            .mount(&server)
            .await;

        let prober = RemoteProber::new(&server.uri()).unwrap();
        assert!(matches!(
            prober.probe(&setting()).await,
            Err(ProbeError::Remote(_))
        ));
    }
}
