//! Liveness of the downstream backend.
//!
//! A probe is a plain GET against the configured health URL. Results are
//! cached in the config store so that triggers only pay for a probe once per
//! interval.
use crate::clock::unix_now;
use crate::config_store::{ConfigStore, relay_debug};
use crate::metrics_defs::HEALTH_PROBES;
use serde::Serialize;
use serde_json::Value;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
    pub status_code: Option<u16>,
    /// Unset when no probe was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_epoch: Option<i64>,
    /// The probe response body, when it is a JSON object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct HealthGate {
    config: Arc<ConfigStore>,
    client: reqwest::Client,
}

impl HealthGate {
    pub fn new(config: Arc<ConfigStore>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(HealthGate { config, client })
    }

    /// Probes the backend now and caches the result.
    ///
    /// Never fails: transport errors and non-2xx responses are reported as
    /// unhealthy.
    pub async fn check(&self) -> HealthStatus {
        let url = self.config.health_check_url();
        if url.is_empty() {
            return HealthStatus {
                healthy: false,
                message: "Health check URL not configured".into(),
                status_code: None,
                last_checked_epoch: None,
                response: None,
                error: None,
            };
        }

        let result = self.client.get(&url).send().await;
        let now = unix_now();

        let status = match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let healthy = response.status().is_success();
                let body = response
                    .bytes()
                    .await
                    .ok()
                    .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
                    .filter(Value::is_object);

                relay_debug!(
                    self.config,
                    healthy,
                    url = %url,
                    status = status_code,
                    "Health check completed"
                );

                HealthStatus {
                    healthy,
                    message: if healthy {
                        "Backend is healthy".into()
                    } else {
                        format!("Health check returned status {status_code}")
                    },
                    status_code: Some(status_code),
                    last_checked_epoch: Some(now),
                    response: body,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Health check failed");
                HealthStatus {
                    healthy: false,
                    message: format!("Health check failed: {e}"),
                    status_code: None,
                    last_checked_epoch: Some(now),
                    response: None,
                    error: Some(e.to_string()),
                }
            }
        };

        counter!(HEALTH_PROBES, "result" => if status.healthy { "healthy" } else { "unhealthy" })
            .increment(1);
        self.config.set_backend_healthy(status.healthy, now);
        status
    }

    /// Whether relay actions may proceed.
    ///
    /// With health checking disabled the backend is assumed healthy. Otherwise
    /// the cached state is used until the interval has elapsed.
    pub async fn check_if_needed(&self) -> bool {
        if !self.config.is_health_check_enabled() {
            return true;
        }

        if self.config.should_run_health_check(unix_now()) {
            return self.check().await.healthy;
        }

        self.config.is_backend_healthy()
    }
}
