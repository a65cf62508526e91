//! Outbound notifications to the backend.
//!
//! Notifications are fire-and-forget: one POST per event, no retries, and
//! failures never reach the caller.
use crate::config_store::{ConfigStore, relay_debug};
use crate::metadata::CallbackMetadata;
use crate::metrics_defs::{NOTIFICATION_DURATION, NOTIFICATIONS_SENT};
use async_trait::async_trait;
use indexmap::IndexMap;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::form_urlencoded;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const SOURCE_HEADER: &str = "X-Source";
pub const SOURCE: &str = "nextcloud-onlyoffice-interceptor";
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered { status: u16 },
    /// The backend answered with a non-2xx status.
    Rejected { status: u16 },
    /// The request could not be completed.
    Failed,
    /// No target URL is configured.
    NotConfigured,
}

impl NotifyOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Delivered { .. } => "delivered",
            NotifyOutcome::Rejected { .. } => "rejected",
            NotifyOutcome::Failed => "failed",
            NotifyOutcome::NotConfigured => "not_configured",
        }
    }
}

/// Delivers event metadata to the backend.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, metadata: &CallbackMetadata) -> NotifyOutcome;
}

pub struct NotificationDispatcher {
    config: Arc<ConfigStore>,
    client: reqwest::Client,
}

impl NotificationDispatcher {
    pub fn new(config: Arc<ConfigStore>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(NotificationDispatcher { config, client })
    }

    async fn send(&self, metadata: &CallbackMetadata) -> NotifyOutcome {
        let target_url = self.config.target_url();
        if target_url.is_empty() {
            tracing::error!("Notification URL not configured");
            return NotifyOutcome::NotConfigured;
        }

        let url = with_query(&target_url, metadata);
        let file_path = if metadata.file_path.is_empty() {
            "unknown"
        } else {
            metadata.file_path.as_str()
        };

        let mut request = self
            .client
            .post(&url)
            .header(SOURCE_HEADER, SOURCE)
            .json(metadata);

        let auth_token = self.config.auth_token();
        if !auth_token.is_empty() {
            request = request.header(AUTH_TOKEN_HEADER, auth_token);
        }

        let start = Instant::now();
        let result = request.send().await;
        histogram!(NOTIFICATION_DURATION).record(start.elapsed().as_secs_f64());

        match result {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                relay_debug!(
                    self.config,
                    url = %target_url,
                    file_path,
                    status,
                    "Successfully notified backend"
                );
                NotifyOutcome::Delivered { status }
            }
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::error!(url = %target_url, status, file_path, "Backend notification failed");
                NotifyOutcome::Rejected { status }
            }
            Err(e) => {
                tracing::error!(url = %target_url, error = %e, file_path, "Failed to notify backend");
                NotifyOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    /// Posts `metadata` to the target URL.
    ///
    /// The body is the metadata as JSON. The identifying fields are mirrored
    /// into the query string so that the backend can route on them without
    /// parsing the body.
    async fn notify(&self, metadata: &CallbackMetadata) -> NotifyOutcome {
        let outcome = self.send(metadata).await;
        counter!(NOTIFICATIONS_SENT, "outcome" => outcome.as_str()).increment(1);
        outcome
    }
}

/// Appends the mirrored metadata fields to `target_url`.
fn with_query(target_url: &str, metadata: &CallbackMetadata) -> String {
    let mirrored = [
        ("file_path", Some(metadata.file_path.as_str())),
        ("key", metadata.key()),
        ("user_id", metadata.resolved_user_id()),
        ("owner_id", metadata.owner_id()),
        ("user_display_name", metadata.user_display_name.as_deref()),
        (
            "session_user_display_name",
            metadata.session_user_display_name.as_deref(),
        ),
    ];

    let params: IndexMap<&str, &str> = mirrored
        .into_iter()
        .filter_map(|(key, value)| Some((key, value.filter(|v| !v.is_empty())?)))
        .collect();

    if params.is_empty() {
        return target_url.to_string();
    }

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(&params)
        .finish();
    let separator = if target_url.contains('?') { '&' } else { '?' };
    format!("{target_url}{separator}{query}")
}
