//! Admin operations on the relay settings.
use crate::config_store::{ConfigStore, RelayConfig, is_truthy, keys};
use crate::health::{HealthGate, HealthStatus};
use crate::store::StoreError;
use http::StatusCode;
use serde_json::{Map, Value};
use std::sync::Arc;

const MASK: &str = "********";

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("Callback URL is required when interceptor is enabled")]
    MissingTargetUrl,

    #[error("Settings must be a JSON object")]
    InvalidBody,

    #[error("Failed to save settings: {0}")]
    Store(#[from] StoreError),
}

impl SettingsError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SettingsError::MissingTargetUrl | SettingsError::InvalidBody => StatusCode::BAD_REQUEST,
            SettingsError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub struct Settings {
    config: Arc<ConfigStore>,
    health: Arc<HealthGate>,
}

impl Settings {
    pub fn new(config: Arc<ConfigStore>, health: Arc<HealthGate>) -> Self {
        Settings { config, health }
    }

    /// Current settings with credentials masked.
    pub fn get_config(&self) -> RelayConfig {
        let mut config = self.config.get_all();
        if !config.secret.is_empty() {
            config.secret = MASK.into();
        }
        if !config.auth_token.is_empty() {
            config.auth_token = MASK.into();
        }
        config
    }

    /// Saves a partial settings update.
    ///
    /// Enabling the relay requires a target URL, either in the same update or
    /// already stored. The update is written as a whole: when the store fails
    /// no key of it is kept. When the update turns on health checking with a
    /// URL the backend is probed right away.
    pub async fn save_settings(&self, body: &Value) -> Result<(), SettingsError> {
        let update = body.as_object().ok_or(SettingsError::InvalidBody)?;

        if requested(update, keys::ENABLED) {
            let target_url = match update.get(keys::TARGET_URL) {
                Some(value) => value.as_str().unwrap_or_default().to_string(),
                None => self.config.target_url(),
            };
            if target_url.trim().is_empty() {
                return Err(SettingsError::MissingTargetUrl);
            }
        }

        if let Err(e) = self.config.save_all(update) {
            tracing::error!(error = %e, "Failed to save settings");
            return Err(e.into());
        }

        let health_check_url = update
            .get(keys::HEALTH_CHECK_URL)
            .and_then(Value::as_str)
            .unwrap_or_default();
        if requested(update, keys::HEALTH_CHECK_ENABLED) && !health_check_url.is_empty() {
            self.health.check().await;
        }

        Ok(())
    }

    /// Probes the backend now.
    pub async fn test_health_check(&self) -> HealthStatus {
        self.health.check().await
    }
}

fn requested(update: &Map<String, Value>, key: &str) -> bool {
    update.get(key).is_some_and(is_truthy)
}
