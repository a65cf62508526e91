pub mod api;
mod clock;
pub mod config;
pub mod config_store;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metadata;
pub mod metrics_defs;
pub mod notifier;
pub mod path_filter;
pub mod rewriter;
pub mod settings;
pub mod store;
#[cfg(test)]
mod testutils;
pub mod token;
pub mod trigger;

use crate::api::{IngressService, SettingsService};
use crate::config_store::ConfigStore;
use crate::dispatcher::Dispatcher;
use crate::errors::RelayError;
use crate::health::HealthGate;
use crate::notifier::NotificationDispatcher;
use crate::settings::Settings;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;

pub async fn run(config: config::Config) -> Result<(), RelayError> {
    config.validate()?;
    tracing::info!(store = ?config.store.r#type, "Starting callback relay");

    let store = store::get_store(&config.store.r#type)?;
    let config_store = Arc::new(ConfigStore::new(store));
    let health = Arc::new(HealthGate::new(config_store.clone())?);
    let notifier = Arc::new(NotificationDispatcher::new(config_store.clone())?);

    let dispatcher = Arc::new(Dispatcher::new(
        config_store.clone(),
        health.clone(),
        notifier,
    ));
    let settings = Arc::new(Settings::new(config_store.clone(), health));

    let ingress_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        IngressService::new(dispatcher),
    );

    let readiness_store = config_store.clone();
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::new(
            move || readiness_store.is_available(),
            SettingsService::new(settings),
        ),
    );

    tokio::try_join!(ingress_task, admin_task)?;
    Ok(())
}
