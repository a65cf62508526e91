//! Relay settings on top of the host's key-value store.
//!
//! Every value is persisted as a string. Booleans are written as `"true"` or
//! `"false"` and read back through a lenient truthiness check so that values
//! written by older tooling (`"1"`, `"yes"`) keep working.
use crate::path_filter::PathFilterMatcher;
use crate::store::{KeyValueStore, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Logs at info level when debug mode is enabled, at debug level otherwise.
macro_rules! relay_debug {
    ($config:expr, $($arg:tt)+) => {
        if $config.is_debug_mode() {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}
pub(crate) use relay_debug;

pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const TARGET_URL: &str = "django_callback_url";
    pub const SECRET: &str = "onlyoffice_secret";
    pub const AUTH_TOKEN: &str = "auth_token";
    pub const PATH_FILTER: &str = "path_filter";
    pub const DEBUG_MODE: &str = "debug_mode";
    pub const HEALTH_CHECK_ENABLED: &str = "health_check_enabled";
    pub const HEALTH_CHECK_URL: &str = "health_check_url";
    pub const HEALTH_CHECK_INTERVAL: &str = "health_check_interval";
    pub const INCLUDE_USER_METADATA: &str = "include_user_metadata";
    pub const INCLUDE_TIMESTAMP: &str = "include_timestamp";
    pub const LAST_HEALTH_CHECK: &str = "last_health_check";
    pub const BACKEND_HEALTHY: &str = "backend_healthy";
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum DefaultValue {
    Bool(bool),
    Int(i64),
    Str(&'static str),
}

impl DefaultValue {
    fn to_stored(self) -> String {
        match self {
            DefaultValue::Bool(b) => bool_to_stored(b).to_string(),
            DefaultValue::Int(i) => i.to_string(),
            DefaultValue::Str(s) => s.to_string(),
        }
    }
}

const DEFAULTS: &[(&str, DefaultValue)] = &[
    (keys::ENABLED, DefaultValue::Bool(false)),
    (keys::TARGET_URL, DefaultValue::Str("")),
    (keys::SECRET, DefaultValue::Str("")),
    (keys::AUTH_TOKEN, DefaultValue::Str("")),
    (keys::PATH_FILTER, DefaultValue::Str("/Data/")),
    (keys::DEBUG_MODE, DefaultValue::Bool(false)),
    (keys::HEALTH_CHECK_ENABLED, DefaultValue::Bool(true)),
    (keys::HEALTH_CHECK_URL, DefaultValue::Str("")),
    (keys::HEALTH_CHECK_INTERVAL, DefaultValue::Int(300)),
    (keys::INCLUDE_USER_METADATA, DefaultValue::Bool(true)),
    (keys::INCLUDE_TIMESTAMP, DefaultValue::Bool(true)),
    (keys::LAST_HEALTH_CHECK, DefaultValue::Int(0)),
    (keys::BACKEND_HEALTHY, DefaultValue::Bool(true)),
];

/// Keys owned by the health gate. Settings updates never write them.
const INTERNAL_KEYS: &[&str] = &[keys::LAST_HEALTH_CHECK, keys::BACKEND_HEALTHY];

fn default_for(key: &str) -> Option<DefaultValue> {
    DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, d)| *d)
}

/// Snapshot of every relay setting, serialized with the persisted key names.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayConfig {
    pub enabled: bool,
    #[serde(rename = "django_callback_url")]
    pub target_url: String,
    #[serde(rename = "onlyoffice_secret")]
    pub secret: String,
    pub auth_token: String,
    pub path_filter: String,
    pub debug_mode: bool,
    pub health_check_enabled: bool,
    pub health_check_url: String,
    #[serde(rename = "health_check_interval")]
    pub health_check_interval_seconds: i64,
    pub include_user_metadata: bool,
    pub include_timestamp: bool,
    #[serde(rename = "last_health_check")]
    pub last_health_check_epoch: i64,
    pub backend_healthy: bool,
}

pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ConfigStore { store }
    }

    /// Stored value for `key`, or its documented default.
    ///
    /// Read failures are logged and fall back to the default.
    pub fn get(&self, key: &str) -> String {
        match self.store.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => default_for(key).map(DefaultValue::to_stored).unwrap_or_default(),
            Err(e) => {
                tracing::error!(key, error = %e, "failed to read relay setting");
                default_for(key).map(DefaultValue::to_stored).unwrap_or_default()
            }
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.store.set(key, value)
    }

    pub fn get_all(&self) -> RelayConfig {
        RelayConfig {
            enabled: self.is_enabled(),
            target_url: self.target_url(),
            secret: self.secret(),
            auth_token: self.auth_token(),
            path_filter: self.path_filter(),
            debug_mode: self.is_debug_mode(),
            health_check_enabled: self.is_health_check_enabled(),
            health_check_url: self.health_check_url(),
            health_check_interval_seconds: self.health_check_interval(),
            include_user_metadata: self.include_user_metadata(),
            include_timestamp: self.include_timestamp(),
            last_health_check_epoch: self.get_int(keys::LAST_HEALTH_CHECK),
            backend_healthy: self.is_backend_healthy(),
        }
    }

    /// Persists every known key in `values` in a single write. Unknown keys
    /// and the health cache keys are dropped.
    pub fn save_all(&self, values: &Map<String, Value>) -> Result<(), StoreError> {
        let entries: Vec<(&str, String)> = values
            .iter()
            .filter(|(key, _)| !INTERNAL_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| {
                let stored = match default_for(key)? {
                    DefaultValue::Bool(_) => bool_to_stored(is_truthy(value)).to_string(),
                    DefaultValue::Int(_) | DefaultValue::Str(_) => value_to_stored(value),
                };
                Some((key.as_str(), stored))
            })
            .collect();

        self.store.set_many(&entries)?;

        relay_debug!(self, "Configuration saved");
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.get_bool(keys::ENABLED)
    }

    pub fn is_debug_mode(&self) -> bool {
        self.get_bool(keys::DEBUG_MODE)
    }

    pub fn is_health_check_enabled(&self) -> bool {
        self.get_bool(keys::HEALTH_CHECK_ENABLED)
    }

    pub fn is_backend_healthy(&self) -> bool {
        self.get_bool(keys::BACKEND_HEALTHY)
    }

    /// Caches a probe result. Failures are logged: the next probe retries.
    pub fn set_backend_healthy(&self, healthy: bool, now: i64) {
        let result = self.store.set_many(&[
            (keys::BACKEND_HEALTHY, bool_to_stored(healthy).to_string()),
            (keys::LAST_HEALTH_CHECK, now.to_string()),
        ]);
        if let Err(e) = result {
            tracing::error!(error = %e, "failed to cache backend health");
        }
    }

    pub fn should_run_health_check(&self, now: i64) -> bool {
        if !self.is_health_check_enabled() {
            return false;
        }

        let last_check = self.get_int(keys::LAST_HEALTH_CHECK);
        now.saturating_sub(last_check) >= self.health_check_interval()
    }

    pub fn target_url(&self) -> String {
        self.get(keys::TARGET_URL)
    }

    pub fn secret(&self) -> String {
        self.get(keys::SECRET)
    }

    pub fn auth_token(&self) -> String {
        self.get(keys::AUTH_TOKEN)
    }

    pub fn path_filter(&self) -> String {
        self.get(keys::PATH_FILTER)
    }

    pub fn health_check_url(&self) -> String {
        self.get(keys::HEALTH_CHECK_URL)
    }

    pub fn health_check_interval(&self) -> i64 {
        self.get_int(keys::HEALTH_CHECK_INTERVAL)
    }

    pub fn include_user_metadata(&self) -> bool {
        self.get_bool(keys::INCLUDE_USER_METADATA)
    }

    pub fn include_timestamp(&self) -> bool {
        self.get_bool(keys::INCLUDE_TIMESTAMP)
    }

    pub fn path_matcher(&self) -> PathFilterMatcher {
        PathFilterMatcher::new(&self.path_filter())
    }

    pub fn is_available(&self) -> bool {
        self.store.is_available()
    }

    fn get_bool(&self, key: &str) -> bool {
        to_bool(&self.get(key))
    }

    /// Unparseable integers read as zero.
    fn get_int(&self, key: &str) -> i64 {
        self.get(key).trim().parse().unwrap_or(0)
    }
}

fn bool_to_stored(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn to_bool(value: &str) -> bool {
    matches!(value, "true" | "1" | "yes")
}

/// Truthiness of a submitted settings value.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => to_bool(s),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn value_to_stored(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => bool_to_stored(*b).to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn config_store() -> (Arc<MemoryStore>, ConfigStore) {
        let store = Arc::new(MemoryStore::default());
        (store.clone(), ConfigStore::new(store))
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_defaults() {
        let (_, config) = config_store();
        let all = config.get_all();

        assert!(!all.enabled);
        assert_eq!(all.target_url, "");
        assert_eq!(all.path_filter, "/Data/");
        assert!(all.health_check_enabled);
        assert_eq!(all.health_check_interval_seconds, 300);
        assert!(all.include_user_metadata);
        assert!(all.include_timestamp);
        assert_eq!(all.last_health_check_epoch, 0);
        assert!(all.backend_healthy);

        assert_eq!(config.get(keys::ENABLED), "false");
        assert_eq!(config.get("unknown_key"), "");
    }

    #[test]
    fn test_boolean_normalization() {
        let (store, config) = config_store();

        for (raw, expected) in [
            ("true", true),
            ("1", true),
            ("yes", true),
            ("false", false),
            ("0", false),
            ("", false),
            ("TRUE", false),
            ("on", false),
        ] {
            store.set(keys::ENABLED, raw).unwrap();
            assert_eq!(config.is_enabled(), expected, "value {raw:?}");
        }
    }

    #[test]
    fn test_save_all() {
        let (store, config) = config_store();

        config
            .save_all(&object(json!({
                "enabled": true,
                "debug_mode": "yes",
                "include_timestamp": 0,
                "django_callback_url": "https://backend.example.com/hook",
                "health_check_interval": 60,
                "not_a_setting": "dropped",
            })))
            .unwrap();

        assert_eq!(store.get("enabled").unwrap().as_deref(), Some("true"));
        assert_eq!(store.get("debug_mode").unwrap().as_deref(), Some("true"));
        assert_eq!(
            store.get("include_timestamp").unwrap().as_deref(),
            Some("false")
        );
        assert_eq!(store.get("health_check_interval").unwrap().as_deref(), Some("60"));
        assert_eq!(store.get("not_a_setting").unwrap(), None);

        let all = config.get_all();
        assert!(all.enabled);
        assert!(all.debug_mode);
        assert!(!all.include_timestamp);
        assert_eq!(all.target_url, "https://backend.example.com/hook");
        assert_eq!(all.health_check_interval_seconds, 60);
    }

    #[test]
    fn test_should_run_health_check() {
        let (_, config) = config_store();
        let now = 10_000;

        // Never checked before
        assert!(config.should_run_health_check(now));

        config.set_backend_healthy(false, now - 100);
        assert!(!config.should_run_health_check(now));
        assert!(!config.is_backend_healthy());

        config.set_backend_healthy(true, now - 300);
        assert!(config.should_run_health_check(now));
        assert!(config.is_backend_healthy());

        config.set(keys::HEALTH_CHECK_ENABLED, "false").unwrap();
        assert!(!config.should_run_health_check(now));
    }

    #[test]
    fn test_save_all_ignores_health_cache() {
        let (store, config) = config_store();

        config
            .save_all(&object(json!({
                "last_health_check": "-9223372036854775808",
                "backend_healthy": false,
                "path_filter": "/Shared/",
            })))
            .unwrap();

        assert_eq!(store.get(keys::LAST_HEALTH_CHECK).unwrap(), None);
        assert_eq!(store.get(keys::BACKEND_HEALTHY).unwrap(), None);
        assert_eq!(config.path_filter(), "/Shared/");
        assert!(config.is_backend_healthy());
    }

    #[test]
    fn test_should_run_health_check_extreme_timestamps() {
        let (store, config) = config_store();

        store
            .set(keys::LAST_HEALTH_CHECK, &i64::MIN.to_string())
            .unwrap();
        assert!(config.should_run_health_check(10_000));

        // A last check far in the future never triggers a probe
        store
            .set(keys::LAST_HEALTH_CHECK, &i64::MAX.to_string())
            .unwrap();
        assert!(!config.should_run_health_check(i64::MIN));
    }

    #[test]
    fn test_serialized_key_names() {
        let (_, config) = config_store();
        let value = serde_json::to_value(config.get_all()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        for (key, _) in DEFAULTS {
            assert!(keys.contains(key), "missing {key}");
        }
        assert_eq!(keys.len(), DEFAULTS.len());
    }
}
