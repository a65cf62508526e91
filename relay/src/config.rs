use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener cannot share an address")]
    ListenerConflict,

    #[error("Settings file path cannot be empty")]
    EmptyStorePath,
}

/// Relay service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener receiving triggers from the host platform
    pub listener: Listener,
    /// Admin listener for settings and probe endpoints
    pub admin_listener: Listener,
    /// Where relay settings are persisted
    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Validates the relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::ListenerConflict);
        }

        if let StoreType::Filesystem { path } = &self.store.r#type
            && path.trim().is_empty()
        {
            return Err(ValidationError::EmptyStorePath);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum StoreType {
    #[default]
    Memory,
    Filesystem {
        path: String,
    },
}

#[derive(Clone, Deserialize, Debug, PartialEq, Default)]
pub struct StoreConfig {
    #[serde(flatten)]
    pub r#type: StoreType,
}
