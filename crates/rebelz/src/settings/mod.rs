//! Application settings.
//!
//! Layered from an optional TOML file and `REBELZ_*` environment variables.
//! Every field has a default, but loading still fails validation unless the
//! auth section either enables dev mode or carries a JWT secret.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::auth::AuthConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub stream: StreamSettings,
    pub auth: AuthConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            stream: StreamSettings::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("rebelz.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Seconds between heartbeat envelopes on open agent streams.
    pub heartbeat_secs: u64,
    /// Bound of each per-connection send queue.
    pub queue_size: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_secs: 30,
            queue_size: 64,
        }
    }
}

impl Settings {
    /// Load settings, layering defaults, an optional TOML file and
    /// `REBELZ_` environment overrides (`REBELZ_SERVER__PORT=9000`).
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(Environment::with_prefix("REBELZ").separator("__"))
            .build()
            .context("failed to assemble configuration")?;

        let settings: Settings = config
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        settings
            .auth
            .validate()
            .context("invalid auth configuration")?;

        Ok(settings)
    }
}
