//! Minimal configuration loading for Jamboree.
//!
//! Configuration comes from two layers, later wins:
//!
//! 1. `./jamboree.toml` (optional local file)
//! 2. Environment variables (`PORT`, `DATABASE_URL`, ...)
//!
//! The environment layer uses the deployment-facing variable names directly
//! rather than a prefixed scheme, because that is the contract the service is
//! operated against. `DATABASE_URL` has no default: loading fails without it.
//!
//! # Usage
//!
//! ```rust,no_run
//! use jamconf::JamConfig;
//!
//! let config = JamConfig::load().expect("failed to load config");
//! println!("listening on port {}", config.http.port);
//! println!("database at {}", config.database.url);
//! ```

pub mod loader;
pub mod sections;

pub use loader::ConfigSources;
pub use sections::{
    DatabaseConfig, HttpConfig, LimitsConfig, StorageBackend, StorageConfig, TelemetryConfig,
    TranscoderConfig, WorkerConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Complete Jamboree configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JamConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl JamConfig {
    /// Load configuration from the local file (if present) plus environment.
    ///
    /// Fails if `DATABASE_URL` is set in neither layer.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load from a specific file path, then apply env overrides.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report where values came from.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut config = JamConfig::default();

        if let Some(path) = loader::discover_config_file(config_path) {
            config = loader::load_from_file(&path)?;
            sources.files.push(path);
        }

        loader::apply_env_overrides(&mut config, &mut sources)?;

        if config.database.url.is_empty() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok((config, sources))
    }

    /// Serialize config to TOML for `--show-config`.
    ///
    /// Secrets (S3 credentials, the default API key) are redacted.
    pub fn to_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.storage.s3.secret_access_key.is_some() {
            shown.storage.s3.secret_access_key = Some("<redacted>".into());
        }
        if shown.limits.default_api_key.is_some() {
            shown.limits.default_api_key = Some("<redacted>".into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_an_error() {
        let config = JamConfig::default();
        assert!(config.database.url.is_empty());
        // load() would fail here; validated at the loader layer since tests
        // cannot safely clear the process environment.
    }

    #[test]
    fn to_toml_redacts_secrets() {
        let mut config = JamConfig::default();
        config.database.url = "jamboree.db".into();
        config.storage.s3.secret_access_key = Some("hunter2".into());
        config.limits.default_api_key = Some("jam_live_123".into());

        let dumped = config.to_toml();
        assert!(!dumped.contains("hunter2"));
        assert!(!dumped.contains("jam_live_123"));
        assert!(dumped.contains("<redacted>"));
    }
}
