//! Config file discovery, loading, and environment variable overlay.

use crate::sections::{StorageBackend, WorkerConfig};
use crate::{ConfigError, JamConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Find the config file to load, if any.
///
/// A CLI-provided path wins; otherwise `./jamboree.toml` is used when it
/// exists. Only files that exist are returned.
pub fn discover_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        return None;
    }

    let local = PathBuf::from("jamboree.toml");
    if local.exists() {
        return Some(local);
    }
    None
}

/// Load config from a TOML file.
pub fn load_from_file(path: &Path) -> Result<JamConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Apply environment variables on top of file-loaded config.
///
/// The variable names are the deployment contract; each one applied is
/// recorded in `sources.env_overrides`.
pub fn apply_env_overrides(
    config: &mut JamConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    if let Some(value) = read_env(sources, "PORT") {
        config.http.port = value.parse().map_err(|_| ConfigError::Invalid {
            name: "PORT",
            value,
        })?;
    }

    if let Some(value) = read_env(sources, "PUBLIC_BASE_URL") {
        config.http.public_base_url = Some(value);
    }

    if let Some(value) = read_env(sources, "DATABASE_URL") {
        config.database.url = value;
    }

    if let Some(value) = read_env(sources, "ASSETS_DIR") {
        config.storage.assets_dir = PathBuf::from(value);
    }

    if let Some(value) = read_env(sources, "STORAGE_BACKEND") {
        config.storage.backend =
            value
                .parse::<StorageBackend>()
                .map_err(|_| ConfigError::Invalid {
                    name: "STORAGE_BACKEND",
                    value,
                })?;
    }

    if let Some(value) = read_env(sources, "S3_BUCKET") {
        config.storage.s3.bucket = Some(value);
    }
    if let Some(value) = read_env(sources, "S3_REGION") {
        config.storage.s3.region = Some(value);
    }
    if let Some(value) = read_env(sources, "S3_ENDPOINT") {
        config.storage.s3.endpoint = Some(value);
    }
    if let Some(value) = read_env(sources, "S3_ACCESS_KEY_ID") {
        config.storage.s3.access_key_id = Some(value);
    }
    if let Some(value) = read_env(sources, "S3_SECRET_ACCESS_KEY") {
        config.storage.s3.secret_access_key = Some(value);
    }

    if let Some(value) = read_env(sources, "DEFAULT_API_KEY") {
        config.limits.default_api_key = Some(value);
    }

    if let Some(value) = read_env(sources, "RATE_LIMIT_PER_MIN") {
        config.limits.rate_limit_per_min = value.parse().map_err(|_| ConfigError::Invalid {
            name: "RATE_LIMIT_PER_MIN",
            value,
        })?;
    }

    if let Some(value) = read_env(sources, "WORKER_CONCURRENCY") {
        let parsed = WorkerConfig::parse_env(&value).map_err(|_| ConfigError::Invalid {
            name: "WORKER_CONCURRENCY",
            value,
        })?;
        config.workers.default_concurrency = parsed.default_concurrency;
        config.workers.per_type = parsed.per_type;
    }

    if let Some(value) = read_env(sources, "TRANSCODER_BIN") {
        config.transcoder.bin = value;
    }
    if let Some(value) = read_env(sources, "TRANSCODER_PROBE_BIN") {
        config.transcoder.probe_bin = value;
    }

    if let Some(value) = read_env(sources, "GENERATION_TIMEOUT_MS") {
        config.transcoder.generation_timeout_ms =
            Some(value.parse().map_err(|_| ConfigError::Invalid {
                name: "GENERATION_TIMEOUT_MS",
                value,
            })?);
    }

    if let Some(value) = read_env(sources, "LOG_LEVEL") {
        config.telemetry.log_level = value;
    }

    Ok(())
}

fn read_env(sources: &mut ConfigSources, name: &'static str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => {
            sources.env_overrides.push(name.to_string());
            Some(value)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_from_file_parses_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[http]
port = 9000

[database]
url = "jobs.db"

[storage]
backend = "local"
assets_dir = "/srv/assets"

[workers]
default_concurrency = 3

[workers.per_type]
video = 1
"#
        )
        .unwrap();

        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.database.url, "jobs.db");
        assert_eq!(config.storage.assets_dir, PathBuf::from("/srv/assets"));
        assert_eq!(config.workers.concurrency_for("video"), 1);
        assert_eq!(config.workers.concurrency_for("audio"), 3);
    }

    #[test]
    fn load_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http\nport = 9000").unwrap();
        assert!(matches!(
            load_from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn discover_prefers_cli_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let found = discover_config_file(Some(file.path()));
        assert_eq!(found, Some(file.path().to_path_buf()));

        let missing = discover_config_file(Some(Path::new("/nonexistent/jam.toml")));
        assert_eq!(missing, None);
    }
}
