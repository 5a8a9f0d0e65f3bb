//! Configuration sections with serde defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// TCP port to bind. Default: 8080
    #[serde(default = "HttpConfig::default_port")]
    pub port: u16,

    /// Maximum accepted request body size in bytes. Default: 1 MiB
    #[serde(default = "HttpConfig::default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Base URL prefixed onto locally stored asset keys when minting
    /// externally resolvable URLs. Default: http://localhost:<port>
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl HttpConfig {
    fn default_port() -> u16 {
        8080
    }

    fn default_max_body_bytes() -> usize {
        1024 * 1024
    }

    /// Resolve the public base URL, falling back to localhost on the bound port.
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            max_body_bytes: Self::default_max_body_bytes(),
            public_base_url: None,
        }
    }
}

/// Persistent job store location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    /// SQLite database path. A `sqlite:` scheme prefix is tolerated.
    /// No default: boot fails when unset.
    #[serde(default)]
    pub url: String,
}

impl DatabaseConfig {
    /// The on-disk path with any `sqlite:`/`sqlite://` prefix removed.
    pub fn path(&self) -> PathBuf {
        let trimmed = self
            .url
            .strip_prefix("sqlite://")
            .or_else(|| self.url.strip_prefix("sqlite:"))
            .unwrap_or(&self.url);
        PathBuf::from(trimmed)
    }
}

/// Which blob backend holds produced assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    S3,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(other.to_string()),
        }
    }
}

/// S3-compatible backend settings. Ignored for the local backend.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3Config {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible stores (MinIO etc). Implies
    /// path-style URLs.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

/// Asset storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selector. Default: local
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the local backend and for per-job scratch space.
    /// Default: ./assets
    #[serde(default = "StorageConfig::default_assets_dir")]
    pub assets_dir: PathBuf,

    #[serde(default)]
    pub s3: S3Config,
}

impl StorageConfig {
    fn default_assets_dir() -> PathBuf {
        PathBuf::from("assets")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            assets_dir: Self::default_assets_dir(),
            s3: S3Config::default(),
        }
    }
}

/// External transcoder binaries and the per-job execution budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Transcoder binary. Default: ffmpeg
    #[serde(default = "TranscoderConfig::default_bin")]
    pub bin: String,

    /// Metadata probe binary. Default: ffprobe
    #[serde(default = "TranscoderConfig::default_probe_bin")]
    pub probe_bin: String,

    /// Wall-clock budget for one generation job, in milliseconds. When unset,
    /// the worker derives 15 min per requested minute of audio.
    #[serde(default)]
    pub generation_timeout_ms: Option<u64>,
}

impl TranscoderConfig {
    fn default_bin() -> String {
        "ffmpeg".to_string()
    }

    fn default_probe_bin() -> String {
        "ffprobe".to_string()
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            bin: Self::default_bin(),
            probe_bin: Self::default_probe_bin(),
            generation_timeout_ms: None,
        }
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Concurrency for job types without an explicit entry. Default: 2
    #[serde(default = "WorkerConfig::default_concurrency")]
    pub default_concurrency: u32,

    /// Per-type overrides, e.g. `audio = 4`.
    #[serde(default)]
    pub per_type: BTreeMap<String, u32>,

    /// Grace window for in-flight jobs during shutdown, seconds. Default: 20
    #[serde(default = "WorkerConfig::default_shutdown_grace_sec")]
    pub shutdown_grace_sec: u64,
}

impl WorkerConfig {
    fn default_concurrency() -> u32 {
        2
    }

    fn default_shutdown_grace_sec() -> u64 {
        20
    }

    /// Concurrency for one job type.
    pub fn concurrency_for(&self, job_type: &str) -> u32 {
        self.per_type
            .get(job_type)
            .copied()
            .unwrap_or(self.default_concurrency)
    }

    /// Parse the `WORKER_CONCURRENCY` env shape: either a bare integer
    /// applied to every type, or a map literal like `audio=2,video=1`.
    pub fn parse_env(value: &str) -> Result<Self, String> {
        let mut config = Self::default();
        let value = value.trim();

        if let Ok(n) = value.parse::<u32>() {
            config.default_concurrency = n;
            return Ok(config);
        }

        for pair in value.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, count) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected name=count, got {pair:?}"))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|_| format!("bad count in {pair:?}"))?;
            config.per_type.insert(name.trim().to_string(), count);
        }

        if config.per_type.is_empty() {
            return Err(format!("unparseable concurrency spec {value:?}"));
        }
        Ok(config)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: Self::default_concurrency(),
            per_type: BTreeMap::new(),
            shutdown_grace_sec: Self::default_shutdown_grace_sec(),
        }
    }
}

/// Tenancy limits and bootstrap credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests per key per UTC minute. Default: 60
    #[serde(default = "LimitsConfig::default_rate_limit_per_min")]
    pub rate_limit_per_min: u32,

    /// API key seeded into the store at boot, if set.
    #[serde(default)]
    pub default_api_key: Option<String>,

    /// How long a succeeded job satisfies duplicate enqueues, hours.
    /// Default: 24
    #[serde(default = "LimitsConfig::default_idempotency_window_hours")]
    pub idempotency_window_hours: u64,
}

impl LimitsConfig {
    fn default_rate_limit_per_min() -> u32 {
        60
    }

    fn default_idempotency_window_hours() -> u64 {
        24
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_min: Self::default_rate_limit_per_min(),
            default_api_key: None,
            idempotency_window_hours: Self::default_idempotency_window_hours(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level (trace, debug, info, warn, error). Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
