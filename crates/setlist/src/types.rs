//! Job store data model.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// What a job produces. The pipeline type orchestrates the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Plan,
    Audio,
    Vocals,
    Mix,
    Video,
    Pipeline,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::Plan,
        JobType::Audio,
        JobType::Vocals,
        JobType::Mix,
        JobType::Video,
        JobType::Pipeline,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Plan => "plan",
            JobType::Audio => "audio",
            JobType::Vocals => "vocals",
            JobType::Mix => "mix",
            JobType::Video => "video",
            JobType::Pipeline => "pipeline",
        }
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plan" => Ok(JobType::Plan),
            "audio" => Ok(JobType::Audio),
            "vocals" => Ok(JobType::Vocals),
            "mix" => Ok(JobType::Mix),
            "video" => Ok(JobType::Video),
            "pipeline" => Ok(JobType::Pipeline),
            other => Err(format!("unknown job type {other:?}")),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status {other:?}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One persisted job. Timestamps are UTC epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub params: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    /// Earliest time this job may run (again); drives retry backoff.
    pub available_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    /// Set when the job succeeded; anchors the idempotent-return window.
    pub last_success_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub error: Option<String>,
    pub progress: f64,
    pub status_message: Option<String>,
    pub dedupe_key: String,
    pub parent_id: Option<String>,
    pub api_key_id: Option<String>,
    /// Holder of the claim while running.
    pub worker_id: Option<String>,
}

/// Media kind of a produced asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Wav,
    Mp3,
    Mp4,
    Json,
    Srt,
}

impl AssetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AssetKind::Wav => "wav",
            AssetKind::Mp3 => "mp3",
            AssetKind::Mp4 => "mp4",
            AssetKind::Json => "json",
            AssetKind::Srt => "srt",
        }
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wav" => Ok(AssetKind::Wav),
            "mp3" => Ok(AssetKind::Mp3),
            "mp4" => Ok(AssetKind::Mp4),
            "json" => Ok(AssetKind::Json),
            "srt" => Ok(AssetKind::Srt),
            other => Err(format!("unknown asset kind {other:?}")),
        }
    }
}

/// A produced artifact row. Written only when the owning job succeeds,
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub job_id: String,
    pub kind: AssetKind,
    pub mime: String,
    pub path: String,
    pub url: String,
    pub duration_sec: f64,
    pub size_bytes: u64,
    pub meta: serde_json::Value,
    pub created_at: i64,
}

/// Asset data as handed over by a succeeding job handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAsset {
    pub kind: AssetKind,
    pub mime: String,
    pub path: String,
    pub url: String,
    pub duration_sec: f64,
    pub size_bytes: u64,
    pub meta: serde_json::Value,
}

/// A tenant credential. The key value is immutable; disabling sets
/// `disabled_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub key: String,
    pub owner: String,
    pub rate_limit_per_min: u32,
    pub disabled_at: Option<i64>,
    pub created_at: i64,
}

impl ApiKey {
    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }
}

/// Enqueue knobs beyond type and params.
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub parent_id: Option<String>,
    pub api_key_id: Option<String>,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub idempotency_window_ms: i64,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            parent_id: None,
            api_key_id: None,
            max_attempts: 3,
            backoff_ms: 2000,
            idempotency_window_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Outcome of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueResult {
    pub job_id: String,
    /// True when an existing job satisfied the request.
    pub reused: bool,
}

/// Store-level failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("payload encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Failure classes the worker pool distinguishes when settling a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    DependencyUnavailable,
    TranscoderFailed,
    TimedOut,
    AssetNotProduced,
    InternalError,
}

impl ErrorKind {
    /// Highest attempt count after which this class stops retrying.
    ///
    /// Timeouts and missing outputs retry once; dependency and transcoder
    /// failures use the job's full budget; invalid requests never retry.
    pub fn attempt_cap(self, max_attempts: u32) -> u32 {
        match self {
            ErrorKind::InvalidRequest => 1,
            ErrorKind::DependencyUnavailable | ErrorKind::TranscoderFailed => max_attempts,
            ErrorKind::TimedOut | ErrorKind::AssetNotProduced | ErrorKind::InternalError => {
                max_attempts.min(2)
            }
        }
    }
}

/// A classified handler failure.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct JobError {
    pub kind: ErrorKind,
    /// Short, non-sensitive message stored on the job row.
    pub message: String,
    /// Whether this specific instance may be retried at all.
    pub retryable: bool,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let retryable = kind != ErrorKind::InvalidRequest;
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
        }
    }
}
