//! Job handlers: one per job type, wired into the worker pool.

pub mod pipeline;
pub mod plan;
pub mod render;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use uuid::Uuid;

use bounce::{ProgressSink, RenderError, Renderer, VideoStyle};
use jamconf::JamConfig;
use music_plan::MusicPlan;
use setlist::{
    ErrorKind, Job, JobError, JobHandler, JobOutcome, JobType, Store, WorkerContext, WorkerPool,
};

use crate::enrich::PlanEnricher;
use crate::metrics::Metrics;

/// Shared construction dependencies for all handlers.
pub struct HandlerDeps {
    pub config: Arc<JamConfig>,
    pub renderer: Arc<Renderer>,
    pub enricher: Arc<dyn PlanEnricher>,
    pub metrics: Arc<Metrics>,
    pub waker: Arc<Notify>,
}

/// Register every job type on the pool with its configured concurrency.
pub fn register_all(pool: &mut WorkerPool, deps: HandlerDeps) {
    let HandlerDeps {
        config,
        renderer,
        enricher,
        metrics,
        waker,
    } = deps;

    let register = |pool: &mut WorkerPool,
                    job_type: JobType,
                    handler: Arc<dyn JobHandler>| {
        let concurrency = config.workers.concurrency_for(job_type.as_str());
        let instrumented = Arc::new(Instrumented {
            inner: handler,
            metrics: Arc::clone(&metrics),
            job_type,
        });
        pool.register(job_type, instrumented, concurrency);
    };

    register(
        pool,
        JobType::Plan,
        Arc::new(plan::PlanHandler {
            enricher: Arc::clone(&enricher),
        }),
    );

    for job_type in [JobType::Audio, JobType::Mix, JobType::Vocals, JobType::Video] {
        register(
            pool,
            job_type,
            Arc::new(render::RenderHandler {
                job_type,
                renderer: Arc::clone(&renderer),
                config: Arc::clone(&config),
                metrics: Arc::clone(&metrics),
            }),
        );
    }

    register(
        pool,
        JobType::Pipeline,
        Arc::new(pipeline::PipelineHandler {
            config: Arc::clone(&config),
            renderer,
            waker,
        }),
    );
}

/// Parameters carried by the render-stage job types. The pipeline writes
/// these when enqueueing children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderJobParams {
    pub plan: MusicPlan,
    /// Scratch directory name, shared across one pipeline's children.
    pub scratch: String,
    /// Asset UUID shared across one pipeline's files.
    pub asset_uuid: Uuid,
    /// Owning pipeline's creation time (epoch ms); fixes the asset prefix.
    pub created_at_ms: i64,
    #[serde(default)]
    pub lyrics: Option<String>,
    /// Video style label from the request.
    #[serde(default)]
    pub video_style: Option<String>,
    /// Whether the mix job publishes mix.wav itself. False when a vocals
    /// stage follows and will publish the vocal-inclusive master instead.
    #[serde(default = "default_true")]
    pub upload_mix: bool,
}

fn default_true() -> bool {
    true
}

impl RenderJobParams {
    pub fn parse(job: &Job) -> Result<Self, JobError> {
        serde_json::from_value(job.params.clone()).map_err(|e| {
            JobError::new(
                ErrorKind::InvalidRequest,
                format!("malformed job params: {e}"),
            )
        })
    }

    pub fn video_style(&self) -> Option<VideoStyle> {
        self.video_style.as_deref().and_then(VideoStyle::from_label)
    }
}

/// Per-attempt wall-clock budget: configured override, or 15 minutes per
/// requested minute of audio.
pub fn attempt_budget(config: &JamConfig, duration_sec: u32) -> Duration {
    match config.transcoder.generation_timeout_ms {
        Some(ms) => Duration::from_millis(ms),
        None => Duration::from_secs(15 * duration_sec as u64),
    }
}

/// Progress sink writing to a job's store row.
pub fn progress_sink(store: Arc<Store>, job_id: String) -> ProgressSink {
    Arc::new(move |percent, message| {
        if let Err(e) = store.update_progress(&job_id, percent as f64, Some(message), Utc::now()) {
            tracing::warn!(job.id = %job_id, error = %e, "progress update failed");
        }
    })
}

/// Map render failures onto the store's error taxonomy.
pub fn classify_render_error(err: RenderError) -> JobError {
    let retryable = err.is_retryable();
    let (kind, message) = match &err {
        RenderError::TranscoderUnavailable(_) => (
            ErrorKind::DependencyUnavailable,
            "transcoder unavailable".to_string(),
        ),
        RenderError::TranscoderFailed { exit_code, .. } => (
            ErrorKind::TranscoderFailed,
            format!("transcoder exited with status {exit_code}"),
        ),
        RenderError::TimedOut => (ErrorKind::TimedOut, "transcoder run timed out".to_string()),
        RenderError::AssetNotProduced { .. } => (
            ErrorKind::AssetNotProduced,
            "stage output missing or empty".to_string(),
        ),
        RenderError::Cancelled => (
            ErrorKind::InternalError,
            "render interrupted".to_string(),
        ),
        RenderError::Storage(stash::StorageError::Unavailable(_)) => (
            ErrorKind::DependencyUnavailable,
            "storage unavailable".to_string(),
        ),
        RenderError::Storage(_) => (ErrorKind::InternalError, "storage error".to_string()),
        RenderError::Io(_) => (ErrorKind::InternalError, "render i/o failure".to_string()),
    };

    // stderr tails stay in the logs, never on the job row
    tracing::warn!(error = %err, "render stage failed");

    JobError {
        kind,
        message,
        retryable,
    }
}

/// Metrics wrapper around a handler.
struct Instrumented {
    inner: Arc<dyn JobHandler>,
    metrics: Arc<Metrics>,
    job_type: JobType,
}

#[async_trait]
impl JobHandler for Instrumented {
    async fn run(&self, job: &Job, ctx: &WorkerContext) -> Result<JobOutcome, JobError> {
        let timer = self
            .metrics
            .job_duration_seconds
            .with_label_values(&[self.job_type.as_str()])
            .start_timer();
        let result = self.inner.run(job, ctx).await;
        timer.observe_duration();

        match &result {
            Ok(_) => {
                self.metrics
                    .jobs_succeeded_total
                    .with_label_values(&[self.job_type.as_str()])
                    .inc();
            }
            Err(err) => {
                if matches!(err.kind, ErrorKind::TranscoderFailed | ErrorKind::TimedOut) {
                    self.metrics.transcoder_errors_total.inc();
                }
                let terminal =
                    !err.retryable || job.attempts >= err.kind.attempt_cap(job.max_attempts);
                if terminal {
                    self.metrics
                        .jobs_failed_total
                        .with_label_values(&[self.job_type.as_str()])
                        .inc();
                }
            }
        }
        result
    }

    fn timeout(&self, job: &Job) -> Duration {
        self.inner.timeout(job)
    }
}
