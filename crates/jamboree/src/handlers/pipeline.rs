//! Pipeline job handler: orchestrate the audio → mix → vocals → video chain.
//!
//! The pipeline never holds work in memory - each stage is its own persisted
//! job, enqueued with the pipeline as parent and polled to a terminal state.
//! Children share the pipeline's scratch directory and asset UUID, and their
//! dedupe keys make a pipeline retry reuse whatever already succeeded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;
use uuid::Uuid;

use bounce::progress::{anchor, StageBand};
use bounce::Renderer;
use jamconf::JamConfig;
use music_plan::MusicPlan;
use setlist::{
    EnqueueOptions, ErrorKind, Job, JobError, JobHandler, JobOutcome, JobStatus, JobType,
    WorkerContext,
};

use super::{attempt_budget, RenderJobParams};
use crate::api::generate::GenerateRequest;

/// Pace of child status polling.
const CHILD_POLL: Duration = Duration::from_millis(250);

/// What the API stores on a pipeline job.
#[derive(Debug, Serialize, Deserialize)]
pub struct PipelineParams {
    pub request: GenerateRequest,
    pub plan: MusicPlan,
}

pub struct PipelineHandler {
    pub config: Arc<JamConfig>,
    pub renderer: Arc<Renderer>,
    pub waker: Arc<Notify>,
}

struct Stage {
    job_type: JobType,
    params: RenderJobParams,
    band: StageBand,
}

#[async_trait]
impl JobHandler for PipelineHandler {
    async fn run(&self, job: &Job, ctx: &WorkerContext) -> Result<JobOutcome, JobError> {
        let params: PipelineParams = serde_json::from_value(job.params.clone()).map_err(|e| {
            JobError::new(
                ErrorKind::InvalidRequest,
                format!("malformed pipeline params: {e}"),
            )
        })?;

        let _ = ctx
            .store
            .update_progress(&job.id, anchor::PLAN as f64, Some("plan derived"), Utc::now());

        let stages = build_stages(job, &params)?;
        let mut children = serde_json::Map::new();
        let mut assets = Vec::new();

        for stage in &stages {
            let child_params = serde_json::to_value(&stage.params)
                .map_err(|e| JobError::new(ErrorKind::InternalError, e.to_string()))?;
            let opts = EnqueueOptions {
                parent_id: Some(job.id.clone()),
                api_key_id: job.api_key_id.clone(),
                ..Default::default()
            };

            let enqueued = ctx
                .store
                .enqueue(stage.job_type, &child_params, &opts, Utc::now())
                .map_err(|e| JobError::new(ErrorKind::InternalError, e.to_string()))?;
            self.waker.notify_waiters();

            let child = self
                .wait_for_terminal(ctx, &job.id, &enqueued.job_id, stage.band)
                .await?;

            match child.status {
                JobStatus::Succeeded => {
                    children.insert(stage.job_type.to_string(), json!(child.id));
                    let child_assets = ctx
                        .store
                        .list_assets_for_job(&child.id)
                        .map_err(|e| JobError::new(ErrorKind::InternalError, e.to_string()))?;
                    for asset in child_assets {
                        assets.push(json!({
                            "id": asset.id,
                            "kind": asset.kind,
                            "url": asset.url,
                            "path": asset.path,
                            "durationSec": asset.duration_sec,
                            "sizeBytes": asset.size_bytes,
                        }));
                    }
                }
                JobStatus::Failed => {
                    return Err(JobError::new(
                        ErrorKind::InternalError,
                        match child.error {
                            Some(detail) => format!("{} stage failed: {detail}", stage.job_type),
                            None => format!("{} stage failed", stage.job_type),
                        },
                    ));
                }
                JobStatus::Cancelled => {
                    return Err(JobError::fatal(
                        ErrorKind::InternalError,
                        format!("{} stage cancelled", stage.job_type),
                    ));
                }
                _ => unreachable!("wait_for_terminal returns terminal states"),
            }
        }

        let _ = ctx
            .store
            .update_progress(&job.id, anchor::UPLOAD as f64, Some("assets published"), Utc::now());
        self.renderer.cleanup_scratch(&job.id).await;

        Ok(JobOutcome {
            result: json!({
                "plan": params.plan,
                "children": children,
                "assets": assets,
            }),
            assets: Vec::new(),
        })
    }

    fn timeout(&self, job: &Job) -> Duration {
        let duration_sec = job
            .params
            .get("plan")
            .and_then(|p| p.get("duration_sec"))
            .and_then(|d| d.as_u64())
            .unwrap_or(60) as u32;
        // room for every stage plus settle overhead
        attempt_budget(&self.config, duration_sec) * 5 + Duration::from_secs(60)
    }
}

impl PipelineHandler {
    /// Poll one child to a terminal state, rolling its progress into the
    /// parent's percent band as it moves.
    async fn wait_for_terminal(
        &self,
        ctx: &WorkerContext,
        parent_id: &str,
        child_id: &str,
        band: StageBand,
    ) -> Result<Job, JobError> {
        loop {
            if ctx.cancel.is_cancelled() {
                return Err(JobError::new(
                    ErrorKind::InternalError,
                    "interrupted by shutdown",
                ));
            }

            let child = ctx
                .store
                .get_job(child_id)
                .map_err(|e| JobError::new(ErrorKind::InternalError, e.to_string()))?
                .ok_or_else(|| {
                    JobError::new(
                        ErrorKind::InternalError,
                        format!("child job {child_id} disappeared"),
                    )
                })?;

            let _ = ctx.store.update_progress(
                parent_id,
                band.map(child.progress as f32) as f64,
                child.status_message.as_deref(),
                Utc::now(),
            );

            if child.status.is_terminal() {
                return Ok(child);
            }

            // An externally cancelled pipeline stops driving its children.
            if let Ok(Some(parent)) = ctx.store.get_job(parent_id) {
                if parent.status == JobStatus::Cancelled {
                    let _ = ctx.store.cancel(child_id, Utc::now());
                    return Err(JobError::fatal(
                        ErrorKind::InternalError,
                        "pipeline cancelled",
                    ));
                }
            }

            tokio::time::sleep(CHILD_POLL).await;
        }
    }
}

/// Expand the request into the child stage list.
fn build_stages(job: &Job, params: &PipelineParams) -> Result<Vec<Stage>, JobError> {
    let asset_uuid = Uuid::parse_str(&job.id)
        .map_err(|_| JobError::fatal(ErrorKind::InternalError, "pipeline id is not a uuid"))?;

    let lyrics = params
        .request
        .lyrics
        .clone()
        .filter(|l| !l.trim().is_empty());
    let style_label = params.request.chosen_video_style();

    let base = RenderJobParams {
        plan: params.plan.clone(),
        scratch: job.id.clone(),
        asset_uuid,
        created_at_ms: job.created_at,
        lyrics: None,
        video_style: None,
        upload_mix: true,
    };

    let mut stages = vec![
        Stage {
            job_type: JobType::Audio,
            params: base.clone(),
            band: StageBand::new(anchor::SEGMENTS, anchor::STEMS_END),
        },
        Stage {
            job_type: JobType::Mix,
            params: RenderJobParams {
                upload_mix: lyrics.is_none(),
                ..base.clone()
            },
            band: StageBand::new(anchor::STEMS_END, anchor::VOCALS),
        },
    ];

    if let Some(lyrics) = lyrics {
        stages.push(Stage {
            job_type: JobType::Vocals,
            params: RenderJobParams {
                lyrics: Some(lyrics),
                ..base.clone()
            },
            band: StageBand::new(anchor::VOCALS, anchor::VIDEO),
        });
    }

    if let Some(label) = style_label {
        stages.push(Stage {
            job_type: JobType::Video,
            params: RenderJobParams {
                video_style: Some(label),
                ..base
            },
            band: StageBand::new(anchor::VIDEO, anchor::UPLOAD),
        });
    }

    Ok(stages)
}
