//! Render-stage job handlers: audio, mix, vocals, video.
//!
//! All four share one handler parameterized by job type, because they differ
//! only in which pipeline stages they drive. Children of one pipeline share
//! its scratch directory, so later stages read what earlier stages wrote;
//! the audio/mix stages rebuild missing stems so a lone retry stays
//! self-sufficient.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use bounce::renderer::filename;
use bounce::{ProducedAsset, RenderContext, RenderRequest, Renderer};
use jamconf::JamConfig;
use music_plan::{EventKind, MusicPlan};
use setlist::{
    ErrorKind, Job, JobError, JobHandler, JobOutcome, JobType, NewAsset, WorkerContext,
};

use super::{attempt_budget, classify_render_error, progress_sink, RenderJobParams};
use crate::metrics::Metrics;

const WAV: (&str, &str) = ("wav", "audio/wav");
const SRT: (&str, &str) = ("srt", "application/x-subrip");
const MP4: (&str, &str) = ("mp4", "video/mp4");

pub struct RenderHandler {
    pub job_type: JobType,
    pub renderer: Arc<Renderer>,
    pub config: Arc<JamConfig>,
    pub metrics: Arc<Metrics>,
}

#[async_trait]
impl JobHandler for RenderHandler {
    async fn run(&self, job: &Job, ctx: &WorkerContext) -> Result<JobOutcome, JobError> {
        let params = RenderJobParams::parse(job)?;
        let request = to_render_request(&params);

        let scratch = self
            .renderer
            .scratch_dir(&request.scratch_key)
            .await
            .map_err(classify_render_error)?;

        let rctx = RenderContext::new(
            progress_sink(Arc::clone(&ctx.store), job.id.clone()),
            ctx.cancel.clone(),
            self.timeout(job),
        );

        match self.job_type {
            JobType::Audio => self.run_audio(&request, &params, &scratch, &rctx).await,
            JobType::Mix => self.run_mix(&request, &params, &scratch, &rctx).await,
            JobType::Vocals => self.run_vocals(&request, &params, &scratch, &rctx).await,
            JobType::Video => self.run_video(&request, &params, &scratch, &rctx).await,
            other => Err(JobError::fatal(
                ErrorKind::InternalError,
                format!("render handler cannot run {other} jobs"),
            )),
        }
    }

    fn timeout(&self, job: &Job) -> Duration {
        let duration_sec = job
            .params
            .get("plan")
            .and_then(|p| p.get("duration_sec"))
            .and_then(|d| d.as_u64())
            .unwrap_or(60) as u32;
        attempt_budget(&self.config, duration_sec)
    }
}

impl RenderHandler {
    async fn run_audio(
        &self,
        request: &RenderRequest,
        _params: &RenderJobParams,
        scratch: &Path,
        rctx: &RenderContext,
    ) -> Result<JobOutcome, JobError> {
        let stems = self.build_stems(&request.plan, scratch, rctx).await?;

        let timer = self.metrics.stage_timer("preview").start_timer();
        self.renderer
            .render_preview(&stems, scratch, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();

        let produced = self
            .upload(request, &[(filename::PREVIEW, WAV)], scratch, rctx)
            .await?;

        Ok(outcome(&produced))
    }

    async fn run_mix(
        &self,
        request: &RenderRequest,
        params: &RenderJobParams,
        scratch: &Path,
        rctx: &RenderContext,
    ) -> Result<JobOutcome, JobError> {
        let stems = self.build_stems(&request.plan, scratch, rctx).await?;

        let timer = self.metrics.stage_timer("mix").start_timer();
        self.renderer
            .render_master(&request.plan, &stems, scratch, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();

        // With a vocals stage ahead, the vocal-inclusive master publishes
        // mix.wav instead of this job.
        let produced = if params.upload_mix {
            self.upload(request, &[(filename::MIX, WAV)], scratch, rctx)
                .await?
        } else {
            Vec::new()
        };

        Ok(outcome(&produced))
    }

    async fn run_vocals(
        &self,
        request: &RenderRequest,
        params: &RenderJobParams,
        scratch: &Path,
        rctx: &RenderContext,
    ) -> Result<JobOutcome, JobError> {
        let lyrics = params
            .lyrics
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                JobError::fatal(ErrorKind::InvalidRequest, "vocals job without lyrics")
            })?;

        require_file(&scratch.join(filename::MIX), "mastered mix").await?;

        let timer = self.metrics.stage_timer("vocals").start_timer();
        self.renderer
            .render_vocals(&request.plan, lyrics, scratch, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();

        let produced = self
            .upload(
                request,
                &[
                    (filename::MIX, WAV),
                    (filename::VOCALS, WAV),
                    (filename::CAPTIONS, SRT),
                ],
                scratch,
                rctx,
            )
            .await?;

        Ok(outcome(&produced))
    }

    async fn run_video(
        &self,
        request: &RenderRequest,
        params: &RenderJobParams,
        scratch: &Path,
        rctx: &RenderContext,
    ) -> Result<JobOutcome, JobError> {
        let style = params.video_style().ok_or_else(|| {
            JobError::fatal(ErrorKind::InvalidRequest, "video job without a style")
        })?;

        require_file(&scratch.join(filename::MIX), "mastered mix").await?;

        let timer = self.metrics.stage_timer("video").start_timer();
        self.renderer
            .render_video(&request.plan, style, scratch, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();

        let produced = self
            .upload(request, &[(filename::VIDEO, MP4)], scratch, rctx)
            .await?;

        Ok(outcome(&produced))
    }

    /// Stems already in scratch are reused; anything missing is rebuilt
    /// from fresh one-shots.
    async fn build_stems(
        &self,
        plan: &MusicPlan,
        scratch: &Path,
        rctx: &RenderContext,
    ) -> Result<Vec<(EventKind, PathBuf)>, JobError> {
        let existing: Vec<(EventKind, PathBuf)> = EventKind::ALL
            .into_iter()
            .map(|kind| (kind, scratch.join(format!("stem-{}.wav", kind.as_str()))))
            .collect();

        let mut complete = true;
        for (_, path) in &existing {
            match tokio::fs::metadata(path).await {
                Ok(meta) if meta.len() > 0 => {}
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            return Ok(existing);
        }

        let timer = self.metrics.stage_timer("oneshots").start_timer();
        let oneshots = self
            .renderer
            .synth_oneshots(plan, scratch, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();

        let timer = self.metrics.stage_timer("stems").start_timer();
        let stems = self
            .renderer
            .assemble_stems(plan, scratch, &oneshots, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();

        Ok(stems)
    }

    async fn upload(
        &self,
        request: &RenderRequest,
        files: &[(&'static str, (&'static str, &'static str))],
        scratch: &Path,
        rctx: &RenderContext,
    ) -> Result<Vec<ProducedAsset>, JobError> {
        let flat: Vec<(&'static str, &'static str, &'static str)> = files
            .iter()
            .map(|&(file, (kind, mime))| (file, kind, mime))
            .collect();

        let timer = self.metrics.stage_timer("upload").start_timer();
        let produced = self
            .renderer
            .upload(request, &flat, scratch, rctx)
            .await
            .map_err(classify_render_error)?;
        timer.observe_duration();
        Ok(produced)
    }
}

fn to_render_request(params: &RenderJobParams) -> RenderRequest {
    RenderRequest {
        plan: params.plan.clone(),
        lyrics: params.lyrics.clone(),
        video_style: params.video_style(),
        scratch_key: params.scratch.clone(),
        asset_uuid: params.asset_uuid,
        created_at: DateTime::from_timestamp_millis(params.created_at_ms)
            .unwrap_or_else(Utc::now),
    }
}

async fn require_file(path: &Path, what: &str) -> Result<(), JobError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(JobError::new(
            ErrorKind::AssetNotProduced,
            format!("{what} missing from scratch"),
        )),
    }
}

fn outcome(produced: &[ProducedAsset]) -> JobOutcome {
    let assets: Vec<NewAsset> = produced
        .iter()
        .filter_map(|p| {
            Some(NewAsset {
                kind: p.kind.parse().ok()?,
                mime: p.mime.to_string(),
                path: p.key.clone(),
                url: p.url.clone(),
                duration_sec: p.duration_sec,
                size_bytes: p.size_bytes,
                meta: p.meta.clone(),
            })
        })
        .collect();

    let summary: Vec<serde_json::Value> = produced
        .iter()
        .map(|p| {
            json!({
                "file": p.filename,
                "kind": p.kind,
                "url": p.url,
                "durationSec": p.duration_sec,
                "sizeBytes": p.size_bytes,
            })
        })
        .collect();

    JobOutcome {
        result: json!({ "assets": summary }),
        assets,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn base_params() -> RenderJobParams {
        RenderJobParams {
            plan: music_plan::plan(&music_plan::PlanRequest {
                prompt: "steady groove".to_string(),
                genres: vec!["house".to_string()],
                duration_sec: 60,
                ..Default::default()
            })
            .unwrap(),
            scratch: "job-1".to_string(),
            asset_uuid: Uuid::nil(),
            created_at_ms: 1_754_000_000_000,
            lyrics: None,
            video_style: None,
            upload_mix: true,
        }
    }

    #[test]
    fn params_round_trip_through_job_json() {
        let params = base_params();
        let encoded = serde_json::to_value(&params).unwrap();
        // children embed the plan snake_cased and the envelope camelCased
        assert!(encoded.get("assetUuid").is_some());
        assert!(encoded["plan"].get("duration_sec").is_some());

        let decoded: RenderJobParams = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.plan, params.plan);
        assert_eq!(decoded.upload_mix, params.upload_mix);
    }

    #[test]
    fn video_style_parses_request_labels() {
        let mut params = base_params();
        params.video_style = Some("Official Music Video".to_string());
        assert_eq!(params.video_style(), Some(bounce::VideoStyle::Spectrum));

        params.video_style = Some("unknown".to_string());
        assert_eq!(params.video_style(), None);
    }

    #[tokio::test]
    async fn require_file_rejects_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(require_file(&dir.path().join("none.wav"), "mix").await.is_err());

        let empty = dir.path().join("empty.wav");
        tokio::fs::write(&empty, b"").await.unwrap();
        assert!(require_file(&empty, "mix").await.is_err());

        let ok = dir.path().join("ok.wav");
        tokio::fs::write(&ok, b"RIFF").await.unwrap();
        assert!(require_file(&ok, "mix").await.is_ok());
    }
}
