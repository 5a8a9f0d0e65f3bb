//! Render pipeline orchestration.
//!
//! Drives the transcoder through the generation stages against one job's
//! scratch directory. Every stage validates its output before the next runs;
//! failures leave intermediates in place so a retry can overwrite them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use music_plan::{events, EventKind, MusicPlan};
use stash::BlobStore;

use crate::captions;
use crate::error::RenderError;
use crate::graphs::{self, Slot, VideoStyle};
use crate::media::{self, MediaInfo};
use crate::progress::{anchor, null_sink, ProgressSink, StageBand};
use crate::transcoder::{RunOptions, Transcoder};

/// Fixed output filenames within a job's asset directory.
pub mod filename {
    pub const PREVIEW: &str = "preview.wav";
    pub const MIX: &str = "mix.wav";
    pub const VOCALS: &str = "vocals.wav";
    pub const CAPTIONS: &str = "captions.srt";
    pub const VIDEO: &str = "final.mp4";
}

/// What one render invocation should produce.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub plan: MusicPlan,
    pub lyrics: Option<String>,
    pub video_style: Option<VideoStyle>,
    /// Scratch directory name; a pipeline's children share the parent's.
    pub scratch_key: String,
    /// UUID shared by all asset keys of one job. Deterministic per job so a
    /// retry overwrites the previous attempt's keys.
    pub asset_uuid: Uuid,
    /// Creation time of the owning job; fixes the YYYY/MM key prefix.
    pub created_at: DateTime<Utc>,
}

/// Execution context for one render run.
#[derive(Clone)]
pub struct RenderContext {
    pub progress: ProgressSink,
    pub cancel: CancellationToken,
    deadline: Instant,
}

impl RenderContext {
    pub fn new(progress: ProgressSink, cancel: CancellationToken, budget: Duration) -> Self {
        Self {
            progress,
            cancel,
            deadline: Instant::now() + budget,
        }
    }

    /// A context with no reporting and a generous budget, for tests.
    pub fn detached(budget: Duration) -> Self {
        Self::new(null_sink(), CancellationToken::new(), budget)
    }

    pub fn report(&self, percent: f32, message: &str) {
        (self.progress)(percent, message);
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn run_options(&self) -> RunOptions<'_> {
        RunOptions {
            timeout: self.remaining(),
            total_duration: None,
            progress: None,
            cancel: Some(self.cancel.clone()),
        }
    }
}

/// One uploaded artifact, ready to become an Asset row.
#[derive(Debug, Clone)]
pub struct ProducedAsset {
    pub kind: &'static str,
    pub mime: &'static str,
    pub filename: &'static str,
    pub key: String,
    pub url: String,
    pub duration_sec: f64,
    pub size_bytes: u64,
    pub meta: serde_json::Value,
}

/// Everything a finished render produced.
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub assets: Vec<ProducedAsset>,
}

/// Pipeline driver bound to a transcoder, a blob store, and a scratch root.
pub struct Renderer {
    transcoder: Transcoder,
    store: Arc<dyn BlobStore>,
    scratch_root: PathBuf,
}

impl Renderer {
    pub fn new(
        transcoder: Transcoder,
        store: Arc<dyn BlobStore>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transcoder,
            store,
            scratch_root: scratch_root.into(),
        }
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Scratch directory for one job, created on demand.
    pub async fn scratch_dir(&self, scratch_key: &str) -> Result<PathBuf, RenderError> {
        let dir = self.scratch_root.join(scratch_key);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Remove a job's scratch directory (success path only; failures keep
    /// intermediates for the retry).
    pub async fn cleanup_scratch(&self, scratch_key: &str) {
        let dir = self.scratch_root.join(scratch_key);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(scratch.dir = %dir.display(), error = %e, "scratch cleanup failed");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    /// Stage 1: synthesize the per-stem one-shots.
    pub async fn synth_oneshots(
        &self,
        plan: &MusicPlan,
        scratch: &Path,
        ctx: &RenderContext,
    ) -> Result<HashMap<EventKind, PathBuf>, RenderError> {
        ctx.report(anchor::SEGMENTS, "synthesizing instrument one-shots");

        let mut out = HashMap::new();
        for kind in EventKind::ALL {
            let path = scratch.join(format!("oneshot-{}.wav", kind.as_str()));
            let args = graphs::oneshot_args(kind, plan, &path);
            self.transcoder.run(&args, ctx.run_options()).await?;
            media::verify_output(&self.transcoder, &path).await?;
            out.insert(kind, path);
        }
        Ok(out)
    }

    /// Stage 2: place one-shots on the event grid and assemble full-length
    /// mono stems via the concat demuxer.
    pub async fn assemble_stems(
        &self,
        plan: &MusicPlan,
        scratch: &Path,
        oneshots: &HashMap<EventKind, PathBuf>,
        ctx: &RenderContext,
    ) -> Result<Vec<(EventKind, PathBuf)>, RenderError> {
        ctx.report(anchor::SEQUENCING, "sequencing events");
        let grid = events(plan);
        let duration = plan.duration_sec as f64;

        let mut stems = Vec::new();
        for (index, kind) in EventKind::ALL.into_iter().enumerate() {
            let band = StageBand::for_stem(index, EventKind::ALL.len());
            ctx.report(band.lo, &format!("rendering {} stem", kind.as_str()));

            let onsets: Vec<f64> = grid
                .iter()
                .filter(|e| e.kind == kind)
                .map(|e| e.t_sec)
                .collect();

            let oneshot = oneshots
                .get(&kind)
                .ok_or_else(|| RenderError::AssetNotProduced {
                    path: scratch.join(format!("oneshot-{}.wav", kind.as_str())),
                })?;

            let stem_path = scratch.join(format!("stem-{}.wav", kind.as_str()));
            self.assemble_one_stem(kind, oneshot, &onsets, duration, scratch, &stem_path, band, ctx)
                .await?;
            stems.push((kind, stem_path));
        }
        Ok(stems)
    }

    #[allow(clippy::too_many_arguments)]
    async fn assemble_one_stem(
        &self,
        kind: EventKind,
        oneshot: &Path,
        onsets: &[f64],
        duration: f64,
        scratch: &Path,
        out: &Path,
        band: StageBand,
        ctx: &RenderContext,
    ) -> Result<(), RenderError> {
        let slots = graphs::plan_slots(onsets, duration);

        // Slot lengths repeat heavily on a fixed grid; render each distinct
        // length once and reference the file from the concat list as often
        // as needed.
        let mut cache: HashMap<(bool, u64), PathBuf> = HashMap::new();
        let mut sequence: Vec<PathBuf> = Vec::with_capacity(slots.len());

        for slot in &slots {
            let millis = (slot.len() * 1000.0).round() as u64;
            let is_shot = matches!(slot, Slot::Shot { .. });

            let path = match cache.get(&(is_shot, millis)) {
                Some(path) => path.clone(),
                None => {
                    let name = if is_shot {
                        format!("seg-{}-{millis}.wav", kind.as_str())
                    } else {
                        format!("gap-{millis}.wav")
                    };
                    let path = scratch.join(name);
                    let args = if is_shot {
                        graphs::segment_args(oneshot, slot.len(), &path)
                    } else {
                        graphs::silence_args(slot.len(), &path)
                    };
                    self.transcoder.run(&args, ctx.run_options()).await?;
                    cache.insert((is_shot, millis), path.clone());
                    path
                }
            };
            sequence.push(path);
        }

        let list_path = scratch.join(format!("stem-{}.txt", kind.as_str()));
        let refs: Vec<&Path> = sequence.iter().map(PathBuf::as_path).collect();
        tokio::fs::write(&list_path, graphs::concat_list(&refs)).await?;

        let args = graphs::concat_args(&list_path, duration, out);
        self.run_with_progress(&args, duration, band, ctx).await?;
        media::verify_output(&self.transcoder, out).await?;
        Ok(())
    }

    /// Stage 3: equal-weight preview mix.
    pub async fn render_preview(
        &self,
        stems: &[(EventKind, PathBuf)],
        scratch: &Path,
        ctx: &RenderContext,
    ) -> Result<PathBuf, RenderError> {
        let out = scratch.join(filename::PREVIEW);
        let paths: Vec<&Path> = stems.iter().map(|(_, p)| p.as_path()).collect();
        let args = graphs::preview_args(&paths, &out);
        self.transcoder.run(&args, ctx.run_options()).await?;
        media::verify_output(&self.transcoder, &out).await?;
        Ok(out)
    }

    /// Stage 4: weighted mastered mix at -14 LUFS.
    pub async fn render_master(
        &self,
        plan: &MusicPlan,
        stems: &[(EventKind, PathBuf)],
        scratch: &Path,
        ctx: &RenderContext,
    ) -> Result<PathBuf, RenderError> {
        ctx.report(anchor::MIXING, "mastering mix");
        let out = scratch.join(filename::MIX);
        let pairs: Vec<(EventKind, &Path)> =
            stems.iter().map(|(k, p)| (*k, p.as_path())).collect();
        let args = graphs::master_args(&pairs, &out);
        let band = StageBand::new(anchor::MIXING, anchor::VOCALS);
        self.run_with_progress(&args, plan.duration_sec as f64, band, ctx)
            .await?;

        let info = media::verify_output(&self.transcoder, &out).await?;
        tracing::debug!(
            mix.sample_rate = ?info.sample_rate,
            mix.channels = ?info.channels,
            "mastered mix verified"
        );
        Ok(out)
    }

    /// Stage 5: synthesize vocals and captions, fold vocals into the master.
    pub async fn render_vocals(
        &self,
        plan: &MusicPlan,
        lyrics: &str,
        scratch: &Path,
        ctx: &RenderContext,
    ) -> Result<(PathBuf, PathBuf), RenderError> {
        ctx.report(anchor::VOCALS, "rendering vocals");

        let vocals = scratch.join(filename::VOCALS);
        let args = graphs::vocals_args(plan, &vocals);
        self.transcoder.run(&args, ctx.run_options()).await?;
        media::verify_output(&self.transcoder, &vocals).await?;

        let srt = scratch.join(filename::CAPTIONS);
        let body = captions::render_srt(lyrics, plan.duration_sec as f64);
        tokio::fs::write(&srt, body).await?;

        // Remix through a temp name; the master path stays valid throughout.
        let master = scratch.join(filename::MIX);
        let remixed = scratch.join("mix-vocals.wav");
        let args = graphs::mix_vocals_args(&master, &vocals, &remixed);
        self.transcoder.run(&args, ctx.run_options()).await?;
        media::verify_output(&self.transcoder, &remixed).await?;
        tokio::fs::rename(&remixed, &master).await?;

        Ok((vocals, srt))
    }

    /// Stage 6: visualizer video.
    pub async fn render_video(
        &self,
        plan: &MusicPlan,
        style: VideoStyle,
        scratch: &Path,
        ctx: &RenderContext,
    ) -> Result<PathBuf, RenderError> {
        ctx.report(anchor::VIDEO, "rendering video");

        let mix = scratch.join(filename::MIX);
        let srt = scratch.join(filename::CAPTIONS);
        let captions_path = tokio::fs::try_exists(&srt)
            .await
            .unwrap_or(false)
            .then_some(srt);

        let out = scratch.join(filename::VIDEO);
        let args = graphs::video_args(
            style,
            &mix,
            captions_path.as_deref(),
            plan.duration_sec,
            &out,
        );
        let band = StageBand::new(anchor::VIDEO, anchor::UPLOAD);
        self.run_with_progress(&args, plan.duration_sec as f64, band, ctx)
            .await?;

        let info = media::verify_output(&self.transcoder, &out).await?;
        if info.width != Some(1280) || info.height != Some(720) {
            return Err(RenderError::AssetNotProduced { path: out });
        }
        Ok(out)
    }

    /// Stage 7: publish scratch files under `assets/YYYY/MM/UUID/`.
    pub async fn upload(
        &self,
        request: &RenderRequest,
        files: &[(&'static str, &'static str, &'static str)],
        scratch: &Path,
        ctx: &RenderContext,
    ) -> Result<Vec<ProducedAsset>, RenderError> {
        ctx.report(anchor::UPLOAD, "uploading assets");

        let prefix = asset_prefix(request);
        let mut produced = Vec::new();

        for &(file, kind, mime) in files {
            let path = scratch.join(file);
            let info = match kind {
                "srt" => MediaInfo::default(),
                _ => media::probe_media(&self.transcoder, &path).await?,
            };

            let reader = tokio::fs::File::open(&path)
                .await
                .map_err(|_| RenderError::AssetNotProduced { path: path.clone() })?;
            let key = format!("{prefix}/{file}");
            let receipt = self
                .store
                .put_stream(&key, Box::pin(reader))
                .await?;
            if receipt.size == 0 {
                return Err(RenderError::AssetNotProduced { path });
            }

            produced.push(ProducedAsset {
                kind,
                mime,
                filename: file,
                key,
                url: receipt.url,
                duration_sec: info.duration_sec,
                size_bytes: receipt.size,
                meta: serde_json::json!({
                    "sampleRate": info.sample_rate,
                    "channels": info.channels,
                    "width": info.width,
                    "height": info.height,
                    "pixFmt": info.pix_fmt,
                }),
            });
        }

        Ok(produced)
    }

    async fn run_with_progress(
        &self,
        args: &[String],
        total_duration: f64,
        band: StageBand,
        ctx: &RenderContext,
    ) -> Result<(), RenderError> {
        let sink = ctx.progress.clone();
        let forward = move |stage_percent: f32, _line: &str| {
            sink(band.map(stage_percent), "transcoding");
        };

        let opts = RunOptions {
            timeout: ctx.remaining(),
            total_duration: Some(total_duration),
            progress: Some(&forward),
            cancel: Some(ctx.cancel.clone()),
        };
        self.transcoder.run(args, opts).await?;
        Ok(())
    }
}

/// `assets/YYYY/MM/UUID` prefix shared by all of one job's files.
pub fn asset_prefix(request: &RenderRequest) -> String {
    format!(
        "assets/{:04}/{:02}/{}",
        request.created_at.year(),
        request.created_at.month(),
        request.asset_uuid
    )
}
