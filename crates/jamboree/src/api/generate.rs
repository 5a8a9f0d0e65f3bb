//! `POST /v1/generate`: validate, admit, plan, enqueue the pipeline.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use bounce::VideoStyle;
use music_plan::PlanRequest;
use setlist::{ApiKey, EnqueueOptions, JobStatus, JobType};

use crate::api::error::ApiError;
use crate::enrich::enrich_or_fallback;
use crate::handlers::pipeline::PipelineParams;
use crate::state::AppState;

/// Languages the vocal synthesizer has presets for.
const KNOWN_VOCAL_LANGUAGES: &[&str] = &[
    "english",
    "spanish",
    "french",
    "german",
    "italian",
    "portuguese",
    "japanese",
    "korean",
    "mandarin",
    "hindi",
];

/// The generation request body. Unknown fields are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GenerateRequest {
    pub music_prompt: String,
    pub genres: Vec<String>,
    pub duration_sec: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_inspiration: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocal_languages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_video: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_styles: Option<Vec<String>>,
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        let invalid = |msg: &str| Err(ApiError::InvalidRequest(msg.to_string()));

        if self.music_prompt.trim().is_empty() || self.music_prompt.chars().count() > 500 {
            return invalid("musicPrompt must be 1..500 characters");
        }
        if self.genres.is_empty() || self.genres.len() > 5 {
            return invalid("genres must have 1..5 entries");
        }
        if self.genres.iter().any(|g| g.trim().is_empty()) {
            return invalid("genres entries must not be empty");
        }
        if !(30..=120).contains(&self.duration_sec) {
            return invalid("durationSec must be within 30..120");
        }
        if let Some(artists) = &self.artist_inspiration {
            if artists.len() > 5 {
                return invalid("artistInspiration allows at most 5 entries");
            }
        }
        if let Some(lyrics) = &self.lyrics {
            if lyrics.chars().count() > 2000 {
                return invalid("lyrics must be at most 2000 characters");
            }
            if let Some(languages) = &self.vocal_languages {
                for language in languages {
                    if !KNOWN_VOCAL_LANGUAGES
                        .iter()
                        .any(|known| known.eq_ignore_ascii_case(language.trim()))
                    {
                        return Err(ApiError::InvalidRequest(format!(
                            "unknown vocal language {language:?}"
                        )));
                    }
                }
            }
        }
        if let Some(styles) = &self.video_styles {
            for style in styles {
                if VideoStyle::from_label(style).is_none() {
                    return Err(ApiError::InvalidRequest(format!(
                        "unknown video style {style:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// The style the video stage should render, if any.
    ///
    /// First requested style wins; a bare `generateVideo` flag falls back to
    /// the abstract visualizer.
    pub fn chosen_video_style(&self) -> Option<String> {
        if let Some(styles) = &self.video_styles {
            if let Some(first) = styles
                .iter()
                .find(|s| VideoStyle::from_label(s).is_some())
            {
                return Some(first.clone());
            }
        }
        if self.generate_video == Some(true) {
            return Some("Abstract Visualizer".to_string());
        }
        None
    }

    pub fn to_plan_request(&self) -> PlanRequest {
        PlanRequest {
            prompt: self.music_prompt.clone(),
            genres: self.genres.clone(),
            duration_sec: self.duration_sec,
            artist_inspiration: self.artist_inspiration.clone().unwrap_or_default(),
            seed: None,
        }
    }
}

pub async fn handle(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Admission first: a rejected request does no work and inserts no job.
    let admitted = state
        .store
        .try_admit(&api_key.id, api_key.rate_limit_per_min, Utc::now())?;
    if !admitted {
        state.metrics.rate_limit_rejects_total.inc();
        return Err(ApiError::RateLimited);
    }

    // Manual deserialization keeps malformed bodies at 400.
    let request: GenerateRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid request body: {e}")))?;
    request.validate()?;

    let draft = music_plan::plan(&request.to_plan_request())
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let plan = enrich_or_fallback(state.enricher.as_ref(), draft).await;

    let params = serde_json::to_value(PipelineParams { request, plan })
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let opts = EnqueueOptions {
        api_key_id: Some(api_key.id.clone()),
        idempotency_window_ms: state.config.limits.idempotency_window_hours as i64 * 3_600_000,
        ..Default::default()
    };
    let enqueued = state
        .store
        .enqueue(JobType::Pipeline, &params, &opts, Utc::now())?;

    if !enqueued.reused {
        state
            .metrics
            .jobs_created_total
            .with_label_values(&[JobType::Pipeline.as_str()])
            .inc();
    }
    state.wake_workers();

    let job = state
        .store
        .get_job(&enqueued.job_id)?
        .ok_or(ApiError::NotFound("job"))?;

    let mut response = json!({
        "jobId": job.id,
        "status": job.status,
        "reused": enqueued.reused,
    });
    if job.status == JobStatus::Succeeded {
        response["result"] = job.result.unwrap_or(serde_json::Value::Null);
    }

    Ok((StatusCode::ACCEPTED, Json(response)))
}
