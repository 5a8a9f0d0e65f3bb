//! Asset streaming with byte-range support.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use tokio_util::io::ReaderStream;

use setlist::ApiKey;

use crate::api::error::ApiError;
use crate::state::AppState;

/// `GET /v1/assets/:id` - stream an asset row's object.
pub async fn stream_asset(
    State(state): State<AppState>,
    Extension(api_key): Extension<ApiKey>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let asset = state
        .store
        .get_asset(&id)?
        .ok_or(ApiError::NotFound("asset"))?;

    // assets inherit their owning job's tenancy
    if let Some(job) = state.store.get_job(&asset.job_id)? {
        if matches!(&job.api_key_id, Some(owner) if owner != &api_key.id) {
            return Err(ApiError::NotFound("asset"));
        }
    }

    stream_key(&state, &asset.path, &asset.mime, &headers).await
}

/// `GET /v1/files/*key` - stream a raw storage key. This is what locally
/// minted asset URLs resolve to.
pub async fn stream_file(
    State(state): State<AppState>,
    Extension(_api_key): Extension<ApiKey>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let mime = mime_for_key(&key);
    stream_key(&state, &key, mime, &headers).await
}

async fn stream_key(
    state: &AppState,
    key: &str,
    mime: &str,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let stat = state.storage.stat(key).await?;

    // Only `bytes=` ranges are honored; anything else gets the full object.
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.trim_start().starts_with("bytes="))
        .map(|v| parse_range(v, stat.size));

    match range {
        None => {
            let reader = state.storage.open(key).await?;
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (header::CONTENT_LENGTH, stat.size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(ReaderStream::new(reader)),
            )
                .into_response())
        }
        Some(Some((start, end))) => {
            let reader = state.storage.open_range(key, start, end).await?;
            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, mime.to_string()),
                    (header::CONTENT_LENGTH, (end - start + 1).to_string()),
                    (
                        header::CONTENT_RANGE,
                        format!("bytes {start}-{end}/{}", stat.size),
                    ),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                Body::from_stream(ReaderStream::new(reader)),
            )
                .into_response())
        }
        Some(None) => Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", stat.size))],
        )
            .into_response()),
    }
}

/// Parse a single-range `bytes=` header against the object size.
///
/// Returns the inclusive `(start, end)` pair, or `None` when the range is
/// malformed or unsatisfiable (which the caller answers with 416).
fn parse_range(value: &str, size: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?.trim();
    let (start_text, end_text) = spec.split_once('-')?;

    if size == 0 {
        return None;
    }

    if start_text.is_empty() {
        // suffix form: last N bytes
        let suffix: u64 = end_text.parse().ok()?;
        if suffix == 0 {
            return None;
        }
        let start = size.saturating_sub(suffix);
        return Some((start, size - 1));
    }

    let start: u64 = start_text.parse().ok()?;
    if start >= size {
        return None;
    }

    let end = if end_text.is_empty() {
        size - 1
    } else {
        end_text.parse::<u64>().ok()?.min(size - 1)
    };

    if end < start {
        return None;
    }
    Some((start, end))
}

fn mime_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("mp4") => "video/mp4",
        Some("srt") => "application/x-subrip",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}
