//! Liveness surface: store, storage, transcoder.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use stash::StorageError;

use crate::state::AppState;

pub async fn handle(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store.ping().is_ok();

    // A missing probe key still proves the backend answers.
    let storage_ok = match state.storage.stat("health/.probe").await {
        Ok(_) | Err(StorageError::NotFound { .. }) => true,
        Err(_) => false,
    };

    let capabilities = state.transcoder.probe().await;
    let transcoder_ok = capabilities.ready();
    state.metrics.transcoder_available.set(transcoder_ok as i64);

    let healthy = store_ok && storage_ok && transcoder_ok;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "ok" } else { "degraded" },
            "components": {
                "store": store_ok,
                "storage": storage_ok,
                "transcoder": transcoder_ok,
            },
        })),
    )
}
