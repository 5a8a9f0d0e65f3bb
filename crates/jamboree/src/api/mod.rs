//! HTTP surface: routes, auth, CORS, request metrics.

pub mod assets;
pub mod error;
pub mod generate;
pub mod health;
pub mod jobs;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;
use error::ApiError;

/// Build the full router.
///
/// Everything under `/v1` requires a Bearer key; `/health` and `/metrics`
/// are open. CORS is permissive and preflights answer 200.
pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .route("/v1/generate", post(generate::handle))
        .route("/v1/jobs/{id}", get(jobs::get_job))
        .route("/v1/jobs/{id}/assets", get(jobs::list_assets))
        .route("/v1/jobs/{id}/cancel", post(jobs::cancel))
        .route("/v1/assets/{id}", get(assets::stream_asset))
        .route("/v1/files/{*key}", get(assets::stream_file))
        .layer(middleware::from_fn_with_state(state.clone(), auth));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(authed)
        .route("/health", get(health::handle))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), track_http))
        .layer(cors)
        .layer(DefaultBodyLimit::max(state.config.http.max_body_bytes))
        .with_state(state)
}

/// Bearer-token authentication. The resolved key lands in request
/// extensions for handlers and tenant checks.
async fn auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        return ApiError::Unauthorized.into_response();
    };

    match state.store.get_api_key(token) {
        Ok(Some(key)) if key.is_disabled() => ApiError::KeyDisabled.into_response(),
        Ok(Some(key)) => {
            req.extensions_mut().insert(key);
            next.run(req).await
        }
        Ok(None) => ApiError::Unauthorized.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "api key lookup failed");
            ApiError::Internal("auth backend error".to_string()).into_response()
        }
    }
}

/// Request counter and latency histogram per (method, route).
async fn track_http(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let timer = state
        .metrics
        .http_request_duration_seconds
        .with_label_values(&[&method, &route])
        .start_timer();
    let response = next.run(req).await;
    timer.observe_duration();

    state
        .metrics
        .http_requests_total
        .with_label_values(&[&method, &route, response.status().as_str()])
        .inc();
    response
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}
