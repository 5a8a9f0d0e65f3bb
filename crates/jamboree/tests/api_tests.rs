//! HTTP surface tests against the real router and a throwaway store.
//!
//! The transcoder is stubbed with `true`, so probes pass while render jobs
//! fail fast; these tests exercise the API contract, not the pipeline.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use jamboree::{api, state::AppState};
use jamconf::JamConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

const TEST_KEY: &str = "jam_test_key";

async fn test_state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();

    let mut config = JamConfig::default();
    config.database.url = dir.path().join("jobs.db").to_string_lossy().into_owned();
    config.storage.assets_dir = dir.path().join("assets");
    config.transcoder.bin = "true".to_string();
    config.transcoder.probe_bin = "true".to_string();
    config.limits.default_api_key = Some(TEST_KEY.to_string());
    config.workers.default_concurrency = 1;

    let state = AppState::bootstrap(config).await.unwrap();
    (dir, state)
}

fn generate_body() -> Value {
    json!({
        "musicPrompt": "dreamy synthwave nights",
        "genres": ["synthwave"],
        "durationSec": 60
    })
}

async fn post_generate(state: &AppState, key: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/generate")
        .header(header::AUTHORIZATION, format!("Bearer {key}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get(state: &AppState, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }

    let response = api::router(state.clone())
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_and_metrics_need_no_auth() {
    let (_dir, state) = test_state().await;

    let (status, body) = get(&state, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["components"]["store"], true);

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("workers_active"));
}

#[tokio::test]
async fn v1_routes_require_a_valid_key() {
    let (_dir, state) = test_state().await;

    let (status, _) = get(&state, "/v1/jobs/some-id", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get(&state, "/v1/jobs/some-id", Some("wrong-key")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = post_generate(&state, "wrong-key", &generate_body()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn preflight_is_open() {
    let (_dir, state) = test_state().await;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/generate")
        .header(header::ORIGIN, "https://app.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn generate_validates_the_request() {
    let (_dir, state) = test_state().await;

    let mut body = generate_body();
    body["durationSec"] = json!(29);
    let (status, _) = post_generate(&state, TEST_KEY, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = generate_body();
    body["durationSec"] = json!(121);
    let (status, _) = post_generate(&state, TEST_KEY, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = generate_body();
    body["genres"] = json!([]);
    let (status, _) = post_generate(&state, TEST_KEY, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = generate_body();
    body["unknownField"] = json!(true);
    let (status, _) = post_generate(&state, TEST_KEY, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut body = generate_body();
    body["lyrics"] = json!("city lights");
    body["vocalLanguages"] = json!(["klingon"]);
    let (status, _) = post_generate(&state, TEST_KEY, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn generate_enqueues_and_is_idempotent() {
    let (_dir, state) = test_state().await;

    let (status, first) = post_generate(&state, TEST_KEY, &generate_body()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["reused"], false);
    let job_id = first["jobId"].as_str().unwrap().to_string();

    let (status, second) = post_generate(&state, TEST_KEY, &generate_body()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["reused"], true);
    assert_eq!(second["jobId"], first["jobId"]);

    // status endpoint exposes the public view only
    let (status, job) = get(&state, &format!("/v1/jobs/{job_id}"), Some(TEST_KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["id"], job_id.as_str());
    assert_eq!(job["type"], "pipeline");
    assert!(job["status"].is_string());
    assert!(job.get("dedupe_key").is_none());
    assert!(job.get("dedupeKey").is_none());
}

#[tokio::test]
async fn unknown_jobs_are_404() {
    let (_dir, state) = test_state().await;
    let (status, _) = get(&state, "/v1/jobs/no-such-job", Some(TEST_KEY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn other_tenants_jobs_read_as_missing() {
    let (_dir, state) = test_state().await;

    let (_, created) = post_generate(&state, TEST_KEY, &generate_body()).await;
    let job_id = created["jobId"].as_str().unwrap();

    state
        .store
        .ensure_api_key("other_tenant_key", "other", 60, chrono::Utc::now())
        .unwrap();
    let (status, _) = get(
        &state,
        &format!("/v1/jobs/{job_id}"),
        Some("other_tenant_key"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rate_limit_rejects_without_creating_jobs() {
    let (_dir, state) = test_state().await;
    state
        .store
        .ensure_api_key("limited_key", "limited", 3, chrono::Utc::now())
        .unwrap();

    for _ in 0..3 {
        let (status, _) = post_generate(&state, "limited_key", &generate_body()).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (status, body) = post_generate(&state, "limited_key", &generate_body()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].as_str().unwrap().contains("rate limit"));
    assert!(body.get("jobId").is_none());
}

#[tokio::test]
async fn files_stream_with_byte_ranges() {
    let (_dir, state) = test_state().await;
    state
        .storage
        .put("assets/2026/08/u/clip.wav", b"0123456789")
        .await
        .unwrap();

    let request = Request::builder()
        .uri("/v1/files/assets/2026/08/u/clip.wav")
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"))
        .header(header::RANGE, "bytes=2-5")
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        response.headers()[header::CONTENT_RANGE],
        "bytes 2-5/10"
    );
    let body = to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&body[..], b"2345");

    // no range: the whole object with its length
    let request = Request::builder()
        .uri("/v1/files/assets/2026/08/u/clip.wav")
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"))
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");

    // unsatisfiable range
    let request = Request::builder()
        .uri("/v1/files/assets/2026/08/u/clip.wav")
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"))
        .header(header::RANGE, "bytes=100-200")
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn missing_assets_are_404() {
    let (_dir, state) = test_state().await;
    let (status, _) = get(&state, "/v1/assets/no-such-asset", Some(TEST_KEY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&state, "/v1/files/assets/none.wav", Some(TEST_KEY)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancel_stops_a_queued_pipeline() {
    let (_dir, state) = test_state().await;

    let (_, created) = post_generate(&state, TEST_KEY, &generate_body()).await;
    let job_id = created["jobId"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/v1/jobs/{job_id}/cancel"))
        .header(header::AUTHORIZATION, format!("Bearer {TEST_KEY}"))
        .body(Body::empty())
        .unwrap();
    let response = api::router(state.clone()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    let value: Value = serde_json::from_slice(&body).unwrap();
    // either we cancelled it, or a worker already drove it to a terminal state
    assert!(value["status"].is_string());
}
