//! Plan job handler: derive (and optionally enrich) a music plan.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use music_plan::{plan, PlanRequest};
use setlist::{ErrorKind, Job, JobError, JobHandler, JobOutcome, WorkerContext};

use crate::enrich::{enrich_or_fallback, PlanEnricher};

#[derive(Deserialize)]
struct PlanJobParams {
    request: PlanRequest,
}

pub struct PlanHandler {
    pub enricher: Arc<dyn PlanEnricher>,
}

#[async_trait]
impl JobHandler for PlanHandler {
    async fn run(&self, job: &Job, _ctx: &WorkerContext) -> Result<JobOutcome, JobError> {
        let params: PlanJobParams = serde_json::from_value(job.params.clone()).map_err(|e| {
            JobError::new(
                ErrorKind::InvalidRequest,
                format!("malformed plan params: {e}"),
            )
        })?;

        let draft = plan(&params.request)
            .map_err(|e| JobError::new(ErrorKind::InvalidRequest, e.to_string()))?;
        let enriched = enrich_or_fallback(self.enricher.as_ref(), draft).await;

        let result = serde_json::to_value(&enriched)
            .map_err(|e| JobError::new(ErrorKind::InternalError, e.to_string()))?;

        Ok(JobOutcome {
            result,
            assets: Vec::new(),
        })
    }

    fn timeout(&self, _job: &Job) -> Duration {
        Duration::from_secs(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::NoopEnricher;
    use serde_json::json;
    use setlist::{EnqueueOptions, JobType, Store};
    use tokio_util::sync::CancellationToken;

    fn ctx(store: Arc<Store>) -> WorkerContext {
        WorkerContext {
            store,
            cancel: CancellationToken::new(),
            worker_id: "test".to_string(),
        }
    }

    async fn run_with_params(params: serde_json::Value) -> Result<JobOutcome, JobError> {
        let store = Arc::new(Store::in_memory().unwrap());
        let id = store
            .enqueue(JobType::Plan, &params, &EnqueueOptions::default(), chrono::Utc::now())
            .unwrap()
            .job_id;
        let job = store
            .claim_next(&[JobType::Plan], "w", chrono::Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(job.id, id);

        let handler = PlanHandler {
            enricher: Arc::new(NoopEnricher),
        };
        handler.run(&job, &ctx(store)).await
    }

    #[tokio::test]
    async fn derives_a_plan_from_request_params() {
        let outcome = run_with_params(json!({
            "request": {
                "prompt": "dreamy synthwave nights",
                "genres": ["synthwave"],
                "duration_sec": 60
            }
        }))
        .await
        .unwrap();

        assert!(outcome.result["bpm"].is_u64());
        assert_eq!(outcome.result["sections"][0]["name"], "intro");
    }

    #[tokio::test]
    async fn invalid_durations_are_invalid_requests() {
        let err = run_with_params(json!({
            "request": {
                "prompt": "x",
                "genres": ["house"],
                "duration_sec": 29
            }
        }))
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn malformed_params_are_invalid_requests() {
        let err = run_with_params(json!({"nonsense": true})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }
}
