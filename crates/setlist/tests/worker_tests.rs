//! Worker pool behavior with stub handlers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use setlist::{
    EnqueueOptions, ErrorKind, Job, JobError, JobHandler, JobOutcome, JobStatus, JobType, Store,
    WorkerContext, WorkerPool,
};

/// Handler that records executions and fails the first `failures_per_job`
/// attempts of each job.
struct FlakyHandler {
    executions: Arc<Mutex<Vec<String>>>,
    failures_per_job: u32,
    seen: Arc<Mutex<HashMap<String, u32>>>,
    error_kind: ErrorKind,
}

impl FlakyHandler {
    fn reliable(executions: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            executions,
            failures_per_job: 0,
            seen: Arc::new(Mutex::new(HashMap::new())),
            error_kind: ErrorKind::InternalError,
        }
    }

    fn failing(kind: ErrorKind, failures_per_job: u32) -> Self {
        Self {
            executions: Arc::new(Mutex::new(Vec::new())),
            failures_per_job,
            seen: Arc::new(Mutex::new(HashMap::new())),
            error_kind: kind,
        }
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn run(&self, job: &Job, _ctx: &WorkerContext) -> Result<JobOutcome, JobError> {
        self.executions.lock().unwrap().push(job.id.clone());

        let mut seen = self.seen.lock().unwrap();
        let attempts_failed = seen.entry(job.id.clone()).or_insert(0);
        if *attempts_failed < self.failures_per_job {
            *attempts_failed += 1;
            return Err(JobError::new(self.error_kind, "injected failure"));
        }

        Ok(JobOutcome {
            result: json!({"ok": true}),
            assets: Vec::new(),
        })
    }
}

async fn wait_for_status(store: &Store, id: &str, status: JobStatus) -> Job {
    for _ in 0..200 {
        let job = store.get_job(id).unwrap().unwrap();
        if job.status == status {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {id} never reached {status:?}");
}

fn fast_opts() -> EnqueueOptions {
    EnqueueOptions {
        backoff_ms: 40,
        ..Default::default()
    }
}

#[tokio::test]
async fn pool_executes_each_job_exactly_once() {
    let store = Arc::new(Store::in_memory().unwrap());
    let executions = Arc::new(Mutex::new(Vec::new()));

    let mut pool = WorkerPool::new(Arc::clone(&store), Duration::from_secs(2));
    pool.register(
        JobType::Audio,
        Arc::new(FlakyHandler::reliable(Arc::clone(&executions))),
        5,
    );
    pool.start();

    let now = Utc::now();
    let mut ids = Vec::new();
    for i in 0..10 {
        let result = store
            .enqueue(JobType::Audio, &json!({"n": i}), &fast_opts(), now)
            .unwrap();
        ids.push(result.job_id);
    }
    pool.wake();

    for id in &ids {
        let job = wait_for_status(&store, id, JobStatus::Succeeded).await;
        assert_eq!(job.attempts, 1);
        assert!(job.completed_at.is_some());
    }
    pool.stop().await;

    let mut executed = executions.lock().unwrap().clone();
    executed.sort();
    let total = executed.len();
    executed.dedup();
    assert_eq!(total, 10, "each job ran once");
    assert_eq!(executed.len(), 10, "no duplicate executions");
}

#[tokio::test]
async fn transient_failures_retry_with_backoff_then_succeed() {
    let store = Arc::new(Store::in_memory().unwrap());
    let mut pool = WorkerPool::new(Arc::clone(&store), Duration::from_secs(2));
    pool.register(
        JobType::Mix,
        Arc::new(FlakyHandler::failing(ErrorKind::TranscoderFailed, 2)),
        1,
    );
    pool.start();

    let id = store
        .enqueue(JobType::Mix, &json!({"m": 1}), &fast_opts(), Utc::now())
        .unwrap()
        .job_id;
    pool.wake();

    let job = wait_for_status(&store, &id, JobStatus::Succeeded).await;
    assert_eq!(job.attempts, 3, "two failures then success");
    pool.stop().await;
}

#[tokio::test]
async fn persistent_failures_exhaust_attempts() {
    let store = Arc::new(Store::in_memory().unwrap());
    let mut pool = WorkerPool::new(Arc::clone(&store), Duration::from_secs(2));
    pool.register(
        JobType::Mix,
        Arc::new(FlakyHandler::failing(ErrorKind::TranscoderFailed, u32::MAX)),
        1,
    );
    pool.start();

    let id = store
        .enqueue(JobType::Mix, &json!({"m": 2}), &fast_opts(), Utc::now())
        .unwrap()
        .job_id;
    pool.wake();

    let job = wait_for_status(&store, &id, JobStatus::Failed).await;
    assert_eq!(job.attempts, 3, "default max_attempts");
    assert_eq!(job.error.as_deref(), Some("injected failure"));
    pool.stop().await;
}

#[tokio::test]
async fn max_attempts_one_fails_without_retry() {
    let store = Arc::new(Store::in_memory().unwrap());
    let mut pool = WorkerPool::new(Arc::clone(&store), Duration::from_secs(2));
    pool.register(
        JobType::Video,
        Arc::new(FlakyHandler::failing(ErrorKind::TranscoderFailed, u32::MAX)),
        1,
    );
    pool.start();

    let opts = EnqueueOptions {
        max_attempts: 1,
        backoff_ms: 40,
        ..Default::default()
    };
    let id = store
        .enqueue(JobType::Video, &json!({"v": 1}), &opts, Utc::now())
        .unwrap()
        .job_id;
    pool.wake();

    let job = wait_for_status(&store, &id, JobStatus::Failed).await;
    assert_eq!(job.attempts, 1);
    pool.stop().await;
}

#[tokio::test]
async fn invalid_requests_never_retry() {
    let store = Arc::new(Store::in_memory().unwrap());
    let mut pool = WorkerPool::new(Arc::clone(&store), Duration::from_secs(2));
    pool.register(
        JobType::Plan,
        Arc::new(FlakyHandler::failing(ErrorKind::InvalidRequest, u32::MAX)),
        1,
    );
    pool.start();

    let id = store
        .enqueue(JobType::Plan, &json!({"bad": true}), &fast_opts(), Utc::now())
        .unwrap()
        .job_id;
    pool.wake();

    let job = wait_for_status(&store, &id, JobStatus::Failed).await;
    assert_eq!(job.attempts, 1);
    pool.stop().await;
}

#[tokio::test]
async fn timeouts_retry_once_then_fail() {
    let store = Arc::new(Store::in_memory().unwrap());
    let mut pool = WorkerPool::new(Arc::clone(&store), Duration::from_secs(2));
    pool.register(
        JobType::Audio,
        Arc::new(FlakyHandler::failing(ErrorKind::TimedOut, u32::MAX)),
        1,
    );
    pool.start();

    let id = store
        .enqueue(JobType::Audio, &json!({"t": 1}), &fast_opts(), Utc::now())
        .unwrap()
        .job_id;
    pool.wake();

    let job = wait_for_status(&store, &id, JobStatus::Failed).await;
    assert_eq!(job.attempts, 2, "timeout retries once, then fails");
    pool.stop().await;
}
