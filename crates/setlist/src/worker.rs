//! Worker pool: claim-execute-settle loops over the job store.
//!
//! Workers share nothing in memory - the store's atomic claim is the only
//! coordination point, which is what lets several processes run pools over
//! one database. Within a process, an enqueue wake signal keeps idle
//! workers snappy without a tight poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Store;
use crate::types::{Job, JobError, JobType, NewAsset};

/// Idle poll pace when no wake signal arrives.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Jitter fraction added to retry backoff.
const BACKOFF_JITTER: f64 = 0.2;

/// What a successful handler hands back.
#[derive(Debug, Clone, Default)]
pub struct JobOutcome {
    pub result: serde_json::Value,
    pub assets: Vec<NewAsset>,
}

/// Execution context handed to handlers.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<Store>,
    /// Cancelled on pool shutdown; handlers abort their children on it.
    pub cancel: CancellationToken,
    pub worker_id: String,
}

/// One job type's execution logic.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job, ctx: &WorkerContext) -> Result<JobOutcome, JobError>;

    /// Wall-clock budget for one attempt of this job.
    fn timeout(&self, _job: &Job) -> Duration {
        Duration::from_secs(15 * 60)
    }
}

/// Pool of per-type worker loops over one store.
pub struct WorkerPool {
    store: Arc<Store>,
    handlers: HashMap<JobType, (Arc<dyn JobHandler>, u32)>,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_grace: Duration,
    worker_seq: AtomicU64,
}

impl WorkerPool {
    pub fn new(store: Arc<Store>, shutdown_grace: Duration) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            wake: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            shutdown_grace,
            worker_seq: AtomicU64::new(0),
        }
    }

    /// Register a handler with its concurrency.
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>, concurrency: u32) {
        self.handlers.insert(job_type, (handler, concurrency.max(1)));
    }

    /// Handle for the enqueue-side wake signal.
    pub fn waker(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    /// Nudge idle workers after an enqueue.
    pub fn wake(&self) {
        self.wake.notify_waiters();
    }

    /// Launch all worker loops.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for (&job_type, (handler, concurrency)) in &self.handlers {
            for _ in 0..*concurrency {
                let seq = self.worker_seq.fetch_add(1, Ordering::SeqCst);
                let worker = Worker {
                    store: Arc::clone(&self.store),
                    handler: Arc::clone(handler),
                    job_type,
                    worker_id: format!("{}-{}-{}", job_type, std::process::id(), seq),
                    wake: Arc::clone(&self.wake),
                    cancel: self.cancel.clone(),
                    shutdown_grace: self.shutdown_grace,
                };
                tasks.push(tokio::spawn(worker.run_loop()));
            }
        }
        tracing::info!(workers = tasks.len(), "worker pool started");
    }

    /// Signal shutdown and wait for in-flight jobs.
    ///
    /// Claims cease immediately. Each worker gets the grace window to finish
    /// its handler; anything still running after that was already returned
    /// to the queue by the worker's own cancellation path.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.wake.notify_waiters();

        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            guard.drain(..).collect()
        };

        for task in tasks {
            let _ = tokio::time::timeout(self.shutdown_grace + Duration::from_secs(1), task).await;
        }
        tracing::info!("worker pool stopped");
    }
}

struct Worker {
    store: Arc<Store>,
    handler: Arc<dyn JobHandler>,
    job_type: JobType,
    worker_id: String,
    wake: Arc<Notify>,
    cancel: CancellationToken,
    shutdown_grace: Duration,
}

impl Worker {
    async fn run_loop(self) {
        tracing::debug!(worker.id = %self.worker_id, "worker loop started");

        while !self.cancel.is_cancelled() {
            let claimed = match self.store.claim_next(&[self.job_type], &self.worker_id, Utc::now())
            {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(worker.id = %self.worker_id, error = %e, "claim failed");
                    None
                }
            };

            match claimed {
                Some(job) => self.execute(job).await,
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                    }
                }
            }
        }

        tracing::debug!(worker.id = %self.worker_id, "worker loop exited");
    }

    async fn execute(&self, job: Job) {
        let ctx = WorkerContext {
            store: Arc::clone(&self.store),
            cancel: self.cancel.clone(),
            worker_id: self.worker_id.clone(),
        };

        let budget = self.handler.timeout(&job);
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(budget, self.handler.run(&job, &ctx)).await;

        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(JobError::new(
                crate::types::ErrorKind::TimedOut,
                format!("attempt exceeded {}s budget", budget.as_secs()),
            )),
        };

        match result {
            Ok(outcome) => {
                if let Err(e) =
                    self.store
                        .succeed(&job.id, &outcome.result, &outcome.assets, Utc::now())
                {
                    tracing::error!(job.id = %job.id, error = %e, "failed to record success");
                }
                tracing::info!(
                    job.id = %job.id,
                    job.r#type = %job.job_type,
                    job.duration_ms = started.elapsed().as_millis() as u64,
                    "job completed"
                );
            }
            Err(err) => self.settle_failure(&job, err).await,
        }
    }

    async fn settle_failure(&self, job: &Job, err: JobError) {
        let now = Utc::now();

        // A shutdown mid-handler requeues the job for another worker or
        // instance after the grace window, regardless of error class.
        if self.cancel.is_cancelled() {
            let available = now.timestamp_millis() + self.shutdown_grace.as_millis() as i64;
            if let Err(e) = self
                .store
                .retry(&job.id, "interrupted by shutdown", available, now)
            {
                tracing::error!(job.id = %job.id, error = %e, "failed to requeue on shutdown");
            }
            return;
        }

        let cap = err.kind.attempt_cap(job.max_attempts);
        let out_of_attempts = job.attempts >= cap;

        if !err.retryable || out_of_attempts {
            tracing::warn!(
                job.id = %job.id,
                job.attempts = job.attempts,
                job.error_kind = ?err.kind,
                "job failed terminally"
            );
            if let Err(e) = self.store.fail(&job.id, &err.message, now) {
                tracing::error!(job.id = %job.id, error = %e, "failed to record failure");
            }
            return;
        }

        let available = now.timestamp_millis() + backoff_delay_ms(job.backoff_ms, job.attempts);
        tracing::info!(
            job.id = %job.id,
            job.attempts = job.attempts,
            job.error_kind = ?err.kind,
            job.available_at = available,
            "job scheduled for retry"
        );
        if let Err(e) = self.store.retry(&job.id, &err.message, available, now) {
            tracing::error!(job.id = %job.id, error = %e, "failed to schedule retry");
        }
    }
}

/// `backoff_ms * 2^(attempts-1)` plus up to 20% jitter.
pub fn backoff_delay_ms(backoff_ms: u64, attempts: u32) -> i64 {
    let base = backoff_ms.saturating_mul(1u64 << (attempts.saturating_sub(1)).min(20));
    let jitter = rand::thread_rng().gen_range(0.0..BACKOFF_JITTER);
    (base as f64 * (1.0 + jitter)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        // jitter is bounded at +20%, so ranges are disjoint enough to assert
        let first = backoff_delay_ms(2000, 1);
        let second = backoff_delay_ms(2000, 2);
        let third = backoff_delay_ms(2000, 3);
        assert!((2000..2400).contains(&first), "{first}");
        assert!((4000..4800).contains(&second), "{second}");
        assert!((8000..9600).contains(&third), "{third}");
    }

    #[test]
    fn backoff_shift_is_clamped() {
        // attempt counts far past any real budget must not overflow
        let delay = backoff_delay_ms(2000, 64);
        assert!(delay > 0);
    }
}
