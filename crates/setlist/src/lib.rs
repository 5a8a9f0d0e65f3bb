//! Persistent job queue for Jamboree.
//!
//! The SQLite-backed [`Store`] is the single coordination point: workers in
//! one process (or several) claim jobs through an atomic single-row update,
//! so no in-memory queue exists anywhere. Enqueueing is idempotent within a
//! 24 h window via SHA-256 dedupe fingerprints, and per-key admission runs
//! on one-minute UTC rate windows.
//!
//! [`WorkerPool`] runs the claim-execute-settle loops: per-type concurrency,
//! wake-on-enqueue, classified retries with exponential backoff and jitter,
//! and graceful shutdown that returns in-flight jobs to the queue.

pub mod db;
pub mod dedupe;
pub mod janitor;
pub mod types;
pub mod worker;

pub use db::Store;
pub use dedupe::{canonical_json, dedupe_key};
pub use types::{
    ApiKey, Asset, AssetKind, EnqueueOptions, EnqueueResult, ErrorKind, Job, JobError, JobStatus,
    JobType, NewAsset, StoreError,
};
pub use worker::{JobHandler, JobOutcome, WorkerContext, WorkerPool};
