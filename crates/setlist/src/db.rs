//! SQLite persistence with connection-per-call.
//!
//! Every method opens a fresh connection with WAL mode and a busy timeout,
//! so the store can be shared freely across worker tasks and processes.
//! `claim_next` is the only critical section and runs as a single atomic
//! UPDATE; the partial unique index on active dedupe keys settles
//! concurrent enqueue races.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::dedupe::dedupe_key;
use crate::types::{
    ApiKey, Asset, EnqueueOptions, EnqueueResult, Job, JobType, NewAsset, StoreError,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    status TEXT NOT NULL,
    params JSON NOT NULL,
    result JSON,
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    backoff_ms INTEGER NOT NULL DEFAULT 2000,
    available_at INTEGER NOT NULL,
    started_at INTEGER,
    completed_at INTEGER,
    last_success_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    error TEXT,
    progress REAL NOT NULL DEFAULT 0,
    status_message TEXT,
    dedupe_key TEXT NOT NULL,
    parent_id TEXT,
    api_key_id TEXT,
    worker_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, type, available_at, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_dedupe ON jobs(dedupe_key, status, completed_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_dedupe_active
    ON jobs(dedupe_key) WHERE status IN ('queued', 'running');
CREATE INDEX IF NOT EXISTS idx_jobs_parent ON jobs(parent_id);

CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    mime TEXT NOT NULL,
    path TEXT NOT NULL,
    url TEXT NOT NULL,
    duration_sec REAL NOT NULL DEFAULT 0,
    size_bytes INTEGER NOT NULL DEFAULT 0,
    meta JSON NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_assets_job ON assets(job_id);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    key TEXT NOT NULL UNIQUE,
    owner TEXT NOT NULL,
    rate_limit_per_min INTEGER NOT NULL DEFAULT 60,
    disabled_at INTEGER,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS rate_counters (
    api_key_id TEXT NOT NULL,
    window_start_ms INTEGER NOT NULL,
    tokens INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (api_key_id, window_start_ms)
);
"#;

const JOB_COLUMNS: &str = "id, type, status, params, result, attempts, max_attempts, backoff_ms, \
     available_at, started_at, completed_at, last_success_at, created_at, updated_at, error, \
     progress, status_message, dedupe_key, parent_id, api_key_id, worker_id";

/// Persistent job store.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (and initialize) the store at a SQLite path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    rusqlite::Error::SqliteFailure(
                        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                        Some(format!("cannot create {}: {e}", parent.display())),
                    )
                })?;
            }
        }

        let store = Self { path };
        let conn = store.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(store)
    }

    /// A unique throwaway database file. Each call gets a fresh store -
    /// suitable for tests.
    pub fn in_memory() -> Result<Self, StoreError> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        let name = format!("setlist_{}_{unique}.db", std::process::id());
        Self::open(std::env::temp_dir().join(name))
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }

    /// Liveness check.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Enqueue / dedupe
    // -----------------------------------------------------------------------

    /// Insert a job, or return the id of an equivalent one.
    ///
    /// A queued/running job with the same fingerprint is always reused; a
    /// succeeded one is reused while inside the idempotency window. When two
    /// enqueuers race on identical inputs, the loser hits the active-dedupe
    /// unique index and re-reads the winner's row.
    pub fn enqueue(
        &self,
        job_type: JobType,
        params: &serde_json::Value,
        opts: &EnqueueOptions,
        now: DateTime<Utc>,
    ) -> Result<EnqueueResult, StoreError> {
        let key = dedupe_key(job_type, params, opts.parent_id.as_deref());
        let now_ms = now.timestamp_millis();
        let conn = self.conn()?;

        if let Some(job_id) = find_reusable(&conn, &key, now_ms, opts.idempotency_window_ms)? {
            return Ok(EnqueueResult {
                job_id,
                reused: true,
            });
        }

        let id = Uuid::new_v4().to_string();
        let inserted = conn.execute(
            "INSERT INTO jobs (id, type, status, params, attempts, max_attempts, backoff_ms, \
             available_at, created_at, updated_at, dedupe_key, parent_id, api_key_id) \
             VALUES (?1, ?2, 'queued', ?3, 0, ?4, ?5, ?6, ?6, ?6, ?7, ?8, ?9)",
            params![
                id,
                job_type.as_str(),
                params.to_string(),
                opts.max_attempts,
                opts.backoff_ms,
                now_ms,
                key,
                opts.parent_id,
                opts.api_key_id,
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::info!(job.id = %id, job.r#type = %job_type, "job enqueued");
                Ok(EnqueueResult {
                    job_id: id,
                    reused: false,
                })
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                match find_reusable(&conn, &key, now_ms, opts.idempotency_window_ms)? {
                    Some(job_id) => Ok(EnqueueResult {
                        job_id,
                        reused: true,
                    }),
                    None => Err(StoreError::NotFound {
                        what: "dedupe winner",
                        id: key,
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Find a succeeded job for this fingerprint completed at or after
    /// `since` (epoch ms).
    pub fn find_succeeded_by_dedupe(
        &self,
        key: &str,
        since_ms: i64,
    ) -> Result<Option<Job>, StoreError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE dedupe_key = ?1 AND status = 'succeeded' AND completed_at >= ?2 \
             ORDER BY completed_at DESC LIMIT 1"
        );
        let job = conn
            .prepare(&sql)?
            .query_row(params![key, since_ms], job_from_row)
            .optional()?;
        Ok(job)
    }

    // -----------------------------------------------------------------------
    // Claim / settle
    // -----------------------------------------------------------------------

    /// Atomically claim the oldest eligible job of one of `types`.
    ///
    /// The claim transitions the row to running, increments attempts, and
    /// records the worker - all in one UPDATE, so two claimants can never
    /// hold the same job.
    pub fn claim_next(
        &self,
        types: &[JobType],
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Job>, StoreError> {
        if types.is_empty() {
            return Ok(None);
        }

        let placeholders: Vec<String> =
            (0..types.len()).map(|i| format!("?{}", i + 3)).collect();
        let sql = format!(
            "UPDATE jobs SET status = 'running', attempts = attempts + 1, started_at = ?1, \
             updated_at = ?1, worker_id = ?2 \
             WHERE id = (SELECT id FROM jobs \
                         WHERE status = 'queued' AND available_at <= ?1 AND type IN ({}) \
                         ORDER BY created_at ASC, id ASC LIMIT 1) \
             RETURNING {JOB_COLUMNS}",
            placeholders.join(", ")
        );

        let now_ms = now.timestamp_millis();
        let mut args: Vec<String> = vec![now_ms.to_string(), worker_id.to_string()];
        args.extend(types.iter().map(|t| t.as_str().to_string()));

        let conn = self.conn()?;
        let job = conn
            .prepare(&sql)?
            .query_row(params_from_iter(args), job_from_row)
            .optional()?;

        if let Some(ref job) = job {
            tracing::debug!(
                job.id = %job.id,
                job.r#type = %job.job_type,
                job.attempt = job.attempts,
                worker.id = worker_id,
                "job claimed"
            );
        }
        Ok(job)
    }

    /// Terminal success: record the result and insert asset rows in one
    /// transaction. Assets become visible only here.
    pub fn succeed(
        &self,
        id: &str,
        result: &serde_json::Value,
        assets: &[NewAsset],
        now: DateTime<Utc>,
    ) -> Result<Vec<Asset>, StoreError> {
        let now_ms = now.timestamp_millis();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE jobs SET status = 'succeeded', result = ?2, completed_at = ?3, \
             last_success_at = ?3, updated_at = ?3, progress = 100, error = NULL \
             WHERE id = ?1 AND status = 'running'",
            params![id, result.to_string(), now_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                what: "running job",
                id: id.to_string(),
            });
        }

        let mut inserted = Vec::with_capacity(assets.len());
        for asset in assets {
            let asset_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO assets (id, job_id, kind, mime, path, url, duration_sec, \
                 size_bytes, meta, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    asset_id,
                    id,
                    asset.kind.as_str(),
                    asset.mime,
                    asset.path,
                    asset.url,
                    asset.duration_sec,
                    asset.size_bytes,
                    asset.meta.to_string(),
                    now_ms,
                ],
            )?;
            inserted.push(Asset {
                id: asset_id,
                job_id: id.to_string(),
                kind: asset.kind,
                mime: asset.mime.clone(),
                path: asset.path.clone(),
                url: asset.url.clone(),
                duration_sec: asset.duration_sec,
                size_bytes: asset.size_bytes,
                meta: asset.meta.clone(),
                created_at: now_ms,
            });
        }

        tx.commit()?;
        tracing::info!(job.id = %id, job.assets = inserted.len(), "job succeeded");
        Ok(inserted)
    }

    /// Terminal failure.
    pub fn fail(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let now_ms = now.timestamp_millis();
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET status = 'failed', error = ?2, completed_at = ?3, updated_at = ?3 \
             WHERE id = ?1 AND status = 'running'",
            params![id, error, now_ms],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                what: "running job",
                id: id.to_string(),
            });
        }
        tracing::warn!(job.id = %id, job.error = error, "job failed");
        Ok(())
    }

    /// Return a running job to the queue for another attempt at
    /// `available_at` (epoch ms).
    pub fn retry(
        &self,
        id: &str,
        error: &str,
        available_at_ms: i64,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET status = 'queued', error = ?2, available_at = ?3, \
             updated_at = ?4, worker_id = NULL WHERE id = ?1 AND status = 'running'",
            params![id, error, available_at_ms, now.timestamp_millis()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound {
                what: "running job",
                id: id.to_string(),
            });
        }
        tracing::info!(job.id = %id, job.available_at = available_at_ms, "job requeued");
        Ok(())
    }

    /// Cancel a queued or running job. Returns false when the job was
    /// already terminal (or unknown).
    pub fn cancel(&self, id: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let now_ms = now.timestamp_millis();
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE jobs SET status = 'cancelled', completed_at = ?2, updated_at = ?2 \
             WHERE id = ?1 AND status IN ('queued', 'running')",
            params![id, now_ms],
        )?;
        Ok(updated > 0)
    }

    /// Idempotent progress update. Percent never decreases; status and the
    /// lifecycle timestamps are untouched.
    pub fn update_progress(
        &self,
        id: &str,
        percent: f64,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE jobs SET progress = MAX(progress, MIN(?2, 100.0)), \
             status_message = COALESCE(?3, status_message), updated_at = ?4 \
             WHERE id = ?1",
            params![id, percent, message, now.timestamp_millis()],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1");
        let job = conn
            .prepare(&sql)?
            .query_row(params![id], job_from_row)
            .optional()?;
        Ok(job)
    }

    /// A pipeline's children, oldest first.
    pub fn list_children(&self, parent_id: &str) -> Result<Vec<Job>, StoreError> {
        let conn = self.conn()?;
        let sql =
            format!("SELECT {JOB_COLUMNS} FROM jobs WHERE parent_id = ?1 ORDER BY created_at ASC, id ASC");
        let jobs = conn
            .prepare(&sql)?
            .query_map(params![parent_id], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    // -----------------------------------------------------------------------
    // Assets
    // -----------------------------------------------------------------------

    pub fn get_asset(&self, id: &str) -> Result<Option<Asset>, StoreError> {
        let conn = self.conn()?;
        let asset = conn
            .prepare(
                "SELECT id, job_id, kind, mime, path, url, duration_sec, size_bytes, meta, \
                 created_at FROM assets WHERE id = ?1",
            )?
            .query_row(params![id], asset_from_row)
            .optional()?;
        Ok(asset)
    }

    pub fn list_assets_for_job(&self, job_id: &str) -> Result<Vec<Asset>, StoreError> {
        let conn = self.conn()?;
        let assets = conn
            .prepare(
                "SELECT id, job_id, kind, mime, path, url, duration_sec, size_bytes, meta, \
                 created_at FROM assets WHERE job_id = ?1 ORDER BY created_at ASC, id ASC",
            )?
            .query_map(params![job_id], asset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(assets)
    }

    // -----------------------------------------------------------------------
    // API keys and rate admission
    // -----------------------------------------------------------------------

    /// Insert the bootstrap key if its value is not present yet, returning
    /// the stored row either way.
    pub fn ensure_api_key(
        &self,
        key: &str,
        owner: &str,
        rate_limit_per_min: u32,
        now: DateTime<Utc>,
    ) -> Result<ApiKey, StoreError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO api_keys (id, key, owner, rate_limit_per_min, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                key,
                owner,
                rate_limit_per_min,
                now.timestamp_millis(),
            ],
        )?;
        drop(conn);

        self.get_api_key(key)?.ok_or_else(|| StoreError::NotFound {
            what: "api key",
            id: owner.to_string(),
        })
    }

    /// Look up a key by its opaque value.
    pub fn get_api_key(&self, key: &str) -> Result<Option<ApiKey>, StoreError> {
        let conn = self.conn()?;
        let row = conn
            .prepare(
                "SELECT id, key, owner, rate_limit_per_min, disabled_at, created_at \
                 FROM api_keys WHERE key = ?1",
            )?
            .query_row(params![key], |row| {
                Ok(ApiKey {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    owner: row.get(2)?,
                    rate_limit_per_min: row.get(3)?,
                    disabled_at: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .optional()?;
        Ok(row)
    }

    /// Admit one request against the key's per-minute budget.
    ///
    /// Atomic upsert-increment on the current UTC minute window; when the
    /// incremented count exceeds the limit the token is handed back and the
    /// request is rejected.
    pub fn try_admit(
        &self,
        api_key_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let now_ms = now.timestamp_millis();
        let window_start = now_ms - now_ms.rem_euclid(60_000);

        let conn = self.conn()?;
        let tokens: i64 = conn.query_row(
            "INSERT INTO rate_counters (api_key_id, window_start_ms, tokens) VALUES (?1, ?2, 1) \
             ON CONFLICT(api_key_id, window_start_ms) DO UPDATE SET tokens = tokens + 1 \
             RETURNING tokens",
            params![api_key_id, window_start],
            |row| row.get(0),
        )?;

        if tokens > limit as i64 {
            conn.execute(
                "UPDATE rate_counters SET tokens = tokens - 1 \
                 WHERE api_key_id = ?1 AND window_start_ms = ?2",
                params![api_key_id, window_start],
            )?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Drop rate windows older than `before_ms`; they are disposable.
    pub fn prune_rate_counters(&self, before_ms: i64) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM rate_counters WHERE window_start_ms < ?1",
            params![before_ms],
        )?;
        Ok(removed)
    }
}

fn find_reusable(
    conn: &Connection,
    key: &str,
    now_ms: i64,
    window_ms: i64,
) -> Result<Option<String>, StoreError> {
    let id = conn
        .prepare(
            "SELECT id FROM jobs WHERE dedupe_key = ?1 AND \
             (status IN ('queued', 'running') OR \
              (status = 'succeeded' AND completed_at >= ?2)) \
             ORDER BY created_at DESC LIMIT 1",
        )?
        .query_row(params![key, now_ms - window_ms], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn job_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let job_type: String = row.get(1)?;
    let status: String = row.get(2)?;
    let params_text: String = row.get(3)?;
    let result_text: Option<String> = row.get(4)?;

    Ok(Job {
        id: row.get(0)?,
        job_type: job_type.parse().map_err(text_conversion_error)?,
        status: status.parse().map_err(text_conversion_error)?,
        params: serde_json::from_str(&params_text).unwrap_or(serde_json::Value::Null),
        result: result_text.and_then(|t| serde_json::from_str(&t).ok()),
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        backoff_ms: row.get(7)?,
        available_at: row.get(8)?,
        started_at: row.get(9)?,
        completed_at: row.get(10)?,
        last_success_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        error: row.get(14)?,
        progress: row.get(15)?,
        status_message: row.get(16)?,
        dedupe_key: row.get(17)?,
        parent_id: row.get(18)?,
        api_key_id: row.get(19)?,
        worker_id: row.get(20)?,
    })
}

fn asset_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Asset> {
    let kind: String = row.get(2)?;
    let meta_text: String = row.get(8)?;

    Ok(Asset {
        id: row.get(0)?,
        job_id: row.get(1)?,
        kind: kind.parse().map_err(text_conversion_error)?,
        mime: row.get(3)?,
        path: row.get(4)?,
        url: row.get(5)?,
        duration_sec: row.get(6)?,
        size_bytes: row.get(7)?,
        meta: serde_json::from_str(&meta_text).unwrap_or(serde_json::Value::Null),
        created_at: row.get(9)?,
    })
}

fn text_conversion_error(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        message.into(),
    )
}
