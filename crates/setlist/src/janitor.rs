//! Background maintenance: stale scratch directories and old rate windows.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Store;

/// Scratch directories from failed attempts are kept this long for
/// inspection before collection.
pub const SCRATCH_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Rate windows are one minute wide; an hour of history is plenty.
const RATE_WINDOW_RETENTION_MS: i64 = 60 * 60 * 1000;

/// How often the janitor wakes.
const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Spawn the janitor loop. It sweeps immediately, then on an interval,
/// until the token cancels.
pub fn spawn(store: Arc<Store>, scratch_root: PathBuf, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sweep(&store, &scratch_root).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            }
        }
    })
}

async fn sweep(store: &Store, scratch_root: &PathBuf) {
    match store.prune_rate_counters(Utc::now().timestamp_millis() - RATE_WINDOW_RETENTION_MS) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!(janitor.rate_windows = removed, "pruned rate windows"),
        Err(e) => tracing::warn!(error = %e, "rate window pruning failed"),
    }

    match collect_stale_scratch(scratch_root, SCRATCH_MAX_AGE).await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(janitor.scratch_dirs = removed, "collected stale scratch"),
        Err(e) => tracing::warn!(error = %e, "scratch collection failed"),
    }
}

/// Remove scratch directories whose content has not changed in `max_age`.
///
/// A directory actively used by a claimed job always has a fresh mtime, so
/// only abandoned attempts age out.
pub async fn collect_stale_scratch(
    scratch_root: &PathBuf,
    max_age: Duration,
) -> std::io::Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(scratch_root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let cutoff = SystemTime::now() - max_age;
    while let Some(entry) = entries.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_dir() => meta,
            _ => continue,
        };

        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < cutoff {
            if tokio::fs::remove_dir_all(entry.path()).await.is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}
