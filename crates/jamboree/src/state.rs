//! Shared application state and bootstrap.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use bounce::{Capabilities, Renderer, Transcoder};
use jamconf::{JamConfig, StorageBackend};
use setlist::{janitor, Store, WorkerPool};
use stash::{BlobStore, LocalStore, S3Options, S3Store};

use crate::enrich::{NoopEnricher, PlanEnricher};
use crate::handlers;
use crate::metrics::Metrics;

/// Everything the API layer and workers share.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<JamConfig>,
    pub store: Arc<Store>,
    pub storage: Arc<dyn BlobStore>,
    pub transcoder: Transcoder,
    pub metrics: Arc<Metrics>,
    pub enricher: Arc<dyn PlanEnricher>,
    pub pool: Arc<WorkerPool>,
    pub boot_capabilities: Capabilities,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Open every dependency, probe the transcoder, seed the default key,
    /// and launch the worker pool and janitor.
    pub async fn bootstrap(config: JamConfig) -> Result<Self> {
        let config = Arc::new(config);
        let metrics = Arc::new(Metrics::new());

        let store = Arc::new(
            Store::open(config.database.path())
                .with_context(|| format!("opening store at {}", config.database.path().display()))?,
        );

        let public_base = config.http.public_base_url();
        let storage: Arc<dyn BlobStore> = match config.storage.backend {
            StorageBackend::Local => Arc::new(
                LocalStore::new(
                    &config.storage.assets_dir,
                    format!("{public_base}/v1/files"),
                )
                .context("initializing local storage")?,
            ),
            StorageBackend::S3 => Arc::new(
                S3Store::connect(S3Options {
                    bucket: config.storage.s3.bucket.clone().unwrap_or_default(),
                    region: config.storage.s3.region.clone(),
                    endpoint: config.storage.s3.endpoint.clone(),
                    access_key_id: config.storage.s3.access_key_id.clone(),
                    secret_access_key: config.storage.s3.secret_access_key.clone(),
                })
                .await
                .context("connecting to S3 storage")?,
            ),
        };

        let transcoder = Transcoder::new(&config.transcoder.bin, &config.transcoder.probe_bin);
        let boot_capabilities = transcoder.probe().await;
        metrics
            .transcoder_available
            .set(boot_capabilities.ready() as i64);

        if let Some(key) = &config.limits.default_api_key {
            store
                .ensure_api_key(key, "default", config.limits.rate_limit_per_min, Utc::now())
                .context("seeding default API key")?;
        }

        let scratch_root = config.storage.assets_dir.join("tmp");
        let renderer = Arc::new(Renderer::new(
            transcoder.clone(),
            Arc::clone(&storage),
            &scratch_root,
        ));
        let enricher: Arc<dyn PlanEnricher> = Arc::new(NoopEnricher);

        let mut pool = WorkerPool::new(
            Arc::clone(&store),
            Duration::from_secs(config.workers.shutdown_grace_sec),
        );
        let waker = pool.waker();
        handlers::register_all(
            &mut pool,
            handlers::HandlerDeps {
                config: Arc::clone(&config),
                renderer,
                enricher: Arc::clone(&enricher),
                metrics: Arc::clone(&metrics),
                waker,
            },
        );
        let pool = Arc::new(pool);
        pool.start();

        for job_type in setlist::JobType::ALL {
            metrics
                .workers_active
                .with_label_values(&[job_type.as_str()])
                .set(config.workers.concurrency_for(job_type.as_str()) as i64);
        }

        let shutdown = CancellationToken::new();
        janitor::spawn(Arc::clone(&store), scratch_root, shutdown.child_token());

        Ok(Self {
            config,
            store,
            storage,
            transcoder,
            metrics,
            enricher,
            pool,
            boot_capabilities,
            shutdown,
        })
    }

    /// Nudge idle workers after an enqueue.
    pub fn wake_workers(&self) {
        self.pool.wake();
    }
}
