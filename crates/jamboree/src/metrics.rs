//! Prometheus metrics registry.
//!
//! Exposed at `GET /metrics` in the text exposition format.

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,

    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,

    pub jobs_created_total: IntCounterVec,
    pub jobs_succeeded_total: IntCounterVec,
    pub jobs_failed_total: IntCounterVec,
    pub job_duration_seconds: HistogramVec,

    pub transcoder_errors_total: IntCounter,
    pub transcoder_available: IntGauge,
    pub transcoder_stage_duration_seconds: HistogramVec,

    pub rate_limit_rejects_total: IntCounter,
    pub workers_active: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests served"),
            &["method", "route", "status"],
        )
        .unwrap();

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["method", "route"],
        )
        .unwrap();

        let jobs_created_total = IntCounterVec::new(
            Opts::new("jobs_created_total", "Jobs inserted into the store"),
            &["type"],
        )
        .unwrap();

        let jobs_succeeded_total = IntCounterVec::new(
            Opts::new("jobs_succeeded_total", "Jobs that reached succeeded"),
            &["type"],
        )
        .unwrap();

        let jobs_failed_total = IntCounterVec::new(
            Opts::new("jobs_failed_total", "Jobs that reached failed"),
            &["type"],
        )
        .unwrap();

        let job_duration_seconds = HistogramVec::new(
            HistogramOpts::new("job_duration_seconds", "Handler execution time in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 180.0, 600.0]),
            &["type"],
        )
        .unwrap();

        let transcoder_errors_total = IntCounter::new(
            "transcoder_errors_total",
            "Transcoder child failures (non-zero exit or timeout)",
        )
        .unwrap();

        let transcoder_available = IntGauge::new(
            "transcoder_available",
            "Whether the transcoder binary probe succeeded (0/1)",
        )
        .unwrap();

        let transcoder_stage_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transcoder_stage_duration_seconds",
                "Pipeline stage wall time in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 180.0]),
            &["stage"],
        )
        .unwrap();

        let rate_limit_rejects_total = IntCounter::new(
            "rate_limit_rejects_total",
            "Requests rejected by per-key rate admission",
        )
        .unwrap();

        let workers_active = IntGaugeVec::new(
            Opts::new("workers_active", "Worker loops running per job type"),
            &["type"],
        )
        .unwrap();

        for collector in [
            Box::new(http_requests_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(http_request_duration_seconds.clone()),
            Box::new(jobs_created_total.clone()),
            Box::new(jobs_succeeded_total.clone()),
            Box::new(jobs_failed_total.clone()),
            Box::new(job_duration_seconds.clone()),
            Box::new(transcoder_errors_total.clone()),
            Box::new(transcoder_available.clone()),
            Box::new(transcoder_stage_duration_seconds.clone()),
            Box::new(rate_limit_rejects_total.clone()),
            Box::new(workers_active.clone()),
        ] {
            registry.register(collector).unwrap();
        }

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            jobs_created_total,
            jobs_succeeded_total,
            jobs_failed_total,
            job_duration_seconds,
            transcoder_errors_total,
            transcoder_available,
            transcoder_stage_duration_seconds,
            rate_limit_rejects_total,
            workers_active,
        }
    }

    /// Stage timing helper.
    pub fn stage_timer(&self, stage: &str) -> Histogram {
        self.transcoder_stage_duration_seconds
            .with_label_values(&[stage])
    }

    /// Render the registry in the text exposition format.
    pub fn render(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_registered_families() {
        let metrics = Metrics::new();
        metrics
            .http_requests_total
            .with_label_values(&["GET", "/health", "200"])
            .inc();
        metrics.transcoder_available.set(1);
        metrics
            .jobs_created_total
            .with_label_values(&["pipeline"])
            .inc();

        let text = metrics.render();
        assert!(text.contains("http_requests_total"));
        assert!(text.contains("transcoder_available 1"));
        assert!(text.contains(r#"jobs_created_total{type="pipeline"} 1"#));
    }

    #[test]
    fn stage_timer_observes() {
        let metrics = Metrics::new();
        metrics.stage_timer("mixing").observe(1.5);
        assert!(metrics.render().contains("transcoder_stage_duration_seconds"));
    }
}
