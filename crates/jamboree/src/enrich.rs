//! Plan enrichment seam.
//!
//! An external suggestion service may refine a derived plan. The core only
//! depends on this trait; when no enricher is configured (or one fails),
//! the deterministic plan stands.

use async_trait::async_trait;
use music_plan::MusicPlan;

#[async_trait]
pub trait PlanEnricher: Send + Sync {
    /// Refine a draft plan. Errors are logged and the draft is kept.
    async fn enrich(&self, draft: &MusicPlan) -> anyhow::Result<MusicPlan>;
}

/// Default enricher: passthrough.
pub struct NoopEnricher;

#[async_trait]
impl PlanEnricher for NoopEnricher {
    async fn enrich(&self, draft: &MusicPlan) -> anyhow::Result<MusicPlan> {
        Ok(draft.clone())
    }
}

/// Apply the enricher, falling back to the draft on any failure.
pub async fn enrich_or_fallback(enricher: &dyn PlanEnricher, draft: MusicPlan) -> MusicPlan {
    match enricher.enrich(&draft).await {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, "plan enrichment failed, keeping deterministic plan");
            draft
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use music_plan::{plan, PlanRequest};

    struct FailingEnricher;

    #[async_trait]
    impl PlanEnricher for FailingEnricher {
        async fn enrich(&self, _draft: &MusicPlan) -> anyhow::Result<MusicPlan> {
            anyhow::bail!("suggestion backend offline")
        }
    }

    fn draft() -> MusicPlan {
        plan(&PlanRequest {
            prompt: "steady groove".to_string(),
            genres: vec!["house".to_string()],
            duration_sec: 60,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn noop_passes_through() {
        let d = draft();
        let enriched = enrich_or_fallback(&NoopEnricher, d.clone()).await;
        assert_eq!(enriched, d);
    }

    #[tokio::test]
    async fn failure_falls_back_to_the_draft() {
        let d = draft();
        let enriched = enrich_or_fallback(&FailingEnricher, d.clone()).await;
        assert_eq!(enriched, d);
    }
}
