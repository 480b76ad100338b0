// Resolution context
// Explicit context object bundling the store, the extractor and the engine
// configuration for one processing run. Engines are built from it on
// demand; nothing here lives in process-wide statics.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::config::ResolutionConfig;
use crate::enrollment::EnrollmentManager;
use crate::evaluation::AccuracyEvaluator;
use crate::features::FingerprintExtractor;
use crate::fusion::SimilarityFusionEngine;
use crate::segments::SegmentAggregator;
use crate::store::{FingerprintStore, MemoryStore};
use crate::verification::{IdentificationEngine, VerificationEngine};

/// Everything one identity-resolution run needs, built at run start and
/// dropped at run end.
pub struct ResolutionContext {
    store: Arc<dyn FingerprintStore>,
    extractor: Arc<dyn FingerprintExtractor>,
    config: ResolutionConfig,
}

impl ResolutionContext {
    pub fn new(
        store: Arc<dyn FingerprintStore>,
        extractor: Arc<dyn FingerprintExtractor>,
        config: ResolutionConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            config,
        }
    }

    /// Context over a fresh in-memory gallery, for single-run workloads.
    pub fn in_memory(extractor: Arc<dyn FingerprintExtractor>) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            extractor,
            ResolutionConfig::default(),
        )
    }

    pub fn store(&self) -> Arc<dyn FingerprintStore> {
        self.store.clone()
    }

    pub fn extractor(&self) -> Arc<dyn FingerprintExtractor> {
        self.extractor.clone()
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    pub fn enrollment(&self) -> EnrollmentManager {
        EnrollmentManager::new(self.store.clone(), self.extractor.clone())
    }

    pub fn verification(&self) -> VerificationEngine {
        VerificationEngine::new(self.store.clone(), SimilarityFusionEngine::new())
    }

    pub fn identification(&self) -> IdentificationEngine {
        IdentificationEngine::new(self.store.clone(), SimilarityFusionEngine::new())
    }

    pub fn segments(&self) -> SegmentAggregator {
        SegmentAggregator::new(self.extractor.clone(), self.verification()).with_gates(
            self.config.min_segment_seconds,
            self.config.match_ratio_gate,
        )
    }

    pub fn evaluator(&self) -> AccuracyEvaluator {
        AccuracyEvaluator::new(self.extractor.clone())
    }

    /// Delete profiles beyond the retention window that were used fewer
    /// than the configured minimum number of times. Returns the number
    /// removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.config.retention_days);
        self.store
            .delete_where(cutoff, self.config.retention_min_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::MergePolicy;
    use crate::features::SpectralStatsExtractor;
    use crate::identity::{Fingerprint, Modality};

    fn fingerprint(values: &[f32]) -> Fingerprint {
        let mut fp = Fingerprint::new(16000, 1.0);
        fp.insert(Modality::EmbeddingWespeaker, values.to_vec());
        fp
    }

    #[test]
    fn test_engines_share_one_store() {
        let ctx = ResolutionContext::in_memory(Arc::new(SpectralStatsExtractor::new()));

        ctx.enrollment()
            .enroll("alice", &[fingerprint(&[1.0, 0.0])], MergePolicy::Replace)
            .unwrap();

        let result = ctx
            .verification()
            .verify(&fingerprint(&[1.0, 0.0]), "alice", 0.9)
            .unwrap();
        assert!(result.is_match);

        let ranked = ctx
            .identification()
            .identify(&fingerprint(&[1.0, 0.0]), 0.5)
            .unwrap();
        assert_eq!(ranked.ranked_matches[0].name, "alice");
    }

    #[test]
    fn test_cleanup_respects_retention_window() {
        let ctx = ResolutionContext::in_memory(Arc::new(SpectralStatsExtractor::new()));
        ctx.enrollment()
            .enroll("alice", &[fingerprint(&[1.0])], MergePolicy::Replace)
            .unwrap();

        // Freshly enrolled profiles are inside the window
        assert_eq!(ctx.cleanup_expired().unwrap(), 0);
        assert!(ctx.store().get_by_name("alice").unwrap().is_some());
    }
}
