// Verification (1:1) and identification (1:N) engines
// Decisions are threshold-based; thresholds are always caller-supplied.

use anyhow::Result;
use log::{debug, warn};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::fusion::SimilarityFusionEngine;
use crate::identity::{Fingerprint, IdentificationResult, RankedMatch, VerificationResult};
use crate::store::FingerprintStore;

/// Confirms or rejects one claimed identity.
pub struct VerificationEngine {
    store: Arc<dyn FingerprintStore>,
    fusion: SimilarityFusionEngine,
}

impl VerificationEngine {
    pub fn new(store: Arc<dyn FingerprintStore>, fusion: SimilarityFusionEngine) -> Self {
        Self { store, fusion }
    }

    /// 1:1 verification of `candidate` against the profile enrolled under
    /// `claimed_name`. Fails closed: an unknown name yields a clean
    /// `(false, 0.0)` result tagged "no_profile", never an error.
    pub fn verify(
        &self,
        candidate: &Fingerprint,
        claimed_name: &str,
        threshold: f32,
    ) -> Result<VerificationResult> {
        let result = self.verify_without_usage(candidate, claimed_name, threshold)?;
        if result.is_match {
            self.record_usage(claimed_name);
        }
        Ok(result)
    }

    /// The same decision as `verify` with no usage bookkeeping. For callers
    /// that fold many checks into one recorded match, like the per-segment
    /// loop over a single recording.
    pub fn verify_without_usage(
        &self,
        candidate: &Fingerprint,
        claimed_name: &str,
        threshold: f32,
    ) -> Result<VerificationResult> {
        let Some(profile) = self.store.get_by_name(claimed_name)? else {
            debug!("Verification against unknown name '{}'", claimed_name);
            return Ok(VerificationResult::no_match("no_profile"));
        };

        let breakdown = self.fusion.score_detailed(candidate, &profile.fingerprint);
        let is_match = breakdown.score >= threshold;

        debug!(
            "Verified '{}': confidence {:.3} vs threshold {:.3} -> {}",
            claimed_name, breakdown.score, threshold, is_match
        );

        Ok(VerificationResult {
            is_match,
            confidence: breakdown.score,
            reason: None,
            modality_scores: breakdown.modality_scores,
        })
    }

    /// Usage bookkeeping must not turn a successful match into an error.
    pub(crate) fn record_usage(&self, name: &str) {
        if let Err(e) = self.store.increment_usage(name) {
            warn!("Failed to record usage for '{}': {}", name, e);
        }
    }
}

/// Ranks the enrolled gallery against a candidate fingerprint.
pub struct IdentificationEngine {
    store: Arc<dyn FingerprintStore>,
    fusion: SimilarityFusionEngine,
}

impl IdentificationEngine {
    pub fn new(store: Arc<dyn FingerprintStore>, fusion: SimilarityFusionEngine) -> Self {
        Self { store, fusion }
    }

    /// 1:N identification: every enrolled profile scoring at or above the
    /// threshold, best first. Ties keep enrollment order (the gallery is
    /// listed in enrollment order and the sort is stable). An empty gallery
    /// or degenerate candidate yields an empty ranking, never an error.
    pub fn identify(
        &self,
        candidate: &Fingerprint,
        threshold: f32,
    ) -> Result<IdentificationResult> {
        if candidate.is_degenerate() {
            return Ok(IdentificationResult {
                ranked_matches: Vec::new(),
            });
        }

        let gallery = self.store.list_all()?;
        let mut ranked_matches: Vec<RankedMatch> = gallery
            .iter()
            .map(|profile| RankedMatch {
                name: profile.name.clone(),
                score: self.fusion.score(candidate, &profile.fingerprint),
            })
            .filter(|m| m.score >= threshold)
            .collect();

        // Stable sort over the enrollment-ordered list: equal scores keep
        // enrollment order as the deterministic tie-break
        ranked_matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

        debug!(
            "Identification over {} profiles produced {} matches",
            gallery.len(),
            ranked_matches.len()
        );

        Ok(IdentificationResult { ranked_matches })
    }

    /// The single best match, if any. Records a usage hit on the winner.
    pub fn identify_top1(
        &self,
        candidate: &Fingerprint,
        threshold: f32,
    ) -> Result<Option<RankedMatch>> {
        let result = self.identify(candidate, threshold)?;
        let best = result.ranked_matches.into_iter().next();

        if let Some(ref winner) = best {
            if let Err(e) = self.store.increment_usage(&winner.name) {
                warn!("Failed to record usage for '{}': {}", winner.name, e);
            }
        }

        Ok(best)
    }
}
