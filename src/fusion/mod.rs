// Similarity fusion engine
// Weighted fusion of per-modality cosine similarities into one score.
// This is the single similarity authority: verification, identification and
// any store-side pre-filtering all score through here.

use once_cell::sync::Lazy;
use std::collections::HashMap;

use crate::identity::{Fingerprint, Modality, ModalityScore};

/// Fixed fusion weights. The deep embeddings dominate; the statistical
/// modalities refine. Missing modalities drop out of the denominator, so an
/// absent embedding model never penalizes the score.
pub static MODALITY_WEIGHTS: Lazy<HashMap<Modality, f32>> = Lazy::new(|| {
    HashMap::from([
        (Modality::MfccStats, 0.2),
        (Modality::Spectral, 0.1),
        (Modality::Prosodic, 0.1),
        (Modality::EmbeddingWespeaker, 0.3),
        (Modality::EmbeddingCampplus, 0.3),
    ])
});

/// Breakdown of one fused comparison, for diagnostics.
#[derive(Debug, Clone)]
pub struct FusionBreakdown {
    /// Fused score in [0, 1]
    pub score: f32,
    /// Modalities that actually took part in the comparison
    pub modality_scores: Vec<ModalityScore>,
}

/// Fuses per-modality similarities into a single confidence score.
#[derive(Debug, Clone)]
pub struct SimilarityFusionEngine {
    weights: HashMap<Modality, f32>,
}

impl Default for SimilarityFusionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimilarityFusionEngine {
    pub fn new() -> Self {
        Self {
            weights: MODALITY_WEIGHTS.clone(),
        }
    }

    /// Build an engine with custom weights. Modalities absent from the map
    /// never contribute.
    pub fn with_weights(weights: HashMap<Modality, f32>) -> Self {
        Self { weights }
    }

    /// Fused similarity between two fingerprints, in [0, 1].
    ///
    /// Only modalities present on both sides with equal vector lengths take
    /// part; the result is the weight-normalized average over those, so the
    /// denominator is the sum of included weights, not the full table.
    /// Returns 0.0 when no modality pair qualifies.
    pub fn score(&self, a: &Fingerprint, b: &Fingerprint) -> f32 {
        self.score_detailed(a, b).score
    }

    /// Like `score`, but keeps the per-modality contributions.
    pub fn score_detailed(&self, a: &Fingerprint, b: &Fingerprint) -> FusionBreakdown {
        let mut weighted_sum = 0.0f32;
        let mut weight_total = 0.0f32;
        let mut modality_scores = Vec::new();

        for modality in Modality::ALL {
            let weight = match self.weights.get(&modality) {
                Some(&w) if w > 0.0 => w,
                _ => continue,
            };
            if !a.comparable_on(b, modality) {
                continue;
            }
            // comparable_on guarantees both vectors exist with equal length
            let (Some(vec_a), Some(vec_b)) = (a.vector(modality), b.vector(modality)) else {
                continue;
            };

            let similarity = cosine_similarity(vec_a, vec_b);
            weighted_sum += similarity * weight;
            weight_total += weight;
            modality_scores.push(ModalityScore {
                modality,
                similarity,
                weight,
            });
        }

        let score = if weight_total > 0.0 {
            // Clamp absorbs floating-point noise and anti-correlated vectors
            (weighted_sum / weight_total).clamp(0.0, 1.0)
        } else {
            // No comparable data
            0.0
        };

        FusionBreakdown {
            score,
            modality_scores,
        }
    }
}

/// Cosine similarity between two equal-length vectors.
/// Zero-norm or mismatched inputs score 0.0 rather than erroring.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
