// Decision result value objects returned to callers

use serde::{Deserialize, Serialize};

use super::Modality;

/// Per-modality contribution to a fused similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityScore {
    pub modality: Modality,
    /// Cosine similarity for this modality, before weighting
    pub similarity: f32,
    /// Weight this modality carried in the fused score
    pub weight: f32,
}

/// Outcome of a 1:1 verification against a claimed identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_match: bool,
    /// Fused confidence in [0, 1]
    pub confidence: f32,
    /// Why a negative result came back without a comparison
    /// (e.g. "no_profile"); None for ordinary decisions
    pub reason: Option<String>,
    /// Per-modality diagnostic breakdown
    pub modality_scores: Vec<ModalityScore>,
}

impl VerificationResult {
    /// A clean negative result produced without running a comparison.
    pub fn no_match(reason: &str) -> Self {
        Self {
            is_match: false,
            confidence: 0.0,
            reason: Some(reason.to_string()),
            modality_scores: Vec::new(),
        }
    }
}

/// One entry of an identification ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedMatch {
    pub name: String,
    pub score: f32,
}

/// Outcome of a 1:N identification against the enrolled gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentificationResult {
    /// Matches at or above the threshold, best first. Ties keep
    /// enrollment order.
    pub ranked_matches: Vec<RankedMatch>,
}

/// Per-segment decision inside a segment-aggregated verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDecision {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub is_match: bool,
    pub confidence: f32,
}

/// Outcome of verifying a claimed identity across diarized segments.
///
/// The overall decision requires both gates: average confidence at or above
/// the threshold AND match ratio at or above the ratio gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentVerificationResult {
    pub is_match: bool,
    pub avg_confidence: f32,
    pub max_confidence: f32,
    /// Fraction of evaluated segments that individually matched
    pub match_ratio: f32,
    pub segments_evaluated: usize,
    /// False when the run was cancelled before covering every segment;
    /// the aggregates then describe only the segments that were processed
    pub is_complete: bool,
    pub reason: Option<String>,
    pub per_segment: Vec<SegmentDecision>,
}

impl SegmentVerificationResult {
    /// A negative result for runs where no segment survived slicing.
    pub fn no_match(reason: &str, is_complete: bool) -> Self {
        Self {
            is_match: false,
            avg_confidence: 0.0,
            max_confidence: 0.0,
            match_ratio: 0.0,
            segments_evaluated: 0,
            is_complete,
            reason: Some(reason.to_string()),
            per_segment: Vec::new(),
        }
    }
}
