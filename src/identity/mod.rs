// Shared data model for speaker identity resolution
// Fingerprints, enrolled profiles and decision result objects

mod fingerprint;
mod profile;
mod results;

pub use fingerprint::{Fingerprint, Modality, FEATURE_SCHEMA_VERSION};
pub use profile::VoiceProfile;
pub use results::{
    IdentificationResult, ModalityScore, RankedMatch, SegmentDecision, SegmentVerificationResult,
    VerificationResult,
};

use serde::{Deserialize, Serialize};

/// How new observations fold into a stored representation.
///
/// Enrollment uses `BatchAverage`: all samples are combined in one pass with
/// equal weight. The behavioral channel uses `Streaming`: each observation is
/// folded into the running mean as it arrives. The two produce the same
/// numbers for equal-weight inputs but are kept as an explicit variant so the
/// modules state which strategy they follow instead of duplicating the
/// arithmetic with small drifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// Recompute the mean over the full sample set in one pass.
    BatchAverage,
    /// Fold each new sample into the running mean in place.
    Streaming,
}

impl UpdatePolicy {
    /// Merge sample vectors into one representative vector.
    ///
    /// `existing` pairs the current representative with the number of samples
    /// behind it; pass `None` for a fresh enrollment. Vectors whose length
    /// disagrees with the first usable sample are skipped. Returns `None` when
    /// nothing usable was provided.
    pub fn merge_vectors(
        self,
        existing: Option<(&[f32], u32)>,
        samples: &[&[f32]],
    ) -> Option<Vec<f32>> {
        let dim = existing
            .map(|(v, _)| v.len())
            .or_else(|| samples.iter().find(|s| !s.is_empty()).map(|s| s.len()))?;
        if dim == 0 {
            return None;
        }

        match self {
            UpdatePolicy::BatchAverage => {
                let mut sum = vec![0.0f64; dim];
                let mut weight = 0.0f64;
                if let Some((vec, count)) = existing {
                    let count = count.max(1) as f64;
                    for (acc, &v) in sum.iter_mut().zip(vec.iter()) {
                        *acc += f64::from(v) * count;
                    }
                    weight += count;
                }
                for sample in samples.iter().filter(|s| s.len() == dim) {
                    for (acc, &v) in sum.iter_mut().zip(sample.iter()) {
                        *acc += f64::from(v);
                    }
                    weight += 1.0;
                }
                if weight == 0.0 {
                    return None;
                }
                Some(sum.into_iter().map(|v| (v / weight) as f32).collect())
            }
            UpdatePolicy::Streaming => {
                let (mut mean, mut count) = match existing {
                    Some((vec, count)) => (
                        vec.iter().map(|&v| f64::from(v)).collect::<Vec<f64>>(),
                        count.max(1) as f64,
                    ),
                    None => (vec![0.0f64; dim], 0.0),
                };
                for sample in samples.iter().filter(|s| s.len() == dim) {
                    count += 1.0;
                    for (m, &v) in mean.iter_mut().zip(sample.iter()) {
                        *m += (f64::from(v) - *m) / count;
                    }
                }
                if count == 0.0 {
                    return None;
                }
                Some(mean.into_iter().map(|v| v as f32).collect())
            }
        }
    }

    /// Fold a scalar observation into a running mean over `count` prior samples.
    pub fn fold_scalar(self, current: f32, count: u32, sample: f32) -> f32 {
        let n = count as f32;
        match self {
            UpdatePolicy::BatchAverage => (current * n + sample) / (n + 1.0),
            UpdatePolicy::Streaming => current + (sample - current) / (n + 1.0),
        }
    }
}
