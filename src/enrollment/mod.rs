// Enrollment manager
// Builds a representative profile from one or more fingerprint samples and
// upserts it by name under a caller-supplied merge policy.

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::IdentityError;
use crate::features::FingerprintExtractor;
use crate::identity::{Fingerprint, Modality, UpdatePolicy, VoiceProfile};
use crate::store::FingerprintStore;

/// What to do when enrolling a name that already has a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Replace the stored fingerprint with the new samples.
    Replace,
    /// Average the new samples into the existing fingerprint, weighted by
    /// the sample counts behind each side.
    AverageIn,
    /// Refuse to touch an existing profile.
    RejectDuplicate,
}

/// One raw audio sample offered for enrollment.
#[derive(Debug, Clone, Copy)]
pub struct AudioClip<'a> {
    pub samples: &'a [f32],
    pub sample_rate: u32,
}

/// Builds and merges voice profiles.
pub struct EnrollmentManager {
    store: Arc<dyn FingerprintStore>,
    extractor: Arc<dyn FingerprintExtractor>,
}

impl EnrollmentManager {
    pub fn new(store: Arc<dyn FingerprintStore>, extractor: Arc<dyn FingerprintExtractor>) -> Self {
        Self { store, extractor }
    }

    /// Enroll a name from raw audio clips.
    ///
    /// Individual extraction failures are logged and skipped; enrollment
    /// fails with `InsufficientData` only when zero samples survive.
    pub fn enroll_audio(
        &self,
        name: &str,
        clips: &[AudioClip<'_>],
        policy: MergePolicy,
    ) -> Result<VoiceProfile> {
        let mut fingerprints = Vec::with_capacity(clips.len());
        for (idx, clip) in clips.iter().enumerate() {
            match self.extractor.extract(clip.samples, clip.sample_rate) {
                Ok(fp) => fingerprints.push(fp),
                Err(e) => {
                    warn!("Skipping enrollment sample {} for '{}': {}", idx, name, e);
                }
            }
        }
        self.enroll_with_attempted(name, &fingerprints, clips.len(), policy)
    }

    /// Enroll a name from already-extracted fingerprints.
    pub fn enroll(
        &self,
        name: &str,
        fingerprints: &[Fingerprint],
        policy: MergePolicy,
    ) -> Result<VoiceProfile> {
        self.enroll_with_attempted(name, fingerprints, fingerprints.len(), policy)
    }

    fn enroll_with_attempted(
        &self,
        name: &str,
        fingerprints: &[Fingerprint],
        attempted: usize,
        policy: MergePolicy,
    ) -> Result<VoiceProfile> {
        let usable: Vec<&Fingerprint> = fingerprints
            .iter()
            .filter(|fp| {
                if fp.is_degenerate() {
                    warn!("Skipping degenerate fingerprint for '{}'", name);
                    false
                } else {
                    true
                }
            })
            .collect();

        if usable.is_empty() {
            return Err(IdentityError::InsufficientData {
                name: name.to_string(),
                attempted,
            }
            .into());
        }

        let merged = merge_fingerprints(&usable);
        let sample_count = usable.len() as u32;

        let profile = match self.store.get_by_name(name)? {
            None => VoiceProfile::new(name, merged, sample_count),
            Some(existing) => match policy {
                MergePolicy::RejectDuplicate => {
                    return Err(IdentityError::DuplicateProfile(name.to_string()).into());
                }
                MergePolicy::Replace => {
                    let mut profile = existing;
                    profile.fingerprint = merged;
                    profile.sample_count = sample_count;
                    profile
                }
                MergePolicy::AverageIn => {
                    let mut profile = existing;
                    profile.fingerprint =
                        average_into(&profile.fingerprint, profile.sample_count, &merged, sample_count);
                    profile.sample_count += sample_count;
                    profile
                }
            },
        };

        info!(
            "Enrolled '{}' from {} samples ({} modalities)",
            name,
            sample_count,
            profile.fingerprint.modality_count()
        );
        self.store.upsert(profile)
    }
}

/// Merge fingerprints into one representative: for each modality, the
/// elementwise batch average over only the samples that carry it. Scalar
/// metadata is copied from the first usable sample.
fn merge_fingerprints(fingerprints: &[&Fingerprint]) -> Fingerprint {
    let Some(first) = fingerprints.first() else {
        return Fingerprint::new(0, 0.0);
    };
    let mut merged = Fingerprint::new(first.sample_rate, first.duration_seconds);
    merged.schema_version = first.schema_version;

    for modality in Modality::ALL {
        let vectors: Vec<&[f32]> = fingerprints
            .iter()
            .filter_map(|fp| fp.vector(modality))
            .collect();
        if vectors.is_empty() {
            continue;
        }
        if let Some(mean) = UpdatePolicy::BatchAverage.merge_vectors(None, &vectors) {
            merged.insert(modality, mean);
        }
    }

    merged
}

/// Weighted merge of a new representative into an existing one. Modalities
/// present on only one side are carried over unchanged.
fn average_into(
    existing: &Fingerprint,
    existing_count: u32,
    incoming: &Fingerprint,
    incoming_count: u32,
) -> Fingerprint {
    let mut merged = Fingerprint::new(existing.sample_rate, existing.duration_seconds);
    merged.schema_version = existing.schema_version;

    for modality in Modality::ALL {
        match (existing.vector(modality), incoming.vector(modality)) {
            (Some(old), Some(new)) if old.len() == new.len() => {
                let total = (existing_count + incoming_count).max(1) as f32;
                let combined: Vec<f32> = old
                    .iter()
                    .zip(new.iter())
                    .map(|(o, n)| {
                        (o * existing_count as f32 + n * incoming_count as f32) / total
                    })
                    .collect();
                merged.insert(modality, combined);
            }
            (Some(old), Some(new)) => {
                warn!(
                    "Modality {} length changed ({} -> {}), keeping new vector",
                    modality,
                    old.len(),
                    new.len()
                );
                merged.insert(modality, new.to_vec());
            }
            (Some(old), None) => merged.insert(modality, old.to_vec()),
            (None, Some(new)) => merged.insert(modality, new.to_vec()),
            (None, None) => {}
        }
    }

    merged
}
