// Multi-modal voice fingerprint
// Maps feature modalities to fixed-length vectors plus scalar metadata

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Version stamp written into every fingerprint so profiles enrolled under
/// an older feature schema can be told apart from fresh ones.
pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// One feature family of a voice fingerprint.
///
/// The two embedding modalities are optional deep models; the three
/// statistical modalities come from plain DSP. A fingerprint may carry any
/// subset, and comparison silently skips whatever the other side lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Mel-band log-energy statistics (mean/std per band).
    MfccStats,
    /// Spectral shape statistics (centroid, rolloff, flux, rms).
    Spectral,
    /// Prosody statistics (pitch, voicing, energy contour).
    Prosodic,
    /// WeSpeaker-style deep speaker embedding.
    EmbeddingWespeaker,
    /// CAM++-style deep speaker embedding.
    EmbeddingCampplus,
}

impl Modality {
    /// All modalities in their canonical comparison order.
    pub const ALL: [Modality; 5] = [
        Modality::MfccStats,
        Modality::Spectral,
        Modality::Prosodic,
        Modality::EmbeddingWespeaker,
        Modality::EmbeddingCampplus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::MfccStats => "mfcc_stats",
            Modality::Spectral => "spectral",
            Modality::Prosodic => "prosodic",
            Modality::EmbeddingWespeaker => "embedding_wespeaker",
            Modality::EmbeddingCampplus => "embedding_campplus",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A multi-modal voice fingerprint extracted from one audio sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Per-modality feature vectors. Absent modalities are simply missing.
    features: HashMap<Modality, Vec<f32>>,
    /// Sample rate of the source audio in Hz.
    pub sample_rate: u32,
    /// Duration of the source audio in seconds.
    pub duration_seconds: f32,
    /// Feature schema version the vectors were produced under.
    pub schema_version: u32,
}

impl Fingerprint {
    pub fn new(sample_rate: u32, duration_seconds: f32) -> Self {
        Self {
            features: HashMap::new(),
            sample_rate,
            duration_seconds,
            schema_version: FEATURE_SCHEMA_VERSION,
        }
    }

    /// Attach a feature vector for a modality. Empty vectors are dropped
    /// rather than stored, so "present" always means "usable".
    pub fn insert(&mut self, modality: Modality, vector: Vec<f32>) {
        if !vector.is_empty() {
            self.features.insert(modality, vector);
        }
    }

    /// The feature vector for a modality, if present.
    pub fn vector(&self, modality: Modality) -> Option<&[f32]> {
        self.features.get(&modality).map(Vec::as_slice)
    }

    /// Number of modalities carrying a non-empty vector.
    pub fn modality_count(&self) -> usize {
        self.features.len()
    }

    /// Modalities present, in canonical order.
    pub fn modalities(&self) -> Vec<Modality> {
        Modality::ALL
            .iter()
            .copied()
            .filter(|m| self.features.contains_key(m))
            .collect()
    }

    /// Whether two fingerprints can be compared on a modality: both sides
    /// carry it, non-empty, with identical vector length. Anything else is
    /// excluded from comparison, never an error.
    pub fn comparable_on(&self, other: &Fingerprint, modality: Modality) -> bool {
        match (self.vector(modality), other.vector(modality)) {
            (Some(a), Some(b)) => !a.is_empty() && a.len() == b.len(),
            _ => false,
        }
    }

    /// A fingerprint with no usable vectors at all cannot match anything.
    pub fn is_degenerate(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_vector_not_stored() {
        let mut fp = Fingerprint::new(16000, 1.0);
        fp.insert(Modality::Spectral, vec![]);
        assert!(fp.vector(Modality::Spectral).is_none());
        assert!(fp.is_degenerate());
    }

    #[test]
    fn test_comparable_requires_equal_lengths() {
        let mut a = Fingerprint::new(16000, 1.0);
        let mut b = Fingerprint::new(16000, 1.0);
        a.insert(Modality::MfccStats, vec![1.0, 2.0, 3.0]);
        b.insert(Modality::MfccStats, vec![1.0, 2.0]);
        assert!(!a.comparable_on(&b, Modality::MfccStats));

        b.insert(Modality::MfccStats, vec![4.0, 5.0, 6.0]);
        assert!(a.comparable_on(&b, Modality::MfccStats));
        assert!(!a.comparable_on(&b, Modality::Spectral));
    }

    #[test]
    fn test_modalities_in_canonical_order() {
        let mut fp = Fingerprint::new(16000, 1.0);
        fp.insert(Modality::EmbeddingCampplus, vec![0.1]);
        fp.insert(Modality::MfccStats, vec![0.2]);
        assert_eq!(
            fp.modalities(),
            vec![Modality::MfccStats, Modality::EmbeddingCampplus]
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let mut fp = Fingerprint::new(16000, 2.5);
        fp.insert(Modality::Prosodic, vec![0.5, 0.25]);
        let json = serde_json::to_string(&fp).unwrap();
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.vector(Modality::Prosodic), Some(&[0.5, 0.25][..]));
        assert_eq!(back.sample_rate, 16000);
    }
}
