// Speaker Identity Resolution Engine
//
// Resolves "who is speaking" across recordings by matching extracted voice
// fingerprints against enrolled identities:
// - Multi-modal fingerprint fusion and similarity scoring
// - Enrollment, 1:1 verification and 1:N identification
// - Segment-level aggregation over diarized recordings
// - Accuracy evaluation (FAR / FRR / EER), consistency and latency checks
// - A parallel behavioral (speech-style) identity channel
//
// Feature extraction is a pluggable capability behind the
// FingerprintExtractor trait; deep-embedding models are optional and their
// absence degrades gracefully through the partial-match fusion policy.

pub mod behavioral;
pub mod config;
pub mod context;
pub mod enrollment;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod fusion;
pub mod identity;
pub mod segments;
pub mod store;
pub mod verification;

pub use behavioral::{BehavioralFeatures, BehavioralPattern, BehavioralPatternMatcher};
pub use config::ResolutionConfig;
pub use context::ResolutionContext;
pub use enrollment::{AudioClip, EnrollmentManager, MergePolicy};
pub use error::IdentityError;
pub use evaluation::{AccuracyEvaluator, AccuracyReport, EvaluationCase};
pub use features::{FingerprintExtractor, SpectralStatsExtractor};
pub use fusion::SimilarityFusionEngine;
pub use identity::{
    Fingerprint, IdentificationResult, Modality, SegmentVerificationResult, UpdatePolicy,
    VerificationResult, VoiceProfile,
};
pub use segments::{DiarizedSegment, SegmentAggregator};
pub use store::{FingerprintStore, MemoryStore, SqliteStore};
pub use verification::{IdentificationEngine, VerificationEngine};

// Reads RUST_LOG like the production logger; captured by the test harness
#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}
