// Typed errors for the identity resolution engine
// Wrapped in anyhow::Result at call sites; callers downcast when they
// need to distinguish InsufficientData from infrastructure failures.

use thiserror::Error;

/// Errors produced by enrollment, extraction and store operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Enrollment received samples but none survived extraction/validation.
    #[error("insufficient data: no usable fingerprint samples for '{name}' ({attempted} attempted)")]
    InsufficientData { name: String, attempted: usize },

    /// Feature extraction rejected the audio outright.
    #[error("audio too short: need at least {min_samples} samples, got {got}")]
    AudioTooShort { min_samples: usize, got: usize },

    /// Feature extraction failed for a reason internal to the extractor.
    #[error("fingerprint extraction failed: {0}")]
    Extraction(String),

    /// Enrollment with MergePolicy::RejectDuplicate hit an existing profile.
    #[error("profile '{0}' is already enrolled")]
    DuplicateProfile(String),
}
