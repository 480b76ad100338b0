// Enrolled speaker profile
// One representative fingerprint per name plus usage bookkeeping

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Fingerprint;

/// A registered speaker identity built by enrollment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    /// Unique identifier
    pub id: String,
    /// Display name; unique within a store
    pub name: String,
    /// Representative fingerprint (average over enrollment samples)
    pub fingerprint: Fingerprint,
    /// Number of audio samples folded into the representative fingerprint
    pub sample_count: u32,
    /// When the profile was first enrolled
    pub created_at: DateTime<Utc>,
    /// Last successful match against this profile
    pub last_used: Option<DateTime<Utc>>,
    /// Number of successful matches against this profile
    pub usage_count: u32,
    /// Advisory per-profile threshold. Decision APIs never substitute this
    /// for the caller-supplied threshold; it only travels with the profile
    /// so callers can surface it.
    pub suggested_threshold: Option<f32>,
}

impl VoiceProfile {
    pub fn new(name: &str, fingerprint: Fingerprint, sample_count: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            fingerprint,
            sample_count,
            created_at: Utc::now(),
            last_used: None,
            usage_count: 0,
            suggested_threshold: None,
        }
    }
}
