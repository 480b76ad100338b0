// Correction-driven learning
// Records user corrections of speaker suggestions and nudges the behavioral
// pattern of the corrected name with a high-confidence sample. This is an
// approximate reinforcement heuristic, not a weighted-learning rule.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::BehavioralPatternMatcher;

/// Confidence appended to a pattern when a user confirms the identity.
pub const CORRECTION_CONFIDENCE: f32 = 0.9;

/// One recorded user correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// What the system suggested
    pub original_suggestion: String,
    /// What the user corrected it to
    pub corrected_name: String,
    /// Free-form context (recording id, segment range, ...)
    pub context: String,
    pub recorded_at: DateTime<Utc>,
}

/// Accumulates corrections over a processing run.
#[derive(Debug, Default)]
pub struct CorrectionLearner {
    corrections: Vec<CorrectionRecord>,
}

impl CorrectionLearner {
    pub fn new() -> Self {
        Self {
            corrections: Vec::new(),
        }
    }

    /// Record a correction and, when the corrected name already has a
    /// behavioral pattern, append a high-confidence sample to bias future
    /// matches toward it. Unknown names are recorded but leave the matcher
    /// untouched.
    pub fn record(
        &mut self,
        matcher: &mut BehavioralPatternMatcher,
        original_suggestion: &str,
        corrected_name: &str,
        context: &str,
    ) {
        info!(
            "Recording correction '{}' -> '{}' ({})",
            original_suggestion, corrected_name, context
        );
        self.corrections.push(CorrectionRecord {
            original_suggestion: original_suggestion.to_string(),
            corrected_name: corrected_name.to_string(),
            context: context.to_string(),
            recorded_at: Utc::now(),
        });

        if matcher.reinforce(corrected_name, CORRECTION_CONFIDENCE) {
            debug!("Reinforced behavioral pattern for '{}'", corrected_name);
        } else {
            debug!(
                "No behavioral pattern for '{}' yet; correction recorded only",
                corrected_name
            );
        }
    }

    pub fn corrections(&self) -> &[CorrectionRecord] {
        &self.corrections
    }

    /// Corrections that moved a suggestion away from a given name, useful
    /// for spotting systematically over-suggested identities.
    pub fn corrections_away_from(&self, name: &str) -> usize {
        self.corrections
            .iter()
            .filter(|c| c.original_suggestion == name && c.corrected_name != name)
            .count()
    }
}
