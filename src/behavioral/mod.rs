// Behavioral pattern matching
// A parallel, non-audio identity channel built from speech-style statistics
// of the transcript. Uses a plain average of available component
// similarities, deliberately distinct from the weighted audio fusion rule.

pub mod consistency;
pub mod learning;

use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::identity::UpdatePolicy;

/// Maximum number of repeated phrases kept per pattern.
pub const MAX_COMMON_PHRASES: usize = 5;

static WORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[a-zA-Z']+").expect("word pattern is valid")
});

/// Markers counted toward the formality ratio.
const FORMAL_KEYWORDS: [&str; 8] = [
    "therefore",
    "furthermore",
    "regarding",
    "accordingly",
    "consequently",
    "moreover",
    "nevertheless",
    "hence",
];

const INFORMAL_KEYWORDS: [&str; 10] = [
    "yeah", "gonna", "wanna", "kinda", "stuff", "cool", "okay", "like", "um", "uh",
];

/// One transcript segment attributed to a single speaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// Speech-style features extracted from a set of transcript segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralFeatures {
    /// Average words per segment
    pub avg_segment_length: f32,
    /// Words per minute over the spoken time span
    pub speech_rate_wpm: f32,
    /// Formal-marker hits over all formality-marker hits, in [0, 1];
    /// 0.5 when no markers appear either way
    pub formality_score: f32,
    /// Average word length / 10, clamped to [0, 1]
    pub vocabulary_complexity: f32,
    /// Most frequent repeated two-word phrases (frequency > 1), at most 5
    pub common_phrases: Vec<String>,
}

/// Stored behavioral identity for one name.
///
/// Updated with `UpdatePolicy::Streaming`: every new observation folds into
/// the running averages in place, unlike voice enrollment's batch averaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralPattern {
    pub name: String,
    pub features: BehavioralFeatures,
    /// Number of observations folded into the running averages
    pub usage_count: u32,
    /// Confidence of every observation, oldest first
    pub confidence_history: Vec<f32>,
}

/// Matches transcripts against stored behavioral patterns.
#[derive(Debug, Default)]
pub struct BehavioralPatternMatcher {
    patterns: HashMap<String, BehavioralPattern>,
}

impl BehavioralPatternMatcher {
    pub fn new() -> Self {
        Self {
            patterns: HashMap::new(),
        }
    }

    /// Extract speech-style features from a speaker's transcript segments.
    pub fn extract_features(segments: &[TranscriptSegment]) -> BehavioralFeatures {
        let mut word_count = 0usize;
        let mut char_count = 0usize;
        let mut formal_hits = 0usize;
        let mut informal_hits = 0usize;
        let mut bigram_counts: HashMap<String, usize> = HashMap::new();
        let mut spoken_seconds = 0.0f64;

        for segment in segments {
            spoken_seconds += (segment.end_seconds - segment.start_seconds).max(0.0);

            let words: Vec<String> = WORD_RE
                .find_iter(&segment.text)
                .map(|m| m.as_str().to_lowercase())
                .collect();
            word_count += words.len();

            for word in &words {
                char_count += word.len();
                if FORMAL_KEYWORDS.contains(&word.as_str()) {
                    formal_hits += 1;
                } else if INFORMAL_KEYWORDS.contains(&word.as_str()) {
                    informal_hits += 1;
                }
            }

            for pair in words.windows(2) {
                let bigram = format!("{} {}", pair[0], pair[1]);
                *bigram_counts.entry(bigram).or_insert(0) += 1;
            }
        }

        let segment_count = segments.len().max(1) as f32;
        let avg_segment_length = word_count as f32 / segment_count;

        let speech_rate_wpm = if spoken_seconds > 0.0 {
            word_count as f32 / (spoken_seconds as f32 / 60.0)
        } else {
            0.0
        };

        let marker_hits = formal_hits + informal_hits;
        let formality_score = if marker_hits > 0 {
            formal_hits as f32 / marker_hits as f32
        } else {
            0.5
        };

        let vocabulary_complexity = if word_count > 0 {
            (char_count as f32 / word_count as f32 / 10.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Repeated bigrams only, most frequent first, alphabetical on ties
        let mut repeated: Vec<(String, usize)> = bigram_counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .collect();
        repeated.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let common_phrases = repeated
            .into_iter()
            .take(MAX_COMMON_PHRASES)
            .map(|(phrase, _)| phrase)
            .collect();

        BehavioralFeatures {
            avg_segment_length,
            speech_rate_wpm,
            formality_score,
            vocabulary_complexity,
            common_phrases,
        }
    }

    /// Similarity between two feature sets: the plain average of whichever
    /// of the four component similarities are computable. Rate similarity is
    /// omitted when either rate is zero.
    pub fn similarity(a: &BehavioralFeatures, b: &BehavioralFeatures) -> f32 {
        let mut components = Vec::with_capacity(4);

        if a.speech_rate_wpm > 0.0 && b.speech_rate_wpm > 0.0 {
            let max_rate = a.speech_rate_wpm.max(b.speech_rate_wpm);
            components.push(1.0 - (a.speech_rate_wpm - b.speech_rate_wpm).abs() / max_rate);
        }

        components.push(1.0 - (a.formality_score - b.formality_score).abs());
        components.push(1.0 - (a.vocabulary_complexity - b.vocabulary_complexity).abs());
        components.push(phrase_similarity(&a.common_phrases, &b.common_phrases));

        components.iter().sum::<f32>() / components.len() as f32
    }

    /// Fold one observation into the stored pattern for `name`, creating the
    /// pattern on first sight. Streaming update: the running averages move
    /// toward the new observation in place.
    pub fn observe(&mut self, name: &str, segments: &[TranscriptSegment], confidence: f32) {
        let features = Self::extract_features(segments);

        match self.patterns.get_mut(name) {
            Some(pattern) => {
                let count = pattern.usage_count;
                let policy = UpdatePolicy::Streaming;
                let stored = &mut pattern.features;
                stored.avg_segment_length =
                    policy.fold_scalar(stored.avg_segment_length, count, features.avg_segment_length);
                stored.speech_rate_wpm =
                    policy.fold_scalar(stored.speech_rate_wpm, count, features.speech_rate_wpm);
                stored.formality_score =
                    policy.fold_scalar(stored.formality_score, count, features.formality_score);
                stored.vocabulary_complexity = policy.fold_scalar(
                    stored.vocabulary_complexity,
                    count,
                    features.vocabulary_complexity,
                );
                merge_phrases(&mut stored.common_phrases, &features.common_phrases);

                pattern.usage_count += 1;
                pattern.confidence_history.push(confidence);
                debug!(
                    "Updated behavioral pattern for '{}' ({} observations)",
                    name, pattern.usage_count
                );
            }
            None => {
                info!("Creating behavioral pattern for '{}'", name);
                self.patterns.insert(
                    name.to_string(),
                    BehavioralPattern {
                        name: name.to_string(),
                        features,
                        usage_count: 1,
                        confidence_history: vec![confidence],
                    },
                );
            }
        }
    }

    /// Best-matching stored pattern at or above the threshold.
    pub fn best_match(
        &self,
        features: &BehavioralFeatures,
        threshold: f32,
    ) -> Option<(&BehavioralPattern, f32)> {
        let mut best: Option<(&BehavioralPattern, f32)> = None;
        // Name order makes equal scores resolve deterministically
        let mut names: Vec<&String> = self.patterns.keys().collect();
        names.sort();

        for name in names {
            let pattern = &self.patterns[name];
            let score = Self::similarity(features, &pattern.features);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((pattern, score));
            }
        }
        best
    }

    pub fn pattern(&self, name: &str) -> Option<&BehavioralPattern> {
        self.patterns.get(name)
    }

    /// Append a confidence observation without new transcript evidence.
    /// Used by correction learning to bias a pattern toward a user-confirmed
    /// identity.
    pub fn reinforce(&mut self, name: &str, confidence: f32) -> bool {
        match self.patterns.get_mut(name) {
            Some(pattern) => {
                pattern.confidence_history.push(confidence);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Jaccard similarity over phrase sets. Both empty: 1.0 (vacuously alike);
/// exactly one empty: 0.0.
pub fn phrase_similarity(a: &[String], b: &[String]) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.iter().filter(|phrase| b.contains(phrase)).count();
    let union = a.len() + b.len() - intersection;
    intersection as f32 / union as f32
}

/// Merge newly seen phrases into the stored list, keeping existing entries
/// first and capping at the phrase limit.
fn merge_phrases(stored: &mut Vec<String>, incoming: &[String]) {
    for phrase in incoming {
        if !stored.contains(phrase) {
            stored.push(phrase.clone());
        }
    }
    stored.truncate(MAX_COMMON_PHRASES);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(text: &str, start: f64, end: f64) -> TranscriptSegment {
        TranscriptSegment {
            text: text.to_string(),
            start_seconds: start,
            end_seconds: end,
        }
    }

    #[test]
    fn test_extract_features_counts() {
        let segments = vec![
            segment("the quarterly report is due", 0.0, 2.0),
            segment("the quarterly report looks good", 2.0, 4.0),
        ];
        let features = BehavioralPatternMatcher::extract_features(&segments);

        assert!((features.avg_segment_length - 5.0).abs() < 1e-6);
        // 10 words over 4 seconds = 150 wpm
        assert!((features.speech_rate_wpm - 150.0).abs() < 0.5);
        assert!(features.common_phrases.contains(&"the quarterly".to_string()));
        assert!(features.common_phrases.contains(&"quarterly report".to_string()));
    }

    #[test]
    fn test_formality_score() {
        let formal = BehavioralPatternMatcher::extract_features(&[segment(
            "therefore we shall proceed accordingly",
            0.0,
            3.0,
        )]);
        assert!((formal.formality_score - 1.0).abs() < 1e-6);

        let informal = BehavioralPatternMatcher::extract_features(&[segment(
            "yeah that stuff is kinda cool",
            0.0,
            3.0,
        )]);
        assert_eq!(informal.formality_score, 0.0);

        let neutral = BehavioralPatternMatcher::extract_features(&[segment(
            "the meeting starts at noon",
            0.0,
            3.0,
        )]);
        assert_eq!(neutral.formality_score, 0.5);
    }

    #[test]
    fn test_vocabulary_complexity_clamped() {
        let features = BehavioralPatternMatcher::extract_features(&[segment(
            "extraordinarily incomprehensible pseudointellectual",
            0.0,
            2.0,
        )]);
        assert!(features.vocabulary_complexity <= 1.0);
        assert!(features.vocabulary_complexity > 0.5);
    }

    #[test]
    fn test_phrase_similarity_edge_cases() {
        let empty: Vec<String> = vec![];
        let some = vec!["you know".to_string()];
        assert_eq!(phrase_similarity(&empty, &empty), 1.0);
        assert_eq!(phrase_similarity(&empty, &some), 0.0);
        assert_eq!(phrase_similarity(&some, &empty), 0.0);
        assert_eq!(phrase_similarity(&some, &some.clone()), 1.0);
    }

    #[test]
    fn test_similarity_omits_zero_rates() {
        let mut a = BehavioralPatternMatcher::extract_features(&[segment("hello world", 0.0, 1.0)]);
        let mut b = a.clone();
        a.speech_rate_wpm = 0.0;
        b.speech_rate_wpm = 120.0;
        // Rate component omitted; remaining components are identical
        assert!((BehavioralPatternMatcher::similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_identical_features() {
        let features = BehavioralPatternMatcher::extract_features(&[
            segment("we should review the budget review the budget", 0.0, 4.0),
        ]);
        assert!((BehavioralPatternMatcher::similarity(&features, &features) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_observe_streams_into_running_average() {
        let mut matcher = BehavioralPatternMatcher::new();
        matcher.observe("alice", &[segment("one two three four", 0.0, 2.0)], 0.8);
        matcher.observe("alice", &[segment("one two", 0.0, 2.0)], 0.9);

        let pattern = matcher.pattern("alice").unwrap();
        assert_eq!(pattern.usage_count, 2);
        // Running mean of 4 and 2 words per segment
        assert!((pattern.features.avg_segment_length - 3.0).abs() < 1e-6);
        assert_eq!(pattern.confidence_history, vec![0.8, 0.9]);
    }

    #[test]
    fn test_best_match_threshold() {
        let mut matcher = BehavioralPatternMatcher::new();
        let segments = vec![segment("yeah okay cool stuff you know you know", 0.0, 3.0)];
        matcher.observe("casual", &segments, 0.9);

        let features = BehavioralPatternMatcher::extract_features(&segments);
        let (pattern, score) = matcher.best_match(&features, 0.9).unwrap();
        assert_eq!(pattern.name, "casual");
        assert!(score >= 0.9);

        let formal = BehavioralPatternMatcher::extract_features(&[segment(
            "therefore the committee shall reconvene therefore the committee",
            0.0,
            10.0,
        )]);
        assert!(matcher.best_match(&formal, 0.99).is_none());
    }

    #[test]
    fn test_reinforce_only_existing_patterns() {
        let mut matcher = BehavioralPatternMatcher::new();
        assert!(!matcher.reinforce("ghost", 0.9));

        matcher.observe("alice", &[segment("hello there", 0.0, 1.0)], 0.5);
        assert!(matcher.reinforce("alice", 0.9));
        assert_eq!(
            matcher.pattern("alice").unwrap().confidence_history,
            vec![0.5, 0.9]
        );
    }
}
