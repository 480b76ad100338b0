// Cross-recording consistency analysis
// Given finalized name assignments across recordings, finds names that
// recur and diarizer speaker ids with a stable majority name.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Confidence cap for recurrence suggestions.
const MAX_SUGGESTION_CONFIDENCE: f32 = 0.9;
/// Confidence gained per recording a name appears in.
const CONFIDENCE_PER_OCCURRENCE: f32 = 0.2;
/// A speaker id maps to a name only when that name holds more than this
/// share of the id's observations.
const MAJORITY_SHARE: f32 = 0.6;

/// Finalized speaker-name assignments for one recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingAssignments {
    pub recording_id: String,
    /// Diarizer speaker id (e.g. "speaker_0") to assigned display name
    pub assignments: HashMap<String, String>,
}

/// A name that recurs across recordings, with a suggestion confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencySuggestion {
    pub name: String,
    /// Number of recordings the name appears in
    pub occurrences: usize,
    /// `min(0.9, occurrences * 0.2)`
    pub confidence: f32,
}

/// Names appearing in more than one recording, sorted by confidence then
/// name for a deterministic order.
pub fn consistent_names(recordings: &[RecordingAssignments]) -> Vec<ConsistencySuggestion> {
    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for recording in recordings {
        // A name counts once per recording however many ids carry it
        let unique: HashSet<&str> = recording.assignments.values().map(String::as_str).collect();
        for name in unique {
            *occurrences.entry(name).or_insert(0) += 1;
        }
    }

    let mut suggestions: Vec<ConsistencySuggestion> = occurrences
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, count)| ConsistencySuggestion {
            name: name.to_string(),
            occurrences: count,
            confidence: MAX_SUGGESTION_CONFIDENCE
                .min(count as f32 * CONFIDENCE_PER_OCCURRENCE),
        })
        .collect();

    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    suggestions
}

/// Stable diarizer-id to name mappings across recordings.
///
/// An id maps to a name only when that name holds a strict majority share
/// above 0.6 of the id's observations AND occurs more than once.
pub fn stable_speaker_mapping(recordings: &[RecordingAssignments]) -> HashMap<String, String> {
    let mut by_id: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    for recording in recordings {
        for (speaker_id, name) in &recording.assignments {
            *by_id
                .entry(speaker_id.as_str())
                .or_default()
                .entry(name.as_str())
                .or_insert(0) += 1;
        }
    }

    let mut mapping = HashMap::new();
    for (speaker_id, names) in by_id {
        let total: usize = names.values().sum();
        let Some((majority_name, majority_count)) = names
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        else {
            continue;
        };

        let share = majority_count as f32 / total as f32;
        if share > MAJORITY_SHARE && majority_count > 1 {
            debug!(
                "Stable mapping {} -> {} (share {:.2} over {} observations)",
                speaker_id, majority_name, share, total
            );
            mapping.insert(speaker_id.to_string(), majority_name.to_string());
        }
    }
    mapping
}
