// Segment-level verification
// Slices diarized segments out of a raw buffer, verifies each one, and
// aggregates the per-segment decisions behind a dual gate.

use anyhow::Result;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::features::FingerprintExtractor;
use crate::identity::{SegmentDecision, SegmentVerificationResult};
use crate::verification::VerificationEngine;

/// Segments shorter than this are dropped before extraction.
pub const MIN_SEGMENT_SECONDS: f64 = 0.5;

/// Minimum fraction of segments that must individually match.
pub const MATCH_RATIO_GATE: f32 = 0.6;

/// One diarized segment against the backing audio buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizedSegment {
    /// Diarizer-assigned label (e.g. "speaker_0")
    pub speaker_label: String,
    /// Start time in seconds
    pub start_seconds: f64,
    /// End time in seconds
    pub end_seconds: f64,
}

/// Combines per-segment verification decisions into one overall decision.
pub struct SegmentAggregator {
    extractor: Arc<dyn FingerprintExtractor>,
    verifier: VerificationEngine,
    min_segment_seconds: f64,
    match_ratio_gate: f32,
}

impl SegmentAggregator {
    pub fn new(extractor: Arc<dyn FingerprintExtractor>, verifier: VerificationEngine) -> Self {
        Self {
            extractor,
            verifier,
            min_segment_seconds: MIN_SEGMENT_SECONDS,
            match_ratio_gate: MATCH_RATIO_GATE,
        }
    }

    pub fn with_gates(mut self, min_segment_seconds: f64, match_ratio_gate: f32) -> Self {
        self.min_segment_seconds = min_segment_seconds;
        self.match_ratio_gate = match_ratio_gate;
        self
    }

    /// Verify a claimed identity across diarized segments of one recording.
    ///
    /// Each segment is sliced as `[start*rate, end*rate)` clamped to the
    /// buffer, dropped when shorter than the minimum, fingerprinted and
    /// verified. The overall match requires BOTH gates: average confidence
    /// at or above `threshold` AND match ratio at or above the ratio gate.
    ///
    /// The loop checks `cancel` between segments; a cancelled run returns
    /// the partial aggregates flagged `is_complete = false` instead of
    /// erroring.
    pub fn verify_segments(
        &self,
        audio: &[f32],
        sample_rate: u32,
        segments: &[DiarizedSegment],
        claimed_name: &str,
        threshold: f32,
        cancel: &CancellationToken,
    ) -> Result<SegmentVerificationResult> {
        let mut per_segment = Vec::new();
        let mut cancelled = false;

        for (idx, segment) in segments.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(
                    "Segment verification for '{}' cancelled after {} of {} segments",
                    claimed_name,
                    idx,
                    segments.len()
                );
                cancelled = true;
                break;
            }

            let Some(slice) = slice_segment(audio, sample_rate, segment) else {
                debug!(
                    "Dropping segment {:.2}-{:.2}s (outside the audio buffer)",
                    segment.start_seconds, segment.end_seconds
                );
                continue;
            };
            if (slice.len() as f64) < self.min_segment_seconds * f64::from(sample_rate) {
                debug!(
                    "Dropping segment {:.2}-{:.2}s (shorter than {:.1}s after clamping)",
                    segment.start_seconds, segment.end_seconds, self.min_segment_seconds
                );
                continue;
            }

            let fingerprint = match self.extractor.extract(slice, sample_rate) {
                Ok(fp) => fp,
                Err(e) => {
                    warn!(
                        "Extraction failed for segment {:.2}-{:.2}s: {}",
                        segment.start_seconds, segment.end_seconds, e
                    );
                    continue;
                }
            };

            // Usage bookkeeping happens once per recording, not per segment
            let verdict = self
                .verifier
                .verify_without_usage(&fingerprint, claimed_name, threshold)?;
            per_segment.push(SegmentDecision {
                start_seconds: segment.start_seconds,
                end_seconds: segment.end_seconds,
                is_match: verdict.is_match,
                confidence: verdict.confidence,
            });
        }

        if per_segment.is_empty() {
            let reason = if cancelled { "cancelled" } else { "no_valid_segments" };
            return Ok(SegmentVerificationResult::no_match(reason, !cancelled));
        }

        let n = per_segment.len() as f32;
        let avg_confidence = per_segment.iter().map(|d| d.confidence).sum::<f32>() / n;
        let max_confidence = per_segment
            .iter()
            .map(|d| d.confidence)
            .fold(0.0f32, f32::max);
        let match_ratio = per_segment.iter().filter(|d| d.is_match).count() as f32 / n;

        // Both gates must pass; either one alone is not sufficient
        let is_match = avg_confidence >= threshold && match_ratio >= self.match_ratio_gate;

        if is_match {
            self.verifier.record_usage(claimed_name);
        }

        info!(
            "Segment verification for '{}': avg {:.3}, max {:.3}, ratio {:.2} over {} segments -> {}",
            claimed_name,
            avg_confidence,
            max_confidence,
            match_ratio,
            per_segment.len(),
            is_match
        );

        Ok(SegmentVerificationResult {
            is_match,
            avg_confidence,
            max_confidence,
            match_ratio,
            segments_evaluated: per_segment.len(),
            is_complete: !cancelled,
            reason: cancelled.then(|| "cancelled".to_string()),
            per_segment,
        })
    }
}

/// Slice `[start*rate, end*rate)` out of the buffer, clamped to its bounds.
/// Returns None for inverted or fully out-of-range segments.
fn slice_segment<'a>(
    audio: &'a [f32],
    sample_rate: u32,
    segment: &DiarizedSegment,
) -> Option<&'a [f32]> {
    let rate = f64::from(sample_rate);
    let start = ((segment.start_seconds * rate).max(0.0) as usize).min(audio.len());
    let end = ((segment.end_seconds * rate).max(0.0) as usize).min(audio.len());
    if end <= start {
        return None;
    }
    Some(&audio[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::SimilarityFusionEngine;
    use crate::identity::{Fingerprint, Modality, VoiceProfile};
    use crate::store::{FingerprintStore, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Extractor whose output confidence is driven by the first sample of
    /// the slice, so tests can script per-segment confidences directly.
    struct ScriptedExtractor;

    impl FingerprintExtractor for ScriptedExtractor {
        fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint> {
            let level = samples.first().copied().unwrap_or(0.0);
            let mut fp = Fingerprint::new(sample_rate, samples.len() as f32 / sample_rate as f32);
            // Confidence against the [1, 0] reference equals `level` by
            // construction: cos([level, sqrt(1-level^2)], [1, 0]) = level
            fp.insert(
                Modality::EmbeddingWespeaker,
                vec![level, (1.0 - level * level).max(0.0).sqrt()],
            );
            Ok(fp)
        }
    }

    fn aggregator_with_store(
        extractor: Arc<dyn FingerprintExtractor>,
    ) -> (Arc<MemoryStore>, SegmentAggregator) {
        crate::init_test_logging();
        let store = MemoryStore::new();
        let mut reference = Fingerprint::new(16000, 1.0);
        reference.insert(Modality::EmbeddingWespeaker, vec![1.0, 0.0]);
        store
            .upsert(VoiceProfile::new("alice", reference, 1))
            .unwrap();
        let store = Arc::new(store);
        let verifier = VerificationEngine::new(store.clone(), SimilarityFusionEngine::new());
        (store, SegmentAggregator::new(extractor, verifier))
    }

    fn aggregator() -> SegmentAggregator {
        aggregator_with_store(Arc::new(ScriptedExtractor)).1
    }

    /// Build one second of audio per confidence value, with segments
    /// covering each second.
    fn scripted_audio(confidences: &[f32], sample_rate: u32) -> (Vec<f32>, Vec<DiarizedSegment>) {
        let per_segment = sample_rate as usize;
        let mut audio = Vec::with_capacity(confidences.len() * per_segment);
        let mut segments = Vec::new();
        for (i, &c) in confidences.iter().enumerate() {
            audio.extend(std::iter::repeat(c).take(per_segment));
            segments.push(DiarizedSegment {
                speaker_label: "speaker_0".to_string(),
                start_seconds: i as f64,
                end_seconds: (i + 1) as f64,
            });
        }
        (audio, segments)
    }

    #[test]
    fn test_dual_gate_avg_passes_ratio_fails() {
        // avg = 0.42 >= 0.4 but ratio = 2/5 < 0.6: must be no-match
        let (audio, segments) = scripted_audio(&[0.9, 0.9, 0.1, 0.1, 0.1], 16000);
        let result = aggregator()
            .verify_segments(&audio, 16000, &segments, "alice", 0.4, &CancellationToken::new())
            .unwrap();

        assert!((result.avg_confidence - 0.42).abs() < 0.01);
        assert!((result.match_ratio - 0.4).abs() < 1e-6);
        assert!(!result.is_match);
        assert!(result.is_complete);
        assert_eq!(result.segments_evaluated, 5);
    }

    #[test]
    fn test_both_gates_pass() {
        let (audio, segments) = scripted_audio(&[0.9, 0.8, 0.85, 0.9], 16000);
        let result = aggregator()
            .verify_segments(&audio, 16000, &segments, "alice", 0.7, &CancellationToken::new())
            .unwrap();
        assert!(result.is_match);
        assert!((result.max_confidence - 0.9).abs() < 0.01);
    }

    #[test]
    fn test_short_segments_dropped() {
        let sample_rate = 16000;
        let audio = vec![0.9f32; sample_rate as usize * 2];
        let segments = vec![
            DiarizedSegment {
                speaker_label: "speaker_0".to_string(),
                start_seconds: 0.0,
                end_seconds: 0.2, // below the 0.5s minimum
            },
            DiarizedSegment {
                speaker_label: "speaker_0".to_string(),
                start_seconds: 0.5,
                end_seconds: 1.6,
            },
        ];
        let result = aggregator()
            .verify_segments(&audio, sample_rate, &segments, "alice", 0.5, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.segments_evaluated, 1);
    }

    #[test]
    fn test_out_of_range_segments_clamped() {
        let sample_rate = 16000;
        let audio = vec![0.9f32; sample_rate as usize];
        let segments = vec![DiarizedSegment {
            speaker_label: "speaker_0".to_string(),
            start_seconds: 0.2,
            end_seconds: 99.0, // clamps to buffer end
        }];
        let result = aggregator()
            .verify_segments(&audio, sample_rate, &segments, "alice", 0.5, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.segments_evaluated, 1);
    }

    #[test]
    fn test_no_valid_segments() {
        let audio = vec![0.9f32; 100];
        let segments = vec![DiarizedSegment {
            speaker_label: "speaker_0".to_string(),
            start_seconds: 5.0,
            end_seconds: 6.0, // beyond the buffer entirely
        }];
        let result = aggregator()
            .verify_segments(&audio, 16000, &segments, "alice", 0.5, &CancellationToken::new())
            .unwrap();
        assert!(!result.is_match);
        assert_eq!(result.reason.as_deref(), Some("no_valid_segments"));
        assert!(result.is_complete);
    }

    #[test]
    fn test_cancellation_returns_partial_result() {
        let (audio, segments) = scripted_audio(&[0.9, 0.9, 0.9], 16000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = aggregator()
            .verify_segments(&audio, 16000, &segments, "alice", 0.5, &cancel)
            .unwrap();
        assert!(!result.is_complete);
        assert_eq!(result.reason.as_deref(), Some("cancelled"));
        assert_eq!(result.segments_evaluated, 0);
        assert!(!result.is_match);
    }

    /// Cancels its own token after a fixed number of extractions, so the
    /// loop stops partway through a recording.
    struct CancelAfterExtractor {
        token: CancellationToken,
        remaining: AtomicUsize,
    }

    impl FingerprintExtractor for CancelAfterExtractor {
        fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint> {
            if self.remaining.fetch_sub(1, AtomicOrdering::SeqCst) == 1 {
                self.token.cancel();
            }
            ScriptedExtractor.extract(samples, sample_rate)
        }
    }

    #[test]
    fn test_mid_run_cancellation_keeps_processed_segments() {
        let (audio, segments) = scripted_audio(&[0.9, 0.9, 0.1, 0.1], 16000);
        let cancel = CancellationToken::new();
        let extractor = Arc::new(CancelAfterExtractor {
            token: cancel.clone(),
            remaining: AtomicUsize::new(2),
        });
        let (_store, aggregator) = aggregator_with_store(extractor);

        let result = aggregator
            .verify_segments(&audio, 16000, &segments, "alice", 0.5, &cancel)
            .unwrap();

        // Only the first two segments made it in before the cancel
        assert_eq!(result.segments_evaluated, 2);
        assert_eq!(result.per_segment.len(), 2);
        assert!(!result.is_complete);
        assert_eq!(result.reason.as_deref(), Some("cancelled"));
        // Aggregates reflect the processed prefix, not the full recording
        assert!((result.avg_confidence - 0.9).abs() < 0.01);
        assert!((result.match_ratio - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_usage_recorded_once_per_recording() {
        let (audio, segments) = scripted_audio(&[0.9, 0.9, 0.85, 0.9], 16000);
        let (store, aggregator) = aggregator_with_store(Arc::new(ScriptedExtractor));

        let result = aggregator
            .verify_segments(&audio, 16000, &segments, "alice", 0.5, &CancellationToken::new())
            .unwrap();
        assert!(result.is_match);
        assert_eq!(result.segments_evaluated, 4);

        // One overall match, one usage hit
        assert_eq!(store.get_by_name("alice").unwrap().unwrap().usage_count, 1);
    }

    #[test]
    fn test_no_usage_recorded_on_overall_no_match() {
        let (audio, segments) = scripted_audio(&[0.9, 0.1, 0.1, 0.1], 16000);
        let (store, aggregator) = aggregator_with_store(Arc::new(ScriptedExtractor));

        let result = aggregator
            .verify_segments(&audio, 16000, &segments, "alice", 0.5, &CancellationToken::new())
            .unwrap();
        assert!(!result.is_match);
        assert_eq!(store.get_by_name("alice").unwrap().unwrap().usage_count, 0);
    }
}
