// Accuracy evaluation
// Runs labeled verification cases through the engine and reports standard
// biometric metrics (FAR / FRR / EER), plus extraction consistency and
// latency benchmarks.

use anyhow::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::enrollment::{AudioClip, EnrollmentManager, MergePolicy};
use crate::features::FingerprintExtractor;
use crate::fusion::SimilarityFusionEngine;
use crate::identity::Modality;
use crate::segments::{DiarizedSegment, SegmentAggregator};
use crate::store::{FingerprintStore, MemoryStore};
use crate::verification::VerificationEngine;

/// Default number of repeat extractions for consistency testing.
pub const DEFAULT_CONSISTENCY_RUNS: usize = 5;

/// Default clip lengths for latency benchmarking, in seconds.
pub const DEFAULT_BENCHMARK_LENGTHS: [f32; 4] = [5.0, 10.0, 15.0, 30.0];

/// One labeled verification test case.
#[derive(Debug, Clone)]
pub struct EvaluationCase {
    pub case_id: String,
    /// Identity to enroll (or reuse) and verify against
    pub claimed_name: String,
    pub enrollment_sample: Vec<f32>,
    pub test_sample: Vec<f32>,
    pub sample_rate: u32,
    /// Ground truth: does the test sample belong to the claimed identity
    pub expected_same_speaker: bool,
    /// When present, verification runs segment-aggregated instead of
    /// whole-clip
    pub test_segments: Option<Vec<DiarizedSegment>>,
}

/// Outcome of one evaluated case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub case_id: String,
    pub expected_same_speaker: bool,
    pub predicted_match: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: u32,
    pub true_negatives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
}

impl ConfusionCounts {
    pub fn total(&self) -> u32 {
        self.true_positives + self.true_negatives + self.false_positives + self.false_negatives
    }
}

/// Aggregated accuracy metrics for one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub accuracy: f32,
    /// False acceptance rate: impostors wrongly accepted, FP / (FP + TN)
    pub far: f32,
    /// False rejection rate: genuine subjects wrongly rejected, FN / (FN + TP)
    pub frr: f32,
    /// Equal error rate from an ROC-style threshold sweep
    pub eer: f32,
    /// Threshold at which the EER was observed
    pub eer_threshold: f32,
    pub confusion: ConfusionCounts,
    pub cases: Vec<CaseOutcome>,
    /// Cases excluded because enrollment or test extraction failed
    pub skipped_cases: u32,
}

/// Per-modality consistency of repeated extraction on identical audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityConsistency {
    pub modality: Modality,
    /// Runs in which the modality was produced with a consistent length
    pub runs_present: usize,
    pub dimensions: usize,
    /// `1 - mean(stddev across runs)` per dimension. Not guaranteed to stay
    /// in [0, 1] for large-magnitude features; reported as-is.
    pub consistency_score: f32,
}

/// Result of repeat-extraction consistency testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub runs: usize,
    pub mean_extraction_ms: f64,
    pub std_extraction_ms: f64,
    pub min_extraction_ms: f64,
    pub max_extraction_ms: f64,
    pub per_modality: Vec<ModalityConsistency>,
}

/// Extraction timing for one candidate clip length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyBenchmark {
    pub segment_seconds: f32,
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Average number of modalities successfully produced per run
    pub avg_modalities: f32,
}

/// Drives evaluation runs against a fresh in-memory gallery.
pub struct AccuracyEvaluator {
    extractor: Arc<dyn FingerprintExtractor>,
}

impl AccuracyEvaluator {
    pub fn new(extractor: Arc<dyn FingerprintExtractor>) -> Self {
        Self { extractor }
    }

    /// Evaluate labeled cases at one decision threshold.
    ///
    /// Each case enrolls (or reuses) its claimed identity in a gallery
    /// private to this run, verifies the test sample, and lands in the
    /// confusion counts. Cases whose enrollment or test extraction fails
    /// are logged and excluded from every denominator.
    pub fn evaluate(&self, cases: &[EvaluationCase], threshold: f32) -> Result<AccuracyReport> {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let enrollment = EnrollmentManager::new(store.clone(), self.extractor.clone());
        let verifier =
            VerificationEngine::new(store.clone(), SimilarityFusionEngine::new());
        let aggregator = SegmentAggregator::new(
            self.extractor.clone(),
            VerificationEngine::new(store.clone(), SimilarityFusionEngine::new()),
        );

        let mut outcomes = Vec::with_capacity(cases.len());
        let mut confusion = ConfusionCounts::default();
        let mut skipped = 0u32;

        for case in cases {
            if store.get_by_name(&case.claimed_name)?.is_none() {
                let clip = AudioClip {
                    samples: &case.enrollment_sample,
                    sample_rate: case.sample_rate,
                };
                if let Err(e) =
                    enrollment.enroll_audio(&case.claimed_name, &[clip], MergePolicy::Replace)
                {
                    warn!(
                        "Excluding case '{}': enrollment of '{}' failed: {}",
                        case.case_id, case.claimed_name, e
                    );
                    skipped += 1;
                    continue;
                }
            }

            let (predicted_match, confidence) = match &case.test_segments {
                Some(segments) => {
                    let result = aggregator.verify_segments(
                        &case.test_sample,
                        case.sample_rate,
                        segments,
                        &case.claimed_name,
                        threshold,
                        &CancellationToken::new(),
                    )?;
                    (result.is_match, result.avg_confidence)
                }
                None => {
                    let fingerprint =
                        match self.extractor.extract(&case.test_sample, case.sample_rate) {
                            Ok(fp) => fp,
                            Err(e) => {
                                warn!(
                                    "Excluding case '{}': test extraction failed: {}",
                                    case.case_id, e
                                );
                                skipped += 1;
                                continue;
                            }
                        };
                    let result = verifier.verify(&fingerprint, &case.claimed_name, threshold)?;
                    (result.is_match, result.confidence)
                }
            };

            match (case.expected_same_speaker, predicted_match) {
                (true, true) => confusion.true_positives += 1,
                (true, false) => confusion.false_negatives += 1,
                (false, true) => confusion.false_positives += 1,
                (false, false) => confusion.true_negatives += 1,
            }

            outcomes.push(CaseOutcome {
                case_id: case.case_id.clone(),
                expected_same_speaker: case.expected_same_speaker,
                predicted_match,
                confidence,
            });
        }

        let total = confusion.total();
        let accuracy = if total > 0 {
            (confusion.true_positives + confusion.true_negatives) as f32 / total as f32
        } else {
            0.0
        };
        let far = ratio(
            confusion.false_positives,
            confusion.false_positives + confusion.true_negatives,
        );
        let frr = ratio(
            confusion.false_negatives,
            confusion.false_negatives + confusion.true_positives,
        );

        let score_labels: Vec<(f32, bool)> = outcomes
            .iter()
            .map(|o| (o.confidence, o.expected_same_speaker))
            .collect();
        let (eer, eer_threshold) = compute_eer(&score_labels);

        info!(
            "Evaluation: {} cases ({} skipped), accuracy {:.3}, FAR {:.3}, FRR {:.3}, EER {:.3}",
            total, skipped, accuracy, far, frr, eer
        );

        Ok(AccuracyReport {
            accuracy,
            far,
            frr,
            eer,
            eer_threshold,
            confusion,
            cases: outcomes,
            skipped_cases: skipped,
        })
    }

    /// Extract fingerprints repeatedly from identical audio and report
    /// per-modality stability plus extraction latency statistics.
    pub fn consistency_test(
        &self,
        samples: &[f32],
        sample_rate: u32,
        runs: usize,
    ) -> Result<ConsistencyReport> {
        let runs = runs.max(1);
        let mut fingerprints = Vec::with_capacity(runs);
        let mut timings_ms = Vec::with_capacity(runs);

        for _ in 0..runs {
            let started = Instant::now();
            let fingerprint = self.extractor.extract(samples, sample_rate)?;
            timings_ms.push(started.elapsed().as_secs_f64() * 1000.0);
            fingerprints.push(fingerprint);
        }

        let mut per_modality = Vec::new();
        for modality in Modality::ALL {
            let vectors: Vec<&[f32]> = fingerprints
                .iter()
                .filter_map(|fp| fp.vector(modality))
                .collect();
            let Some(first) = vectors.first() else {
                continue;
            };
            let dimensions = first.len();
            let consistent: Vec<&[f32]> = vectors
                .into_iter()
                .filter(|v| v.len() == dimensions)
                .collect();

            // Mean per-dimension standard deviation across runs
            let mut stddev_sum = 0.0f64;
            for dim in 0..dimensions {
                let values: Vec<f64> = consistent.iter().map(|v| f64::from(v[dim])).collect();
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let variance =
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
                stddev_sum += variance.sqrt();
            }
            let mean_stddev = stddev_sum / dimensions as f64;

            per_modality.push(ModalityConsistency {
                modality,
                runs_present: consistent.len(),
                dimensions,
                consistency_score: (1.0 - mean_stddev) as f32,
            });
        }

        let (mean_ms, std_ms) = mean_std_f64(&timings_ms);
        Ok(ConsistencyReport {
            runs,
            mean_extraction_ms: mean_ms,
            std_extraction_ms: std_ms,
            min_extraction_ms: timings_ms.iter().copied().fold(f64::INFINITY, f64::min),
            max_extraction_ms: timings_ms.iter().copied().fold(0.0, f64::max),
            per_modality,
        })
    }

    /// Benchmark extraction latency across candidate clip lengths. Lengths
    /// the source buffer cannot cover are skipped with a warning.
    pub fn latency_benchmark(
        &self,
        samples: &[f32],
        sample_rate: u32,
        lengths_seconds: &[f32],
        runs: usize,
    ) -> Result<Vec<LatencyBenchmark>> {
        let runs = runs.max(1);
        let mut benchmarks = Vec::new();

        for &length in lengths_seconds {
            let needed = (length * sample_rate as f32) as usize;
            if needed == 0 || needed > samples.len() {
                warn!(
                    "Skipping {:.0}s benchmark: buffer holds only {:.1}s",
                    length,
                    samples.len() as f32 / sample_rate as f32
                );
                continue;
            }
            let clip = &samples[..needed];

            let mut timings_ms = Vec::with_capacity(runs);
            let mut modality_counts = Vec::with_capacity(runs);
            for _ in 0..runs {
                let started = Instant::now();
                match self.extractor.extract(clip, sample_rate) {
                    Ok(fp) => {
                        timings_ms.push(started.elapsed().as_secs_f64() * 1000.0);
                        modality_counts.push(fp.modality_count() as f32);
                    }
                    Err(e) => {
                        warn!("Benchmark extraction failed at {:.0}s: {}", length, e);
                        timings_ms.push(started.elapsed().as_secs_f64() * 1000.0);
                        modality_counts.push(0.0);
                    }
                }
            }

            let (mean_ms, std_ms) = mean_std_f64(&timings_ms);
            benchmarks.push(LatencyBenchmark {
                segment_seconds: length,
                mean_ms,
                std_ms,
                min_ms: timings_ms.iter().copied().fold(f64::INFINITY, f64::min),
                max_ms: timings_ms.iter().copied().fold(0.0, f64::max),
                avg_modalities: modality_counts.iter().sum::<f32>()
                    / modality_counts.len() as f32,
            });
        }

        Ok(benchmarks)
    }
}

/// Equal error rate from (confidence, genuine) pairs.
///
/// Sweeps every observed score as a decision threshold and picks the point
/// where false positive and false rejection rates meet; returns the mean of
/// the two at that point plus the threshold itself. Degenerate inputs (no
/// genuine or no impostor scores) report 0.0.
pub fn compute_eer(score_labels: &[(f32, bool)]) -> (f32, f32) {
    let genuine: Vec<f32> = score_labels
        .iter()
        .filter(|(_, label)| *label)
        .map(|(score, _)| *score)
        .collect();
    let impostor: Vec<f32> = score_labels
        .iter()
        .filter(|(_, label)| !*label)
        .map(|(score, _)| *score)
        .collect();

    if genuine.is_empty() || impostor.is_empty() {
        warn!("EER undefined without both genuine and impostor scores");
        return (0.0, 0.0);
    }

    let mut thresholds: Vec<f32> = score_labels.iter().map(|(score, _)| *score).collect();
    thresholds.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    thresholds.dedup();

    let mut best = (f32::INFINITY, 0.0f32, 0.0f32); // (gap, eer, threshold)
    for &threshold in &thresholds {
        let fpr = impostor.iter().filter(|&&s| s >= threshold).count() as f32
            / impostor.len() as f32;
        let frr =
            genuine.iter().filter(|&&s| s < threshold).count() as f32 / genuine.len() as f32;
        let gap = (fpr - frr).abs();
        if gap < best.0 {
            best = (gap, (fpr + frr) / 2.0, threshold);
        }
    }

    (best.1, best.2)
}

fn ratio(numerator: u32, denominator: u32) -> f32 {
    if denominator > 0 {
        numerator as f32 / denominator as f32
    } else {
        0.0
    }
}

fn mean_std_f64(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;

    /// Deterministic extractor: the fingerprint is driven entirely by the
    /// mean of the input samples, so same-speaker clips (same level) match
    /// perfectly and different-speaker clips diverge.
    struct LevelExtractor;

    impl FingerprintExtractor for LevelExtractor {
        fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint> {
            if samples.is_empty() {
                return Err(crate::error::IdentityError::AudioTooShort {
                    min_samples: 1,
                    got: 0,
                }
                .into());
            }
            let level = samples.iter().sum::<f32>() / samples.len() as f32;
            let mut fp =
                Fingerprint::new(sample_rate, samples.len() as f32 / sample_rate as f32);
            fp.insert(
                Modality::EmbeddingWespeaker,
                vec![level, (1.0 - level * level).max(0.0).sqrt()],
            );
            Ok(fp)
        }
    }

    fn case(
        id: &str,
        name: &str,
        enroll_level: f32,
        test_level: f32,
        expected: bool,
    ) -> EvaluationCase {
        EvaluationCase {
            case_id: id.to_string(),
            claimed_name: name.to_string(),
            enrollment_sample: vec![enroll_level; 160],
            test_sample: vec![test_level; 160],
            sample_rate: 16000,
            expected_same_speaker: expected,
            test_segments: None,
        }
    }

    #[test]
    fn test_perfectly_separable_run() {
        let evaluator = AccuracyEvaluator::new(Arc::new(LevelExtractor));
        let cases = vec![
            case("genuine-1", "alice", 0.9, 0.9, true),
            case("genuine-2", "bob", 0.2, 0.2, true),
            case("impostor-1", "alice", 0.9, -0.9, false),
            case("impostor-2", "bob", 0.2, -0.9, false),
        ];

        let report = evaluator.evaluate(&cases, 0.9).unwrap();
        assert_eq!(report.confusion.true_positives, 2);
        assert_eq!(report.confusion.true_negatives, 2);
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.far, 0.0);
        assert_eq!(report.frr, 0.0);
        assert_eq!(report.eer, 0.0);
        assert_eq!(report.skipped_cases, 0);
    }

    #[test]
    fn test_confusion_counts_conserved() {
        let evaluator = AccuracyEvaluator::new(Arc::new(LevelExtractor));
        let cases = vec![
            case("c1", "alice", 0.9, 0.9, true),
            case("c2", "alice", 0.9, 0.3, true),
            case("c3", "alice", 0.9, 0.88, false),
            case("c4", "alice", 0.9, -0.5, false),
            case("c5", "bob", 0.1, 0.1, true),
        ];

        let report = evaluator.evaluate(&cases, 0.8).unwrap();
        assert_eq!(report.confusion.total(), report.cases.len() as u32);
        assert_eq!(report.confusion.total() + report.skipped_cases, 5);
    }

    #[test]
    fn test_failed_enrollment_excluded_from_denominators() {
        let evaluator = AccuracyEvaluator::new(Arc::new(LevelExtractor));
        let mut bad = case("broken", "carol", 0.5, 0.5, true);
        bad.enrollment_sample = vec![]; // extraction will fail
        let cases = vec![bad, case("good", "alice", 0.9, 0.9, true)];

        let report = evaluator.evaluate(&cases, 0.5).unwrap();
        assert_eq!(report.skipped_cases, 1);
        assert_eq!(report.confusion.total(), 1);
        assert_eq!(report.accuracy, 1.0);
    }

    #[test]
    fn test_eer_perfectly_separable() {
        let scores = vec![(1.0, true), (1.0, true), (0.0, false), (0.0, false)];
        let (eer, _) = compute_eer(&scores);
        assert_eq!(eer, 0.0);
    }

    #[test]
    fn test_eer_fully_overlapping() {
        // Identical score distributions: no threshold separates them
        let scores = vec![(0.5, true), (0.5, false), (0.5, true), (0.5, false)];
        let (eer, _) = compute_eer(&scores);
        assert!((eer - 0.5).abs() <= 0.5);
        assert!(eer > 0.0);
    }

    #[test]
    fn test_eer_degenerate_inputs() {
        assert_eq!(compute_eer(&[]), (0.0, 0.0));
        assert_eq!(compute_eer(&[(0.9, true)]), (0.0, 0.0));
        assert_eq!(compute_eer(&[(0.1, false)]), (0.0, 0.0));
    }

    #[test]
    fn test_consistency_on_deterministic_extractor() {
        let evaluator = AccuracyEvaluator::new(Arc::new(LevelExtractor));
        let audio = vec![0.5f32; 16000];
        let report = evaluator
            .consistency_test(&audio, 16000, DEFAULT_CONSISTENCY_RUNS)
            .unwrap();

        assert_eq!(report.runs, 5);
        assert_eq!(report.per_modality.len(), 1);
        let modality = &report.per_modality[0];
        assert_eq!(modality.runs_present, 5);
        // Identical runs: zero stddev, perfect consistency
        assert!((modality.consistency_score - 1.0).abs() < 1e-6);
        assert!(report.min_extraction_ms <= report.max_extraction_ms);
    }

    #[test]
    fn test_latency_benchmark_skips_uncovered_lengths() {
        let evaluator = AccuracyEvaluator::new(Arc::new(LevelExtractor));
        // 12 seconds of audio covers 5s and 10s but not 15s or 30s
        let audio = vec![0.3f32; 16000 * 12];
        let benchmarks = evaluator
            .latency_benchmark(&audio, 16000, &DEFAULT_BENCHMARK_LENGTHS, 3)
            .unwrap();

        let lengths: Vec<f32> = benchmarks.iter().map(|b| b.segment_seconds).collect();
        assert_eq!(lengths, vec![5.0, 10.0]);
        for benchmark in &benchmarks {
            assert!((benchmark.avg_modalities - 1.0).abs() < 1e-6);
            assert!(benchmark.min_ms <= benchmark.max_ms);
        }
    }
}
