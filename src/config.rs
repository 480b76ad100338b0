// Engine configuration
// Tunables for one processing run. Deliberately carries no default decision
// threshold: every decision API takes the threshold from the caller.

use serde::{Deserialize, Serialize};

use crate::evaluation::{DEFAULT_BENCHMARK_LENGTHS, DEFAULT_CONSISTENCY_RUNS};
use crate::segments::{MATCH_RATIO_GATE, MIN_SEGMENT_SECONDS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Segments shorter than this are dropped before extraction
    pub min_segment_seconds: f64,
    /// Minimum fraction of segments that must individually match
    pub match_ratio_gate: f32,
    /// Repeat extractions for consistency testing
    pub consistency_runs: usize,
    /// Clip lengths for latency benchmarking, in seconds
    pub benchmark_lengths_seconds: Vec<f32>,
    /// Profiles older than this many days are cleanup candidates
    pub retention_days: i64,
    /// ... but only when used fewer than this many times
    pub retention_min_usage: u32,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            min_segment_seconds: MIN_SEGMENT_SECONDS,
            match_ratio_gate: MATCH_RATIO_GATE,
            consistency_runs: DEFAULT_CONSISTENCY_RUNS,
            benchmark_lengths_seconds: DEFAULT_BENCHMARK_LENGTHS.to_vec(),
            retention_days: 90,
            retention_min_usage: 3,
        }
    }
}
