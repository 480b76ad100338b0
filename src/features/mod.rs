// Fingerprint extraction
// Pluggable extractor trait plus a concrete statistical extractor that
// produces the three DSP modalities. Deep-embedding modalities come from
// external model backends implementing the same trait.

mod spectral;

pub use spectral::{hann_window, mel_filterbank, power_spectrogram};

use anyhow::Result;
use log::debug;

use crate::error::IdentityError;
use crate::identity::{Fingerprint, Modality};

/// Produces a multi-modal fingerprint from raw audio.
///
/// Implementations must be pure (no hidden state mutation) and safe under
/// concurrent invocation even when backed by a shared model session.
pub trait FingerprintExtractor: Send + Sync {
    fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint>;
}

/// FFT size for the statistical modalities.
const N_FFT: usize = 512;
/// Hop between analysis frames in samples.
const HOP_LENGTH: usize = 160;
/// Mel bands for the mfcc-stats modality.
const N_MELS: usize = 24;
/// Guard added before taking logs of mel energies.
const LOG_GUARD: f32 = 1e-10;
/// Pitch search range in Hz for the prosodic modality.
const PITCH_MIN_HZ: f32 = 60.0;
const PITCH_MAX_HZ: f32 = 400.0;
/// Minimum normalized autocorrelation peak to call a frame voiced.
const VOICING_THRESHOLD: f32 = 0.3;

/// Statistical fingerprint extractor: mel-band statistics, spectral shape
/// statistics and prosody statistics from plain DSP. Produces no deep
/// embeddings; galleries enrolled with embedding-capable extractors still
/// compare against its output through the partial-match policy.
#[derive(Debug, Default)]
pub struct SpectralStatsExtractor;

impl SpectralStatsExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl FingerprintExtractor for SpectralStatsExtractor {
    fn extract(&self, samples: &[f32], sample_rate: u32) -> Result<Fingerprint> {
        if samples.len() < N_FFT {
            return Err(IdentityError::AudioTooShort {
                min_samples: N_FFT,
                got: samples.len(),
            }
            .into());
        }

        let duration_seconds = samples.len() as f32 / sample_rate as f32;
        let mut fingerprint = Fingerprint::new(sample_rate, duration_seconds);

        let frames = power_spectrogram(samples, N_FFT, HOP_LENGTH);
        if frames.is_empty() {
            return Err(IdentityError::Extraction(
                "no analysis frames produced".to_string(),
            )
            .into());
        }

        fingerprint.insert(Modality::MfccStats, mel_stats(&frames, sample_rate));
        fingerprint.insert(Modality::Spectral, spectral_stats(&frames, sample_rate));
        fingerprint.insert(Modality::Prosodic, prosodic_stats(samples, sample_rate));

        debug!(
            "Extracted {} modalities from {:.2}s of audio",
            fingerprint.modality_count(),
            duration_seconds
        );
        Ok(fingerprint)
    }
}

/// Per-mel-band log-energy mean and standard deviation across frames.
fn mel_stats(frames: &[Vec<f32>], sample_rate: u32) -> Vec<f32> {
    let filterbank = mel_filterbank(N_MELS, N_FFT, sample_rate);
    let num_frames = frames.len() as f32;

    // Log mel energy per band per frame
    let mut band_frames = vec![Vec::with_capacity(frames.len()); N_MELS];
    for frame in frames {
        for (band, filter) in filterbank.iter().enumerate() {
            let energy: f32 = filter
                .iter()
                .zip(frame.iter())
                .map(|(w, p)| w * p)
                .sum();
            band_frames[band].push((energy + LOG_GUARD).ln());
        }
    }

    let mut stats = Vec::with_capacity(N_MELS * 2);
    let mut stds = Vec::with_capacity(N_MELS);
    for band in &band_frames {
        let mean: f32 = band.iter().sum::<f32>() / num_frames;
        let variance: f32 = band.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / num_frames;
        stats.push(mean);
        stds.push(variance.sqrt());
    }
    stats.extend(stds);
    stats
}

/// Spectral shape statistics: centroid, rolloff, flux and rms, each as
/// mean and standard deviation across frames. Frequencies are normalized
/// by Nyquist so the vector stays in a comparable range across rates.
fn spectral_stats(frames: &[Vec<f32>], sample_rate: u32) -> Vec<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    let freq_bins = frames[0].len();
    let bin_hz = nyquist / (freq_bins.saturating_sub(1).max(1)) as f32;

    let mut centroids = Vec::with_capacity(frames.len());
    let mut rolloffs = Vec::with_capacity(frames.len());
    let mut fluxes = Vec::with_capacity(frames.len());
    let mut rms_values = Vec::with_capacity(frames.len());

    let mut prev_frame: Option<&Vec<f32>> = None;
    for frame in frames {
        let total: f32 = frame.iter().sum();

        let centroid = if total > 0.0 {
            let weighted: f32 = frame
                .iter()
                .enumerate()
                .map(|(k, p)| k as f32 * bin_hz * p)
                .sum();
            weighted / total / nyquist
        } else {
            0.0
        };
        centroids.push(centroid);

        // 85% spectral rolloff
        let mut cumulative = 0.0;
        let mut rolloff = 0.0;
        for (k, p) in frame.iter().enumerate() {
            cumulative += p;
            if total > 0.0 && cumulative >= 0.85 * total {
                rolloff = k as f32 * bin_hz / nyquist;
                break;
            }
        }
        rolloffs.push(rolloff);

        let flux = match prev_frame {
            Some(prev) => frame
                .iter()
                .zip(prev.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f32>()
                .sqrt(),
            None => 0.0,
        };
        fluxes.push(flux);
        prev_frame = Some(frame);

        rms_values.push((total / freq_bins as f32).sqrt());
    }

    let mut stats = Vec::with_capacity(8);
    for series in [&centroids, &rolloffs, &fluxes, &rms_values] {
        let (mean, std) = mean_std(series);
        stats.push(mean);
        stats.push(std);
    }
    stats
}

/// Prosody statistics from the time domain: pitch contour via frame-wise
/// autocorrelation, voicing ratio, energy contour and zero-crossing rate.
fn prosodic_stats(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let frame_len = N_FFT;
    let min_lag = (sample_rate as f32 / PITCH_MAX_HZ) as usize;
    let max_lag = ((sample_rate as f32 / PITCH_MIN_HZ) as usize).min(frame_len - 1);

    let mut pitches = Vec::new();
    let mut energies = Vec::new();
    let mut zcrs = Vec::new();
    let mut voiced_frames = 0usize;
    let mut total_frames = 0usize;

    let mut start = 0;
    while start + frame_len <= samples.len() {
        let frame = &samples[start..start + frame_len];
        total_frames += 1;

        let energy: f32 = frame.iter().map(|s| s * s).sum::<f32>() / frame_len as f32;
        energies.push(energy.sqrt());

        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        zcrs.push(crossings as f32 / frame_len as f32);

        if let Some(pitch) = autocorrelation_pitch(frame, sample_rate, min_lag, max_lag) {
            voiced_frames += 1;
            pitches.push(pitch / PITCH_MAX_HZ);
        }

        start += HOP_LENGTH * 2;
    }

    if total_frames == 0 {
        return Vec::new();
    }

    let (pitch_mean, pitch_std) = mean_std(&pitches);
    let (energy_mean, energy_std) = mean_std(&energies);
    let (zcr_mean, _) = mean_std(&zcrs);
    let voiced_ratio = voiced_frames as f32 / total_frames as f32;

    vec![
        pitch_mean,
        pitch_std,
        voiced_ratio,
        energy_mean,
        energy_std,
        zcr_mean,
    ]
}

/// Dominant pitch of a frame via normalized autocorrelation, or None for
/// unvoiced/silent frames.
fn autocorrelation_pitch(
    frame: &[f32],
    sample_rate: u32,
    min_lag: usize,
    max_lag: usize,
) -> Option<f32> {
    let energy: f32 = frame.iter().map(|s| s * s).sum();
    if energy <= f32::EPSILON || min_lag >= max_lag {
        return None;
    }

    let mut best_lag = 0usize;
    let mut best_value = 0.0f32;
    for lag in min_lag..=max_lag {
        let corr: f32 = frame[..frame.len() - lag]
            .iter()
            .zip(frame[lag..].iter())
            .map(|(a, b)| a * b)
            .sum();
        let normalized = corr / energy;
        if normalized > best_value {
            best_value = normalized;
            best_lag = lag;
        }
    }

    if best_value >= VOICING_THRESHOLD && best_lag > 0 {
        Some(sample_rate as f32 / best_lag as f32)
    } else {
        None
    }
}

fn mean_std(values: &[f32]) -> (f32, f32) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_wave(freq: f32, seconds: f32, sample_rate: u32) -> Vec<f32> {
        let count = (seconds * sample_rate as f32) as usize;
        (0..count)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_extract_produces_all_statistical_modalities() {
        let audio = sine_wave(220.0, 1.0, 16000);
        let extractor = SpectralStatsExtractor::new();
        let fp = extractor.extract(&audio, 16000).unwrap();

        assert!(fp.vector(Modality::MfccStats).is_some());
        assert!(fp.vector(Modality::Spectral).is_some());
        assert!(fp.vector(Modality::Prosodic).is_some());
        assert!(fp.vector(Modality::EmbeddingWespeaker).is_none());
        assert_eq!(fp.sample_rate, 16000);
        assert!((fp.duration_seconds - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let audio = sine_wave(150.0, 0.6, 16000);
        let extractor = SpectralStatsExtractor::new();
        let a = extractor.extract(&audio, 16000).unwrap();
        let b = extractor.extract(&audio, 16000).unwrap();
        for modality in Modality::ALL {
            assert_eq!(a.vector(modality), b.vector(modality));
        }
    }

    #[test]
    fn test_too_short_audio_rejected() {
        let extractor = SpectralStatsExtractor::new();
        let err = extractor.extract(&[0.0; 100], 16000).unwrap_err();
        assert!(err.downcast_ref::<IdentityError>().is_some());
    }

    #[test]
    fn test_pitch_detection_on_pure_tone() {
        let sample_rate = 16000;
        let audio = sine_wave(200.0, 0.2, sample_rate);
        let min_lag = (sample_rate as f32 / PITCH_MAX_HZ) as usize;
        let max_lag = (sample_rate as f32 / PITCH_MIN_HZ) as usize;
        let pitch =
            autocorrelation_pitch(&audio[..N_FFT], sample_rate, min_lag, max_lag).unwrap();
        assert!((pitch - 200.0).abs() < 20.0, "pitch was {pitch}");
    }

    #[test]
    fn test_mel_stats_dimension() {
        let audio = sine_wave(300.0, 0.5, 16000);
        let frames = power_spectrogram(&audio, N_FFT, HOP_LENGTH);
        let stats = mel_stats(&frames, 16000);
        assert_eq!(stats.len(), N_MELS * 2);
    }
}
