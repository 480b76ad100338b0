// Spectral analysis primitives - STFT and mel filterbank

use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Generate a Hann window of the given length.
pub fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / window_length as f32).cos())
        .collect()
}

/// Short-time power spectrogram.
///
/// Returns one power-spectrum frame (`n_fft / 2 + 1` bins) per hop. Audio
/// shorter than one window yields no frames.
pub fn power_spectrogram(audio: &[f32], n_fft: usize, hop_length: usize) -> Vec<Vec<f32>> {
    if audio.len() < n_fft {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let window = hann_window(n_fft);
    let freq_bins = n_fft / 2 + 1;

    let num_frames = (audio.len() - n_fft) / hop_length + 1;
    let mut frames = Vec::with_capacity(num_frames);

    for frame_idx in 0..num_frames {
        let start = frame_idx * hop_length;
        let mut buffer: Vec<Complex<f32>> = audio[start..start + n_fft]
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();

        fft.process(&mut buffer);

        let mut powers = Vec::with_capacity(freq_bins);
        for bin in buffer.iter().take(freq_bins) {
            let magnitude = bin.norm();
            powers.push(magnitude * magnitude);
        }
        frames.push(powers);
    }

    frames
}

/// Convert Hz to Mel scale (Slaney formula).
fn hz_to_mel_slaney(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f64).ln() / 27.0;

    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

/// Convert Mel to Hz scale (Slaney formula).
fn mel_to_hz_slaney(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = (6.4f64).ln() / 27.0;

    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        f_sp * mel
    }
}

/// Triangular mel filterbank covering 0 Hz to Nyquist.
///
/// Returns `n_mels` filters, each with `n_fft / 2 + 1` weights.
pub fn mel_filterbank(n_mels: usize, n_fft: usize, sample_rate: u32) -> Vec<Vec<f32>> {
    let freq_bins = n_fft / 2 + 1;
    let nyquist = f64::from(sample_rate) / 2.0;

    let fftfreqs: Vec<f64> = (0..freq_bins)
        .map(|k| k as f64 * f64::from(sample_rate) / n_fft as f64)
        .collect();

    let fmin_mel = hz_to_mel_slaney(0.0);
    let fmax_mel = hz_to_mel_slaney(nyquist);
    let mel_f: Vec<f64> = (0..=n_mels + 1)
        .map(|i| {
            let mel = fmin_mel + (fmax_mel - fmin_mel) * i as f64 / (n_mels + 1) as f64;
            mel_to_hz_slaney(mel)
        })
        .collect();

    let fdiff: Vec<f64> = mel_f.windows(2).map(|w| w[1] - w[0]).collect();

    let mut filterbank = vec![vec![0.0f32; freq_bins]; n_mels];
    for (i, filter) in filterbank.iter_mut().enumerate() {
        let enorm = 2.0 / (mel_f[i + 2] - mel_f[i]);
        for (k, weight) in filter.iter_mut().enumerate() {
            let lower = (fftfreqs[k] - mel_f[i]) / fdiff[i];
            let upper = (mel_f[i + 2] - fftfreqs[k]) / fdiff[i + 1];
            *weight = (0.0f64.max(lower.min(upper)) * enorm) as f32;
        }
    }

    filterbank
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_endpoints() {
        let window = hann_window(512);
        assert!(window[0].abs() < 1e-6);
        assert!((window[256] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_spectrogram_frame_count() {
        let audio = vec![0.1f32; 512 + 160 * 3];
        let frames = power_spectrogram(&audio, 512, 160);
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[0].len(), 257);
    }

    #[test]
    fn test_spectrogram_short_audio_empty() {
        let frames = power_spectrogram(&[0.0; 100], 512, 160);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_mel_round_trip() {
        for hz in [100.0, 440.0, 1000.0, 4000.0] {
            let back = mel_to_hz_slaney(hz_to_mel_slaney(hz));
            assert!((back - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn test_filterbank_shape() {
        let fb = mel_filterbank(24, 512, 16000);
        assert_eq!(fb.len(), 24);
        assert_eq!(fb[0].len(), 257);
        // Every filter carries some weight
        for filter in &fb {
            assert!(filter.iter().any(|&w| w > 0.0));
        }
    }
}
