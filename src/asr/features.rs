//! Log-mel filterbank frontend for the streaming recognizer.
//!
//! 16 kHz mono f32 PCM in, 80-bin log-mel frames out: 25 ms analysis window,
//! 10 ms hop, pre-emphasis, Hann window, 512-point real FFT, mel-warped
//! triangular filterbank, natural log with a small floor.

use anyhow::{bail, Result};
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Sample rate the recognizer expects.
pub const SAMPLE_RATE: usize = 16_000;
/// 25 ms analysis window.
pub const FRAME_LENGTH: usize = 400;
/// 10 ms hop.
pub const FRAME_SHIFT: usize = 160;
/// Mel bins per frame.
pub const NUM_BINS: usize = 80;

const FFT_SIZE: usize = 512;
const NUM_FFT_BINS: usize = FFT_SIZE / 2 + 1;
const PREEMPHASIS: f32 = 0.97;
const LOG_FLOOR: f32 = 1e-10;

fn hz_to_mel(hz: f32) -> f32 {
    1127.0 * (1.0 + hz / 700.0).ln()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * ((mel / 1127.0).exp() - 1.0)
}

/// Triangular mel filterbank as per-bin `(first_fft_bin, weights)` spans.
fn build_mel_banks() -> Vec<(usize, Vec<f32>)> {
    let nyquist = SAMPLE_RATE as f32 / 2.0;
    let mel_low = hz_to_mel(20.0);
    let mel_high = hz_to_mel(nyquist);
    let mel_step = (mel_high - mel_low) / (NUM_BINS + 1) as f32;
    let fft_bin_width = SAMPLE_RATE as f32 / FFT_SIZE as f32;

    (0..NUM_BINS)
        .map(|bin| {
            let left = mel_low + bin as f32 * mel_step;
            let center = left + mel_step;
            let right = center + mel_step;

            let mut first_bin = None;
            let mut weights = Vec::new();
            for fft_bin in 0..NUM_FFT_BINS {
                let mel = hz_to_mel(fft_bin as f32 * fft_bin_width);
                if mel <= left || mel >= right {
                    continue;
                }
                let weight = if mel <= center {
                    (mel - left) / (center - left)
                } else {
                    (right - mel) / (right - center)
                };
                first_bin.get_or_insert(fft_bin);
                weights.push(weight);
            }
            (first_bin.unwrap_or(0), weights)
        })
        .collect()
}

pub struct FbankExtractor {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mel_banks: Vec<(usize, Vec<f32>)>,
}

impl FbankExtractor {
    pub fn new() -> Self {
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(FFT_SIZE);
        let window = (0..FRAME_LENGTH)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (FRAME_LENGTH - 1) as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();
        Self {
            fft,
            window,
            mel_banks: build_mel_banks(),
        }
    }

    /// Number of frames `compute` will produce for `num_samples` of input.
    pub fn num_frames(num_samples: usize) -> usize {
        if num_samples < FRAME_LENGTH {
            0
        } else {
            (num_samples - FRAME_LENGTH) / FRAME_SHIFT + 1
        }
    }

    /// Compute log-mel features for `samples`.
    ///
    /// Returns `(features, num_frames)` with features laid out frame-major:
    /// `features[frame * NUM_BINS + bin]`.
    pub fn compute(&self, samples: &[f32]) -> Result<(Vec<f32>, usize)> {
        let num_frames = Self::num_frames(samples.len());
        if num_frames == 0 {
            bail!(
                "Need at least {} samples for one frame, got {}",
                FRAME_LENGTH,
                samples.len()
            );
        }

        let mut features = vec![0.0f32; num_frames * NUM_BINS];
        let mut fft_input = vec![0.0f32; FFT_SIZE];
        let mut fft_output = self.fft.make_output_vec();
        let mut power = vec![0.0f32; NUM_FFT_BINS];

        for frame in 0..num_frames {
            let start = frame * FRAME_SHIFT;
            let slice = &samples[start..start + FRAME_LENGTH];

            // Pre-emphasis + Hann window, zero-padded to the FFT size.
            fft_input[0] = slice[0] * (1.0 - PREEMPHASIS) * self.window[0];
            for i in 1..FRAME_LENGTH {
                fft_input[i] = (slice[i] - PREEMPHASIS * slice[i - 1]) * self.window[i];
            }
            for value in fft_input[FRAME_LENGTH..].iter_mut() {
                *value = 0.0;
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| anyhow::anyhow!("FFT failed: {e}"))?;

            for (bin, value) in fft_output.iter().enumerate() {
                power[bin] = value.norm_sqr();
            }

            let row = &mut features[frame * NUM_BINS..(frame + 1) * NUM_BINS];
            for (bin, (first, weights)) in self.mel_banks.iter().enumerate() {
                let energy: f32 = weights
                    .iter()
                    .zip(&power[*first..])
                    .map(|(w, p)| w * p)
                    .sum();
                row[bin] = energy.max(LOG_FLOOR).ln();
            }
        }

        Ok((features, num_frames))
    }
}

impl Default for FbankExtractor {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_frames_arithmetic() {
        assert_eq!(FbankExtractor::num_frames(0), 0);
        assert_eq!(FbankExtractor::num_frames(399), 0);
        assert_eq!(FbankExtractor::num_frames(400), 1);
        assert_eq!(FbankExtractor::num_frames(560), 2);
        assert_eq!(FbankExtractor::num_frames(16_000), 98);
    }

    #[test]
    fn test_too_short_input_is_an_error() {
        let extractor = FbankExtractor::new();
        assert!(extractor.compute(&[0.0; 100]).is_err());
    }

    #[test]
    fn test_feature_shape() {
        let extractor = FbankExtractor::new();
        let samples = vec![0.01f32; 1600]; // 100 ms
        let (features, num_frames) = extractor.compute(&samples).unwrap();
        assert_eq!(num_frames, FbankExtractor::num_frames(1600));
        assert_eq!(features.len(), num_frames * NUM_BINS);
    }

    #[test]
    fn test_silence_hits_the_log_floor() {
        let extractor = FbankExtractor::new();
        let (features, _) = extractor.compute(&vec![0.0f32; 800]).unwrap();
        let floor = LOG_FLOOR.ln();
        for &value in &features {
            assert!((value - floor).abs() < 1e-3, "got: {}", value);
        }
    }

    #[test]
    fn test_tone_concentrates_energy() {
        // A 1 kHz tone should put more energy near its mel bin than a
        // matched-amplitude 6 kHz tone does there.
        let extractor = FbankExtractor::new();
        let tone = |freq: f32| -> Vec<f32> {
            (0..1600)
                .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 16_000.0).sin())
                .collect()
        };
        let (low, _) = extractor.compute(&tone(1000.0)).unwrap();
        let (high, _) = extractor.compute(&tone(6000.0)).unwrap();

        let peak_bin = |features: &[f32]| -> usize {
            features[..NUM_BINS]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        assert!(peak_bin(&low) < peak_bin(&high));
    }

    #[test]
    fn test_deterministic() {
        let extractor = FbankExtractor::new();
        let samples: Vec<f32> = (0..1600).map(|i| ((i % 17) as f32 - 8.0) / 10.0).collect();
        let (a, _) = extractor.compute(&samples).unwrap();
        let (b, _) = extractor.compute(&samples).unwrap();
        assert_eq!(a, b);
    }
}
