//! Log-mel acoustic feature extraction.
//!
//! Converts a normalized sample buffer into the mean-normalized feature
//! matrix the inference models were trained on. Low-frame-rate model
//! families additionally stack consecutive frames via [`stack_frames`].

use ndarray::Array2;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

pub const FRAME_LENGTH: usize = 400;
pub const HOP_LENGTH: usize = 160;
pub const FFT_SIZE: usize = 512;
pub const NUM_MEL_BANDS: usize = 80;

const SAMPLE_RATE: f32 = 16_000.0;
const LOG_FLOOR: f32 = 1e-6;
const F_MIN: f32 = 0.0;
const F_MAX: f32 = 8_000.0;

/// Frame-stacking parameters for low-frame-rate model families.
#[derive(Debug, Clone, Copy)]
pub struct LfrConfig {
    /// Consecutive frames concatenated into one super-frame.
    pub window_size: usize,
    /// Stride between super-frame windows.
    pub window_shift: usize,
}

impl Default for LfrConfig {
    fn default() -> Self {
        Self {
            window_size: 7,
            window_shift: 6,
        }
    }
}

/// Log-mel extractor with precomputed DSP state.
///
/// The Hann window, mel filterbank, and FFT plan are computed once at
/// construction and reused for every call.
pub struct FeatureExtractor {
    window: Vec<f32>,
    filterbank: Array2<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        let window: Vec<f32> = (0..FRAME_LENGTH)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / FRAME_LENGTH as f32).cos()))
            .collect();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        Self {
            window,
            filterbank: mel_filterbank(NUM_MEL_BANDS, FFT_SIZE, SAMPLE_RATE, F_MIN, F_MAX),
            fft,
        }
    }

    /// Compute the mean-normalized log-mel feature matrix, one row per frame.
    ///
    /// Frames step by [`HOP_LENGTH`] and stop once a full frame no longer
    /// fits, so inputs shorter than one frame produce an empty matrix. Each
    /// band energy is floored before the log, and the per-band mean across
    /// all frames is subtracted at the end — the models expect zero-mean
    /// feature columns.
    pub fn extract(&self, samples: &[f32]) -> Array2<f32> {
        if samples.len() < FRAME_LENGTH {
            return Array2::zeros((0, NUM_MEL_BANDS));
        }
        let num_frames = (samples.len() - FRAME_LENGTH) / HOP_LENGTH + 1;
        let freq_bins = FFT_SIZE / 2;

        let mut features = Array2::zeros((num_frames, NUM_MEL_BANDS));
        let mut fft_buf = vec![Complex::new(0.0f32, 0.0); FFT_SIZE];
        let mut power = vec![0.0f32; freq_bins];

        for frame_idx in 0..num_frames {
            let start = frame_idx * HOP_LENGTH;
            for i in 0..FRAME_LENGTH {
                fft_buf[i] = Complex::new(samples[start + i] * self.window[i], 0.0);
            }
            for slot in fft_buf[FRAME_LENGTH..].iter_mut() {
                *slot = Complex::new(0.0, 0.0);
            }

            self.fft.process(&mut fft_buf);

            for (bin, val) in fft_buf.iter().take(freq_bins).enumerate() {
                power[bin] = val.norm_sqr();
            }

            for m in 0..NUM_MEL_BANDS {
                let energy: f32 = self
                    .filterbank
                    .row(m)
                    .iter()
                    .zip(power.iter())
                    .map(|(&w, &p)| w * p)
                    .sum();
                features[[frame_idx, m]] = energy.max(LOG_FLOOR).ln();
            }
        }

        mean_normalize(&mut features);
        features
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Subtract the per-band mean across all frames from every frame.
fn mean_normalize(features: &mut Array2<f32>) {
    let num_frames = features.nrows();
    if num_frames == 0 {
        return;
    }
    for mut col in features.columns_mut() {
        let mean = col.sum() / num_frames as f32;
        col.mapv_inplace(|v| v - mean);
    }
}

/// Concatenate consecutive frames into low-frame-rate super-frames.
///
/// Output frame `i` covers input frames `i * window_shift ..` for
/// `window_size` frames, repeating the final input frame when a window runs
/// past the end of the matrix. Pure concatenation: no statistics are
/// recomputed, so this must run after [`FeatureExtractor::extract`] has
/// already normalized.
pub fn stack_frames(features: &Array2<f32>, config: LfrConfig) -> Array2<f32> {
    let in_frames = features.nrows();
    let in_dim = features.ncols();
    let out_dim = in_dim * config.window_size;

    if in_frames == 0 {
        return Array2::zeros((0, out_dim));
    }

    let out_frames = in_frames.div_ceil(config.window_shift);
    let mut out = Array2::zeros((out_frames, out_dim));

    for i in 0..out_frames {
        let start = i * config.window_shift;
        for w in 0..config.window_size {
            let src = (start + w).min(in_frames - 1);
            let row = features.row(src);
            for (j, &val) in row.iter().enumerate() {
                out[[i, w * in_dim + j]] = val;
            }
        }
    }

    out
}

/// Triangular mel filterbank over the first `fft_size / 2` bins, spaced on
/// the HTK mel scale: `mel = 2595 * log10(1 + hz / 700)`.
fn mel_filterbank(
    num_bands: usize,
    fft_size: usize,
    sample_rate: f32,
    f_min: f32,
    f_max: f32,
) -> Array2<f32> {
    let num_bins = fft_size / 2;

    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);

    // num_bands + 2 equally spaced points in mel scale
    let mel_points: Vec<f32> = (0..=num_bands + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (num_bands + 1) as f32)
        .collect();

    // Convert back to Hz, then to fractional FFT bin indices
    let bin_points: Vec<f32> = mel_points
        .iter()
        .map(|&m| mel_to_hz(m) * fft_size as f32 / sample_rate)
        .collect();

    let mut filterbank = Array2::zeros((num_bands, num_bins));

    for m in 0..num_bands {
        let left = bin_points[m];
        let center = bin_points[m + 1];
        let right = bin_points[m + 2];

        for k in 0..num_bins {
            let freq = k as f32;
            if freq >= left && freq <= center {
                let denom = center - left;
                if denom > 0.0 {
                    filterbank[[m, k]] = (freq - left) / denom;
                }
            } else if freq > center && freq <= right {
                let denom = right - center;
                if denom > 0.0 {
                    filterbank[[m, k]] = (right - freq) / denom;
                }
            }
        }
    }

    filterbank
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}
