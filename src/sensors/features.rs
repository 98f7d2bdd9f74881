// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/machinaear-agent

//! Log-mel feature extraction
//!
//! Produces the square, `[0, 1]`-normalized time-frequency patch the
//! reconstruction model consumes:
//!
//! 1. centered STFT with a periodic Hann window (zero padded by `n_fft / 2`)
//! 2. power spectrum mapped through a Slaney-style mel filterbank
//! 3. `10 * log10(mel + eps)`
//! 4. min-max normalization over the whole spectrogram (`+1e-8` on the range)
//! 5. right zero-padding when there are fewer frames than mel bands
//! 6. centered `n_mels x n_mels` crop

use std::f64::consts::PI;
use std::sync::Arc;

use ndarray::{s, Array2};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::AudioConfig;

const NORM_EPSILON: f64 = 1e-8;

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz < MIN_LOG_HZ {
        hz / F_SP
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Triangular mel filterbank with area normalization, shape `(n_mels, n_fft / 2 + 1)`
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Array2<f64> {
    let n_bins = n_fft / 2 + 1;
    let sr = sample_rate as f64;

    let fft_freqs: Vec<f64> = (0..n_bins).map(|k| k as f64 * sr / n_fft as f64).collect();

    let max_mel = hz_to_mel(sr / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut weights = Array2::<f64>::zeros((n_mels, n_bins));
    for m in 0..n_mels {
        let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let enorm = 2.0 / (right - left);

        for (k, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - left) / (center - left);
            let upper = (right - f) / (right - center);
            let w = lower.min(upper).max(0.0);
            weights[[m, k]] = w * enorm;
        }
    }

    weights
}

/// Periodic Hann window
fn hann_window(len: usize) -> Vec<f64> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f64 / len as f64).cos())
        .collect()
}

/// Reusable extractor: window, filterbank and FFT plan are built once
pub struct MelExtractor {
    sample_rate: u32,
    n_fft: usize,
    hop_length: usize,
    n_mels: usize,
    window: Vec<f64>,
    filterbank: Array2<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl MelExtractor {
    pub fn new(sample_rate: u32, n_fft: usize, hop_length: usize, n_mels: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            sample_rate,
            n_fft,
            hop_length,
            n_mels,
            window: hann_window(n_fft),
            filterbank: mel_filterbank(sample_rate, n_fft, n_mels),
            fft: planner.plan_fft_forward(n_fft),
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        Self::new(config.sample_rate, config.n_fft, config.hop_length, config.n_mels)
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Power spectrogram, shape `(n_fft / 2 + 1, frames)`
    fn power_spectrogram(&self, samples: &[f32]) -> Array2<f64> {
        let pad = self.n_fft / 2;
        let mut padded = vec![0.0f64; samples.len() + 2 * pad];
        for (dst, &src) in padded[pad..pad + samples.len()].iter_mut().zip(samples) {
            *dst = src as f64;
        }
        if padded.len() < self.n_fft {
            padded.resize(self.n_fft, 0.0);
        }

        let n_frames = 1 + (padded.len() - self.n_fft) / self.hop_length;
        let n_bins = self.n_fft / 2 + 1;
        let mut power = Array2::<f64>::zeros((n_bins, n_frames));
        let mut buffer = vec![Complex::new(0.0, 0.0); self.n_fft];

        for frame in 0..n_frames {
            let start = frame * self.hop_length;
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = Complex::new(padded[start + i] * self.window[i], 0.0);
            }
            self.fft.process(&mut buffer);
            for bin in 0..n_bins {
                power[[bin, frame]] = buffer[bin].norm_sqr();
            }
        }

        power
    }

    /// Log-mel spectrogram in dB, shape `(n_mels, frames)`
    pub fn log_mel(&self, samples: &[f32], sample_rate: u32) -> Array2<f64> {
        let power = self.power_spectrogram(samples);
        let mel = if sample_rate == self.sample_rate {
            self.filterbank.dot(&power)
        } else {
            mel_filterbank(sample_rate, self.n_fft, self.n_mels).dot(&power)
        };
        mel.mapv(|v| 10.0 * (v + f64::EPSILON).log10())
    }

    /// Normalized square patch, shape `(n_mels, n_mels)`
    pub fn extract(&self, samples: &[f32], sample_rate: u32) -> Array2<f32> {
        let log_mel = self.log_mel(samples, sample_rate);
        square_patch(&normalize_unit(&log_mel), self.n_mels)
    }
}

/// Min-max normalize into `[0, 1]`; constant input maps to zeros
pub fn normalize_unit(x: &Array2<f64>) -> Array2<f64> {
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return Array2::zeros(x.raw_dim());
    }
    x.mapv(|v| (v - min) / (max - min + NORM_EPSILON))
}

/// Right-pad the time axis to `size` if needed, then take the centered `size x size` crop
pub fn square_patch(x: &Array2<f64>, size: usize) -> Array2<f32> {
    let (rows, frames) = x.dim();
    let rows = rows.min(size);

    let width = frames.max(size);
    let mut padded = Array2::<f64>::zeros((rows, width));
    padded.slice_mut(s![.., ..frames]).assign(&x.slice(s![..rows, ..]));

    let start = (width - size) / 2;
    let mut patch = Array2::<f32>::zeros((size, size));
    patch
        .slice_mut(s![..rows, ..])
        .assign(&padded.slice(s![.., start..start + size]).mapv(|v| v as f32));
    patch
}
