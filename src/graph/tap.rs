//! Analysis taps.
//!
//! A tap is a non-destructive observation point in the signal graph. It
//! keeps the most recent window of samples (downmixed to mono) and turns
//! them into byte-scaled frequency magnitudes on demand: Hann window,
//! real FFT, per-bin magnitude, time smoothing, then a linear dB-to-byte
//! mapping. Polling is idempotent with respect to the audio path; only the
//! smoothing state advances.

use std::fmt;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

/// Exponential time-smoothing constant applied per poll.
pub const SMOOTHING: f32 = 0.8;
/// Magnitudes at or below this level map to byte 0.
pub const MIN_DB: f32 = -100.0;
/// Magnitudes at or above this level map to byte 255.
pub const MAX_DB: f32 = -30.0;

/// Frequency-magnitude observation point.
///
/// `window_size` is the FFT length; the spectrum exposes `window_size / 2`
/// bins (DC up to, excluding, Nyquist).
pub struct AnalysisTap {
    window_size: usize,
    ring: Vec<f32>,
    write_pos: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    fft_input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    hann: Vec<f32>,
    smoothed: Vec<f32>,
}

impl fmt::Debug for AnalysisTap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisTap")
            .field("window_size", &self.window_size)
            .field("bins", &self.smoothed.len())
            .finish()
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

impl AnalysisTap {
    pub fn new(window_size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        let fft_input = fft.make_input_vec();
        let spectrum = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        Self {
            window_size,
            ring: vec![0.0; window_size],
            write_pos: 0,
            fft,
            fft_input,
            spectrum,
            scratch,
            hann: hann_window(window_size),
            smoothed: vec![0.0; window_size / 2],
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of frequency bins a poll returns.
    pub fn bin_count(&self) -> usize {
        self.window_size / 2
    }

    /// Re-plan for a new window size, discarding window and smoothing
    /// state. No-op when the size is unchanged; a zero-size request is
    /// ignored rather than planned.
    pub fn set_window_size(&mut self, window_size: usize) {
        if window_size == 0 || window_size == self.window_size {
            return;
        }
        *self = Self::new(window_size);
    }

    /// Record a rendered stereo block. The tap analyses a mono downmix.
    pub fn push_block(&mut self, left: &[f32], right: &[f32]) {
        debug_assert_eq!(left.len(), right.len());
        for (&l, &r) in left.iter().zip(right) {
            self.ring[self.write_pos] = 0.5 * (l + r);
            self.write_pos = (self.write_pos + 1) % self.window_size;
        }
    }

    /// Drop window contents and smoothing state.
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.smoothed.fill(0.0);
    }

    /// Byte-scaled magnitude spectrum of the most recent window.
    ///
    /// Each poll folds the new magnitudes into the smoothing state, then
    /// maps `20*log10(mag)` linearly from [`MIN_DB`]..[`MAX_DB`] onto
    /// 0..255.
    pub fn byte_spectrum(&mut self) -> Vec<u8> {
        let n = self.window_size;
        for i in 0..n {
            self.fft_input[i] = self.ring[(self.write_pos + i) % n] * self.hann[i];
        }
        self.fft
            .process_with_scratch(&mut self.fft_input, &mut self.spectrum, &mut self.scratch)
            .unwrap();

        let scale = 1.0 / n as f32;
        let range = MAX_DB - MIN_DB;
        self.smoothed
            .iter_mut()
            .zip(self.spectrum.iter())
            .map(|(state, bin)| {
                let magnitude = bin.norm() * scale;
                *state = SMOOTHING * *state + (1.0 - SMOOTHING) * magnitude;
                let db = 20.0 * state.max(1e-10).log10();
                (((db - MIN_DB) / range).clamp(0.0, 1.0) * 255.0) as u8
            })
            .collect()
    }
}
