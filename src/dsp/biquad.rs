//! Biquad filter stages.
//!
//! The routing graph uses three fixed-purpose biquads: peaking EQ bands on
//! each stem, the master macro low-pass, and the high-pass inside the delay
//! feedback loop. Coefficients come from the Audio EQ Cookbook formulas.

use std::f64::consts::PI;

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Bell curve boost/cut around the center frequency
    Peaking,
    /// Attenuate above the cutoff frequency
    LowPass,
    /// Attenuate below the cutoff frequency
    HighPass,
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, Default)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl BiquadCoeffs {
    /// Calculate biquad coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    fn calculate(kind: FilterKind, sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        // Clamp frequency to valid range (below Nyquist)
        let freq = frequency.clamp(10.0, sample_rate / 2.0 - 1.0);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::Peaking => {
                let a = (10.0_f64).powf(gain_db / 40.0);
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
            FilterKind::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
        };

        // Normalize by a0
        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Biquad filter state for one channel
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample through the biquad filter (direct form I)
    #[inline]
    fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        // Shift delay line
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// One stereo biquad stage with live-tunable frequency and gain.
///
/// Coefficient recalculation is deferred to the next processed block, so
/// parameter writes stay cheap on the control side.
#[derive(Debug, Clone)]
pub struct Biquad {
    kind: FilterKind,
    sample_rate: f64,
    frequency: f64,
    gain_db: f64,
    q: f64,
    coeffs: BiquadCoeffs,
    states: [BiquadState; 2],
    coeffs_dirty: bool,
}

impl Biquad {
    pub fn new(kind: FilterKind, sample_rate: f64, frequency: f64, gain_db: f64, q: f64) -> Self {
        Self {
            kind,
            sample_rate,
            frequency,
            gain_db,
            q,
            coeffs: BiquadCoeffs::default(),
            states: [BiquadState::default(); 2],
            coeffs_dirty: true,
        }
    }

    /// A peaking band at a fixed center frequency, flat by default.
    pub fn peaking(sample_rate: f64, frequency: f64, q: f64) -> Self {
        Self::new(FilterKind::Peaking, sample_rate, frequency, 0.0, q)
    }

    pub fn low_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        Self::new(FilterKind::LowPass, sample_rate, frequency, 0.0, q)
    }

    pub fn high_pass(sample_rate: f64, frequency: f64, q: f64) -> Self {
        Self::new(FilterKind::HighPass, sample_rate, frequency, 0.0, q)
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    /// Retune the filter. State is kept so a sweep does not click.
    pub fn set_frequency(&mut self, frequency: f64) {
        if (frequency - self.frequency).abs() > f64::EPSILON {
            self.frequency = frequency;
            self.coeffs_dirty = true;
        }
    }

    pub fn set_gain_db(&mut self, gain_db: f64) {
        if (gain_db - self.gain_db).abs() > f64::EPSILON {
            self.gain_db = gain_db;
            self.coeffs_dirty = true;
        }
    }

    fn update_coefficients(&mut self) {
        if !self.coeffs_dirty {
            return;
        }
        self.coeffs = BiquadCoeffs::calculate(
            self.kind,
            self.sample_rate,
            self.frequency,
            self.gain_db,
            self.q,
        );
        self.coeffs_dirty = false;
    }

    /// Whether this stage currently does nothing to the signal.
    ///
    /// Only a peaking band at (or negligibly near) 0 dB is a true bypass;
    /// pass filters always shape the signal.
    pub fn is_bypass(&self) -> bool {
        self.kind == FilterKind::Peaking && self.gain_db.abs() < 0.01
    }

    /// Process one channel's block in place.
    pub fn process_channel(&mut self, channel: usize, samples: &mut [f32]) {
        self.update_coefficients();
        if self.is_bypass() {
            return;
        }
        let coeffs = self.coeffs;
        let state = &mut self.states[channel & 1];
        for s in samples.iter_mut() {
            *s = state.process(*s as f64, &coeffs) as f32;
        }
    }

    /// Process a stereo block in place.
    pub fn process_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.process_channel(0, left);
        self.process_channel(1, right);
    }

    /// Process a single stereo frame, returning the filtered pair.
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        self.update_coefficients();
        if self.is_bypass() {
            return (left, right);
        }
        let coeffs = self.coeffs;
        let l = self.states[0].process(left as f64, &coeffs) as f32;
        let r = self.states[1].process(right as f64, &coeffs) as f32;
        (l, r)
    }

    /// Clear the delay line on both channels.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper to create a sine block at a specific frequency
    fn sine_block(frequency: f64, sample_rate: f64, duration_secs: f64) -> Vec<f32> {
        let num_samples = (sample_rate * duration_secs) as usize;
        (0..num_samples)
            .map(|i| {
                let t = i as f64 / sample_rate;
                (2.0 * PI * frequency * t).sin() as f32
            })
            .collect()
    }

    /// Calculate RMS of a block (linear, not dB)
    fn block_rms(samples: &[f32]) -> f64 {
        let sum_sq: f64 = samples.iter().map(|s| (*s as f64).powi(2)).sum();
        (sum_sq / samples.len() as f64).sqrt()
    }

    #[test]
    fn test_peaking_boost() {
        let mut filter = Biquad::peaking(48000.0, 1000.0, 0.7);
        filter.set_gain_db(12.0);

        let mut block = sine_block(1000.0, 48000.0, 0.1);
        let rms_before = block_rms(&block);
        filter.process_channel(0, &mut block);
        let rms_after = block_rms(&block);

        // 12dB boost should increase amplitude by ~4x (10^(12/20) = 3.98)
        let gain_ratio = rms_after / rms_before;
        assert!(
            gain_ratio > 3.0 && gain_ratio < 5.0,
            "Expected ~4x gain, got {}",
            gain_ratio
        );
    }

    #[test]
    fn test_peaking_cut() {
        let mut filter = Biquad::peaking(48000.0, 1000.0, 0.7);
        filter.set_gain_db(-12.0);

        let mut block = sine_block(1000.0, 48000.0, 0.1);
        let rms_before = block_rms(&block);
        filter.process_channel(0, &mut block);
        let rms_after = block_rms(&block);

        let gain_ratio = rms_after / rms_before;
        assert!(
            gain_ratio > 0.2 && gain_ratio < 0.4,
            "Expected ~0.25 gain, got {}",
            gain_ratio
        );
    }

    #[test]
    fn test_peaking_zero_gain_is_bypass() {
        let mut filter = Biquad::peaking(48000.0, 1000.0, 0.7);

        let mut block = sine_block(1000.0, 48000.0, 0.05);
        let original = block.clone();
        filter.process_channel(0, &mut block);

        for (a, b) in block.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-6, "Zero gain should bypass");
        }
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        let mut filter = Biquad::low_pass(48000.0, 1000.0, 0.7);

        let mut low = sine_block(200.0, 48000.0, 0.1);
        let low_before = block_rms(&low);
        filter.process_channel(0, &mut low);
        let low_after = block_rms(&low);

        filter.reset();

        let mut high = sine_block(8000.0, 48000.0, 0.1);
        let high_before = block_rms(&high);
        filter.process_channel(0, &mut high);
        let high_after = block_rms(&high);

        let low_gain = low_after / low_before;
        let high_gain = high_after / high_before;
        assert!(
            low_gain > 0.8 && low_gain < 1.2,
            "Low frequencies should pass, got {}",
            low_gain
        );
        assert!(
            high_gain < 0.1,
            "High frequencies should be attenuated, got {}",
            high_gain
        );
    }

    #[test]
    fn test_high_pass_attenuates_lows() {
        let mut filter = Biquad::high_pass(48000.0, 800.0, 0.7);

        let mut low = sine_block(100.0, 48000.0, 0.1);
        let low_before = block_rms(&low);
        filter.process_channel(0, &mut low);
        let low_after = block_rms(&low);

        filter.reset();

        let mut high = sine_block(5000.0, 48000.0, 0.1);
        let high_before = block_rms(&high);
        filter.process_channel(0, &mut high);
        let high_after = block_rms(&high);

        assert!(
            low_after / low_before < 0.1,
            "Low frequencies should be attenuated"
        );
        assert!(
            high_after / high_before > 0.8,
            "High frequencies should pass"
        );
    }

    #[test]
    fn test_retune_takes_effect() {
        let mut filter = Biquad::low_pass(48000.0, 20000.0, 0.7);

        // Fully open: 4 kHz passes
        let mut block = sine_block(4000.0, 48000.0, 0.1);
        let before = block_rms(&block);
        filter.process_channel(0, &mut block);
        assert!(block_rms(&block) / before > 0.8);

        // Close the filter below the tone
        filter.set_frequency(500.0);
        filter.reset();

        let mut block = sine_block(4000.0, 48000.0, 0.1);
        let before = block_rms(&block);
        filter.process_channel(0, &mut block);
        assert!(
            block_rms(&block) / before < 0.1,
            "Retuned filter should attenuate the tone"
        );
    }

    #[test]
    fn test_frequency_clamped_below_nyquist() {
        // Cutoff far above Nyquist must not blow up the filter
        let mut filter = Biquad::low_pass(8000.0, 20000.0, 0.7);
        let mut block = sine_block(1000.0, 8000.0, 0.1);
        filter.process_channel(0, &mut block);
        assert!(block.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_stereo_channels_independent() {
        let mut filter = Biquad::peaking(48000.0, 1000.0, 0.7);
        filter.set_gain_db(6.0);

        let mut left = sine_block(1000.0, 48000.0, 0.05);
        let mut right = vec![0.0_f32; left.len()];
        filter.process_stereo(&mut left, &mut right);

        // A silent right channel must stay silent regardless of the left
        assert!(right.iter().all(|s| s.abs() < 1e-9));
        assert!(block_rms(&left) > 0.5);
    }
}
