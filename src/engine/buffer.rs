//! Decoded audio storage.
//!
//! A loaded stem lives in an [`AudioBuffer`]: channel-major `f32` samples at
//! a known sample rate. Buffers are normalized to stereo at the context rate
//! before they enter the signal graph, so every downstream consumer can
//! assume two channels of equal length.

/// Convert a decibel value to a linear gain multiplier.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain multiplier to decibels. Silence clamps to -100 dB.
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        -100.0
    } else {
        20.0 * linear.log10()
    }
}

/// RMS level of a sample slice, as a linear value in 0.0..=1.0 territory.
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Peak absolute sample value of a slice.
pub fn calculate_peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
}

/// Multi-channel audio sample data.
///
/// Samples are stored channel-major (`samples[channel][frame]`) so per-channel
/// DSP can borrow a whole channel as a contiguous slice. All channels are kept
/// at the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Sample data, one `Vec<f32>` per channel.
    pub samples: Vec<Vec<f32>>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given channel count and length.
    pub fn new(channels: usize, num_frames: usize, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0; num_frames]; channels],
            sample_rate,
        }
    }

    /// Build a buffer from interleaved samples (L R L R ... for stereo).
    pub fn from_interleaved(interleaved: &[f32], channels: usize, sample_rate: u32) -> Self {
        if channels == 0 {
            return Self {
                samples: Vec::new(),
                sample_rate,
            };
        }
        let num_frames = interleaved.len() / channels;
        let mut samples = vec![Vec::with_capacity(num_frames); channels];
        for frame in interleaved.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Number of frames (samples per channel).
    pub fn len(&self) -> usize {
        self.samples.first().map_or(0, |ch| ch.len())
    }

    /// True when the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Borrow one channel as a slice.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.samples.get(index).map(|ch| ch.as_slice())
    }

    /// Mutably borrow one channel.
    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        self.samples.get_mut(index).map(|ch| ch.as_mut_slice())
    }

    /// Peak absolute value across all channels.
    pub fn peak(&self) -> f32 {
        self.samples
            .iter()
            .map(|ch| calculate_peak(ch))
            .fold(0.0_f32, f32::max)
    }

    /// RMS level across all channels, pooled into one figure.
    pub fn rms(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        let total: f32 = self
            .samples
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|s| s * s)
            .sum();
        let count = self.channels() * self.len();
        (total / count as f32).sqrt()
    }

    /// True when every sample is a finite number.
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .all(|ch| ch.iter().all(|s| s.is_finite()))
    }

    /// Convert to stereo. Mono input is spread to both channels; buffers with
    /// more than two channels keep the first two. Already-stereo buffers pass
    /// through unchanged.
    pub fn into_stereo(mut self) -> Self {
        match self.channels() {
            0 => Self::new(2, 0, self.sample_rate),
            1 => {
                let mono = self.samples.pop().unwrap_or_default();
                Self {
                    samples: vec![mono.clone(), mono],
                    sample_rate: self.sample_rate,
                }
            }
            2 => self,
            _ => {
                self.samples.truncate(2);
                self
            }
        }
    }

    /// Resample to `target_rate` with linear interpolation.
    ///
    /// Linear interpolation is adequate here: stems are resampled once at
    /// load time, not per block, and the mix path never resamples again.
    pub fn resampled(&self, target_rate: u32) -> Self {
        if target_rate == 0 || target_rate == self.sample_rate || self.is_empty() {
            let mut out = self.clone();
            if target_rate != 0 {
                out.sample_rate = target_rate;
            }
            return out;
        }
        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = ((self.len() as f64) / ratio).round() as usize;
        let src_len = self.len();
        let samples = self
            .samples
            .iter()
            .map(|ch| {
                (0..out_len)
                    .map(|i| {
                        let pos = i as f64 * ratio;
                        let idx = pos as usize;
                        let frac = (pos - idx as f64) as f32;
                        let a = ch[idx.min(src_len - 1)];
                        let b = ch[(idx + 1).min(src_len - 1)];
                        a + (b - a) * frac
                    })
                    .collect()
            })
            .collect();
        Self {
            samples,
            sample_rate: target_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ========================================================================
    // Conversion helpers
    // ========================================================================

    #[test]
    fn test_db_to_linear_known_values() {
        assert_relative_eq!(db_to_linear(0.0), 1.0, epsilon = 1e-6);
        assert_relative_eq!(db_to_linear(-6.0), 0.501187, epsilon = 1e-5);
        assert_relative_eq!(db_to_linear(6.0), 1.995262, epsilon = 1e-5);
        assert_relative_eq!(db_to_linear(-20.0), 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_to_db_round_trip() {
        for db in [-40.0_f32, -12.0, -3.0, 0.0, 6.0] {
            assert_relative_eq!(linear_to_db(db_to_linear(db)), db, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_linear_to_db_silence_floor() {
        assert_relative_eq!(linear_to_db(0.0), -100.0);
        assert_relative_eq!(linear_to_db(-0.5), -100.0);
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    #[test]
    fn test_rms_of_constant_signal() {
        let samples = vec![0.5; 1000];
        assert_relative_eq!(calculate_rms(&samples), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_rms_of_sine_wave() {
        // RMS of a full-scale sine is 1/sqrt(2).
        let samples: Vec<f32> = (0..48000)
            .map(|i| (2.0 * std::f32::consts::PI * 100.0 * i as f32 / 48000.0).sin())
            .collect();
        assert_relative_eq!(
            calculate_rms(&samples),
            std::f32::consts::FRAC_1_SQRT_2,
            epsilon = 1e-3
        );
    }

    #[test]
    fn test_peak_tracks_absolute_value() {
        let samples = vec![0.1, -0.9, 0.3, 0.0];
        assert_relative_eq!(calculate_peak(&samples), 0.9);
    }

    #[test]
    fn test_empty_slice_statistics() {
        assert_relative_eq!(calculate_rms(&[]), 0.0);
        assert_relative_eq!(calculate_peak(&[]), 0.0);
    }

    // ========================================================================
    // Buffer construction and access
    // ========================================================================

    #[test]
    fn test_new_buffer_is_silent() {
        let buf = AudioBuffer::new(2, 256, 48000);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.len(), 256);
        assert!(buf.samples.iter().all(|ch| ch.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn test_from_interleaved_deinterleaves() {
        let interleaved = [0.1, -0.1, 0.2, -0.2, 0.3, -0.3];
        let buf = AudioBuffer::from_interleaved(&interleaved, 2, 44100);
        assert_eq!(buf.channels(), 2);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.channel(0), Some(&[0.1, 0.2, 0.3][..]));
        assert_eq!(buf.channel(1), Some(&[-0.1, -0.2, -0.3][..]));
    }

    #[test]
    fn test_duration_secs() {
        let buf = AudioBuffer::new(2, 48000, 48000);
        assert_relative_eq!(buf.duration_secs(), 1.0, epsilon = 1e-9);
        let half = AudioBuffer::new(1, 22050, 44100);
        assert_relative_eq!(half.duration_secs(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_channel_out_of_range_is_none() {
        let buf = AudioBuffer::new(2, 16, 48000);
        assert!(buf.channel(2).is_none());
    }

    #[test]
    fn test_is_finite_flags_nan() {
        let mut buf = AudioBuffer::new(1, 4, 48000);
        assert!(buf.is_finite());
        buf.samples[0][2] = f32::NAN;
        assert!(!buf.is_finite());
    }

    // ========================================================================
    // Stereo normalization
    // ========================================================================

    #[test]
    fn test_mono_spreads_to_both_channels() {
        let mono = AudioBuffer {
            samples: vec![vec![0.25, -0.5, 0.75]],
            sample_rate: 48000,
        };
        let stereo = mono.into_stereo();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.channel(0), stereo.channel(1));
        assert_eq!(stereo.channel(0), Some(&[0.25, -0.5, 0.75][..]));
    }

    #[test]
    fn test_stereo_passes_through() {
        let buf = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2, 48000);
        let out = buf.clone().into_stereo();
        assert_eq!(out, buf);
    }

    #[test]
    fn test_multichannel_keeps_first_two() {
        let buf = AudioBuffer {
            samples: vec![vec![0.1], vec![0.2], vec![0.3]],
            sample_rate: 48000,
        };
        let out = buf.into_stereo();
        assert_eq!(out.channels(), 2);
        assert_eq!(out.channel(0), Some(&[0.1][..]));
        assert_eq!(out.channel(1), Some(&[0.2][..]));
    }

    // ========================================================================
    // Resampling
    // ========================================================================

    #[test]
    fn test_resample_same_rate_is_identity() {
        let buf = AudioBuffer::from_interleaved(&[0.1, 0.2, 0.3, 0.4], 2, 48000);
        let out = buf.resampled(48000);
        assert_eq!(out, buf);
    }

    #[test]
    fn test_resample_scales_length() {
        let buf = AudioBuffer::new(2, 44100, 44100);
        let out = buf.resampled(48000);
        assert_eq!(out.sample_rate, 48000);
        assert_eq!(out.len(), 48000);
        assert_relative_eq!(out.duration_secs(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_resample_preserves_constant_signal() {
        let buf = AudioBuffer {
            samples: vec![vec![0.5; 4410]],
            sample_rate: 44100,
        };
        let out = buf.resampled(48000);
        assert!(out
            .channel(0)
            .unwrap()
            .iter()
            .all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_resample_sine_keeps_rms() {
        // A resampled tone should keep its energy within a small tolerance.
        let samples: Vec<f32> = (0..44100)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let buf = AudioBuffer {
            samples: vec![samples],
            sample_rate: 44100,
        };
        let before = buf.rms();
        let after = buf.resampled(48000).rms();
        assert_relative_eq!(before, after, epsilon = 1e-2);
    }
}
