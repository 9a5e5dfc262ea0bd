//! Feedback delay line for the shared delay bus.
//!
//! Wet-only: the output is the delayed signal, and the caller applies the
//! bus return gain. The feedback path runs through a high-pass filter before
//! re-entering the line, so repeats thin out instead of muddying the low end.

use crate::dsp::biquad::Biquad;

/// Q for the feedback high-pass
const FEEDBACK_FILTER_Q: f64 = 0.7;

/// Stereo circular-buffer delay with filtered feedback.
#[derive(Debug, Clone)]
pub struct FeedbackDelay {
    /// Circular buffer for left channel
    buffer_l: Vec<f32>,
    /// Circular buffer for right channel
    buffer_r: Vec<f32>,
    /// Current write position in circular buffer
    write_pos: usize,
    sample_rate: f64,
    delay_secs: f64,
    max_delay_secs: f64,
    /// Feedback amount (kept below 1.0 to prevent runaway feedback)
    feedback: f32,
    /// High-pass filter in the feedback path
    feedback_filter: Biquad,
}

impl FeedbackDelay {
    /// Create a delay line with a fixed maximum length.
    ///
    /// The buffer is allocated once for `max_delay_secs`; later delay-time
    /// changes only move the read offset.
    pub fn new(sample_rate: f64, max_delay_secs: f64, feedback_hp_hz: f64) -> Self {
        let max_delay_secs = max_delay_secs.max(0.001);
        // Extra 10ms margin so a full-length delay never collides with the
        // write cursor
        let size = ((max_delay_secs + 0.010) * sample_rate) as usize;
        Self {
            buffer_l: vec![0.0; size.max(1)],
            buffer_r: vec![0.0; size.max(1)],
            write_pos: 0,
            sample_rate,
            delay_secs: max_delay_secs.min(0.25),
            max_delay_secs,
            feedback: 0.4,
            feedback_filter: Biquad::high_pass(sample_rate, feedback_hp_hz, FEEDBACK_FILTER_Q),
        }
    }

    pub fn delay_secs(&self) -> f64 {
        self.delay_secs
    }

    /// Set the delay time, clamped to (0, max].
    pub fn set_delay_secs(&mut self, secs: f64) {
        self.delay_secs = secs.clamp(0.001, self.max_delay_secs);
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    pub fn set_feedback(&mut self, fb: f32) {
        self.feedback = fb.clamp(0.0, 0.95);
    }

    fn delay_samples(&self) -> usize {
        ((self.delay_secs * self.sample_rate) as usize).max(1)
    }

    /// Read from circular buffer with wrapping
    #[inline]
    fn read_buffer(buffer: &[f32], write_pos: usize, delay_samples: usize) -> f32 {
        let size = buffer.len();
        let read_pos = if write_pos >= delay_samples {
            write_pos - delay_samples
        } else {
            size - (delay_samples - write_pos)
        };
        buffer[read_pos % size]
    }

    /// Process a stereo block in place: input is consumed, the wet delayed
    /// signal is written back.
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let delay_samples = self.delay_samples();
        let feedback = self.feedback;

        for i in 0..left.len().min(right.len()) {
            let input_l = left[i];
            let input_r = right[i];

            let delayed_l = Self::read_buffer(&self.buffer_l, self.write_pos, delay_samples);
            let delayed_r = Self::read_buffer(&self.buffer_r, self.write_pos, delay_samples);

            // Feedback passes through the high-pass before re-entering
            let (fb_l, fb_r) = self
                .feedback_filter
                .process_frame(delayed_l * feedback, delayed_r * feedback);

            self.buffer_l[self.write_pos] = input_l + fb_l;
            self.buffer_r[self.write_pos] = input_r + fb_r;

            left[i] = delayed_l;
            right[i] = delayed_r;

            self.write_pos = (self.write_pos + 1) % self.buffer_l.len();
        }
    }

    /// Clear all delayed signal and filter state.
    pub fn reset(&mut self) {
        self.buffer_l.fill(0.0);
        self.buffer_r.fill(0.0);
        self.write_pos = 0;
        self.feedback_filter.reset();
    }
}
