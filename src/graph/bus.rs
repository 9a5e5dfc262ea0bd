//! Shared effect buses.
//!
//! Every stem sends into the same two buses. Each bus processes its summed
//! input to a wet signal and adds it back into the master sum scaled by a
//! return gain. Returns are `ParamCell`s so control threads can move them
//! while the render thread owns the bus state.

use crate::dsp::{Convolver, FeedbackDelay};
use crate::graph::params::ParamCell;
use rand::Rng;

/// Length of the synthesized reverb impulse response.
pub const REVERB_IR_SECS: f64 = 2.0;
/// Initial reverb return level.
pub const REVERB_RETURN_DEFAULT: f32 = 0.3;
/// Delay line length and repeat shape.
pub const DELAY_TIME_SECS: f64 = 0.25;
pub const DELAY_MAX_SECS: f64 = 1.0;
pub const DELAY_FEEDBACK: f32 = 0.4;
/// High-pass corner inside the feedback loop.
pub const DELAY_FEEDBACK_HP_HZ: f64 = 800.0;
/// Initial delay return level.
pub const DELAY_RETURN_DEFAULT: f32 = 0.3;

/// Impulse response loudness calibration: -58 dB at 44.1 kHz, the level
/// convolution platforms normalize to so reverb volume stays independent of
/// response length and content.
const IR_GAIN_CALIBRATION_DB: f32 = -58.0;
const IR_CALIBRATION_SAMPLE_RATE: f32 = 44_100.0;
const IR_MIN_POWER: f32 = 0.000_125;

/// Synthesize a decaying-noise impulse response, one independent noise
/// sequence per channel. Amplitude follows `(1 - i/len)^2`.
pub fn synthesize_impulse_response(sample_rate: u32, seconds: f64) -> (Vec<f32>, Vec<f32>) {
    let len = ((sample_rate as f64 * seconds) as usize).max(1);
    let mut rng = rand::thread_rng();
    let mut left = vec![0.0_f32; len];
    let mut right = vec![0.0_f32; len];
    for i in 0..len {
        let env = (1.0 - i as f32 / len as f32).powi(2);
        left[i] = rng.gen_range(-1.0..1.0) * env;
        right[i] = rng.gen_range(-1.0..1.0) * env;
    }
    (left, right)
}

/// Scale factor that equalizes perceived reverb level across responses.
/// RMS power over both channels is pulled to the calibration level, with a
/// correction for responses recorded away from 44.1 kHz.
fn normalization_scale(ir_left: &[f32], ir_right: &[f32], sample_rate: u32) -> f32 {
    let len = ir_left.len() + ir_right.len();
    if len == 0 {
        return 1.0;
    }
    let energy: f32 = ir_left
        .iter()
        .chain(ir_right.iter())
        .map(|s| s * s)
        .sum();
    let power = (energy / len as f32).sqrt().max(IR_MIN_POWER);
    let mut scale = 10.0_f32.powf(IR_GAIN_CALIBRATION_DB / 20.0) / power;
    if sample_rate > 0 {
        scale *= IR_CALIBRATION_SAMPLE_RATE / sample_rate as f32;
    }
    scale
}

/// Convolution reverb bus with a synthesized room.
#[derive(Debug)]
pub struct ReverbBus {
    convolver: Convolver,
    return_gain: ParamCell,
}

impl ReverbBus {
    pub fn new(sample_rate: u32) -> Self {
        let (mut ir_l, mut ir_r) = synthesize_impulse_response(sample_rate, REVERB_IR_SECS);
        let scale = normalization_scale(&ir_l, &ir_r, sample_rate);
        for s in ir_l.iter_mut().chain(ir_r.iter_mut()) {
            *s *= scale;
        }
        Self::from_impulse_response(&ir_l, &ir_r)
    }

    /// Build around an explicit impulse response, used verbatim with no
    /// loudness normalization.
    pub fn from_impulse_response(ir_left: &[f32], ir_right: &[f32]) -> Self {
        Self {
            convolver: Convolver::new(ir_left, ir_right),
            return_gain: ParamCell::new(REVERB_RETURN_DEFAULT),
        }
    }

    pub fn return_gain(&self) -> f32 {
        self.return_gain.get()
    }

    pub fn set_return_gain(&self, linear: f32) {
        self.return_gain.set(linear);
    }

    pub fn latency_samples(&self) -> usize {
        self.convolver.latency_samples()
    }

    /// Convolve the summed send input and add the wet return into the master
    /// sum. The input slices are consumed as scratch. Runs every block even
    /// at zero return so the tail keeps moving.
    pub fn render(
        &mut self,
        input_l: &mut [f32],
        input_r: &mut [f32],
        master_l: &mut [f32],
        master_r: &mut [f32],
    ) {
        self.convolver.process(input_l, input_r);
        let ret = self.return_gain.get();
        if ret == 0.0 {
            return;
        }
        for (out, wet) in master_l.iter_mut().zip(input_l.iter()) {
            *out += wet * ret;
        }
        for (out, wet) in master_r.iter_mut().zip(input_r.iter()) {
            *out += wet * ret;
        }
    }

    pub fn reset(&mut self) {
        self.convolver.reset();
    }
}

/// Feedback delay bus.
#[derive(Debug)]
pub struct DelayBus {
    delay: FeedbackDelay,
    return_gain: ParamCell,
}

impl DelayBus {
    pub fn new(sample_rate: u32) -> Self {
        let mut delay = FeedbackDelay::new(
            sample_rate as f64,
            DELAY_MAX_SECS,
            DELAY_FEEDBACK_HP_HZ,
        );
        delay.set_delay_secs(DELAY_TIME_SECS);
        delay.set_feedback(DELAY_FEEDBACK);
        Self {
            delay,
            return_gain: ParamCell::new(DELAY_RETURN_DEFAULT),
        }
    }

    pub fn return_gain(&self) -> f32 {
        self.return_gain.get()
    }

    pub fn set_return_gain(&self, linear: f32) {
        self.return_gain.set(linear);
    }

    /// Same contract as [`ReverbBus::render`].
    pub fn render(
        &mut self,
        input_l: &mut [f32],
        input_r: &mut [f32],
        master_l: &mut [f32],
        master_r: &mut [f32],
    ) {
        self.delay.process(input_l, input_r);
        let ret = self.return_gain.get();
        if ret == 0.0 {
            return;
        }
        for (out, wet) in master_l.iter_mut().zip(input_l.iter()) {
            *out += wet * ret;
        }
        for (out, wet) in master_r.iter_mut().zip(input_r.iter()) {
            *out += wet * ret;
        }
    }

    pub fn reset(&mut self) {
        self.delay.reset();
    }
}
