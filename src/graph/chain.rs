//! Per-stem signal chain.
//!
//! Each loaded stem renders through its own chain:
//! `source -> gain -> EQ low -> EQ mid -> EQ high -> tap -> master sum`,
//! with reverb and delay sends tapped after the high band. The source is
//! single-use: it plays the buffer once from the top and cannot be
//! restarted, only re-armed by the next play.

use crate::dsp::Biquad;
use crate::engine::buffer::AudioBuffer;
use crate::engine::loader::LoadedStem;
use crate::graph::params::ParamCell;
use crate::graph::tap::AnalysisTap;

/// Default stem gain, equivalent to a volume setting of 75.
pub const DEFAULT_STEM_GAIN: f32 = 0.75;
/// Peaking EQ band centers.
pub const EQ_LOW_HZ: f64 = 100.0;
pub const EQ_MID_HZ: f64 = 1000.0;
pub const EQ_HIGH_HZ: f64 = 8000.0;
/// Q shared by every EQ band and the master filter.
pub const EQ_Q: f64 = 0.7;

/// One of the three peaking EQ bands on a stem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqBand {
    Low,
    Mid,
    High,
}

/// One of the two shared effect buses a stem can send into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBus {
    Reverb,
    Delay,
}

/// Render chain for a single loaded stem.
#[derive(Debug)]
pub struct StemChain {
    id: String,
    name: String,
    buffer: AudioBuffer,
    /// Playback position in frames; `None` when no source is armed.
    cursor: Option<usize>,
    gain: ParamCell,
    eq_low_db: ParamCell,
    eq_mid_db: ParamCell,
    eq_high_db: ParamCell,
    reverb_send: ParamCell,
    delay_send: ParamCell,
    eq_low: Biquad,
    eq_mid: Biquad,
    eq_high: Biquad,
    tap: AnalysisTap,
    scratch_l: Vec<f32>,
    scratch_r: Vec<f32>,
}

impl StemChain {
    /// Build a chain around a loaded stem. The buffer must already be
    /// normalized to stereo at the context rate.
    pub fn new(stem: LoadedStem, tap_window: usize, max_block: usize) -> Self {
        debug_assert_eq!(stem.buffer.channels(), 2);
        let fs = stem.buffer.sample_rate as f64;
        Self {
            id: stem.id,
            name: stem.name,
            buffer: stem.buffer,
            cursor: None,
            gain: ParamCell::new(DEFAULT_STEM_GAIN),
            eq_low_db: ParamCell::new(0.0),
            eq_mid_db: ParamCell::new(0.0),
            eq_high_db: ParamCell::new(0.0),
            reverb_send: ParamCell::new(0.0),
            delay_send: ParamCell::new(0.0),
            eq_low: Biquad::peaking(fs, EQ_LOW_HZ, EQ_Q),
            eq_mid: Biquad::peaking(fs, EQ_MID_HZ, EQ_Q),
            eq_high: Biquad::peaking(fs, EQ_HIGH_HZ, EQ_Q),
            tap: AnalysisTap::new(tap_window),
            scratch_l: vec![0.0; max_block],
            scratch_r: vec![0.0; max_block],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.duration_secs()
    }

    // ========================================================================
    // Control surface (atomic writes, visible to the next block)
    // ========================================================================

    /// Resolved linear gain; mute/solo/volume policy is decided upstream.
    pub fn set_gain(&self, linear: f32) {
        self.gain.set(linear);
    }

    pub fn gain(&self) -> f32 {
        self.gain.get()
    }

    pub fn set_eq_db(&self, band: EqBand, db: f32) {
        match band {
            EqBand::Low => self.eq_low_db.set(db),
            EqBand::Mid => self.eq_mid_db.set(db),
            EqBand::High => self.eq_high_db.set(db),
        }
    }

    /// Send level as a linear 0..1 amount.
    pub fn set_send(&self, bus: SendBus, linear: f32) {
        match bus {
            SendBus::Reverb => self.reverb_send.set(linear),
            SendBus::Delay => self.delay_send.set(linear),
        }
    }

    pub fn send(&self, bus: SendBus) -> f32 {
        match bus {
            SendBus::Reverb => self.reverb_send.get(),
            SendBus::Delay => self.delay_send.get(),
        }
    }

    // ========================================================================
    // Source lifecycle
    // ========================================================================

    /// Arm a fresh source at the top of the buffer.
    pub fn arm_source(&mut self) {
        self.cursor = Some(0);
    }

    /// Discard the current source. EQ and tap state persist across plays,
    /// like the underlying filter nodes would.
    pub fn disarm_source(&mut self) {
        self.cursor = None;
    }

    pub fn is_armed(&self) -> bool {
        self.cursor.is_some()
    }

    /// True once an armed source has played past the end of its buffer.
    pub fn source_exhausted(&self) -> bool {
        matches!(self.cursor, Some(cursor) if cursor >= self.buffer.len())
    }

    pub fn tap_mut(&mut self) -> &mut AnalysisTap {
        &mut self.tap
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render one block, adding the post-EQ dry signal into the master sum
    /// and the scaled send copies into the bus inputs. A chain with no
    /// armed source (or an exhausted one) contributes silence but still
    /// feeds its tap, so meters decay instead of freezing.
    #[allow(clippy::too_many_arguments)]
    pub fn render_block(
        &mut self,
        frames: usize,
        mix_l: &mut [f32],
        mix_r: &mut [f32],
        reverb_l: &mut [f32],
        reverb_r: &mut [f32],
        delay_l: &mut [f32],
        delay_r: &mut [f32],
    ) {
        self.eq_low.set_gain_db(self.eq_low_db.get() as f64);
        self.eq_mid.set_gain_db(self.eq_mid_db.get() as f64);
        self.eq_high.set_gain_db(self.eq_high_db.get() as f64);

        let gain = self.gain.get();
        self.scratch_l[..frames].fill(0.0);
        self.scratch_r[..frames].fill(0.0);
        if let Some(cursor) = self.cursor {
            let len = self.buffer.len();
            if cursor < len {
                let n = frames.min(len - cursor);
                let src_l = &self.buffer.samples[0][cursor..cursor + n];
                let src_r = &self.buffer.samples[1][cursor..cursor + n];
                for i in 0..n {
                    self.scratch_l[i] = src_l[i] * gain;
                    self.scratch_r[i] = src_r[i] * gain;
                }
            }
            self.cursor = Some((cursor + frames).min(len));
        }

        let left = &mut self.scratch_l[..frames];
        let right = &mut self.scratch_r[..frames];
        self.eq_low.process_stereo(left, right);
        self.eq_mid.process_stereo(left, right);
        self.eq_high.process_stereo(left, right);

        self.tap.push_block(left, right);

        let reverb_send = self.reverb_send.get();
        let delay_send = self.delay_send.get();
        for i in 0..frames {
            mix_l[i] += left[i];
            mix_r[i] += right[i];
        }
        if reverb_send > 0.0 {
            for i in 0..frames {
                reverb_l[i] += left[i] * reverb_send;
                reverb_r[i] += right[i] * reverb_send;
            }
        }
        if delay_send > 0.0 {
            for i in 0..frames {
                delay_l[i] += left[i] * delay_send;
                delay_r[i] += right[i] * delay_send;
            }
        }
    }
}
