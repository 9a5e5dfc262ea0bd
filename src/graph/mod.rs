//! The stereo routing graph.
//!
//! Topology, fixed at build time:
//!
//! ```text
//! stem source -> gain -> EQ 100 Hz -> EQ 1 kHz -> EQ 8 kHz -> tap --+
//!                                          |            |           |
//!                                          +-> reverb send          |
//!                                          +-> delay send           |
//!                                                                   v
//! reverb bus (convolver) ---- return ----------------------> master sum
//! delay bus (feedback line) - return ----------------------> master sum
//!                                                                   |
//!                                     master gain -> macro low-pass |
//!                                                -> master tap -> out
//! ```
//!
//! Control writes go through atomic cells and take effect at the next
//! rendered block. Rendering itself needs `&mut` and is single-threaded.

pub mod bus;
pub mod chain;
pub mod params;
pub mod tap;

pub use bus::{DelayBus, ReverbBus};
pub use chain::{EqBand, SendBus, StemChain};
pub use params::{FlagCell, ParamCell};
pub use tap::AnalysisTap;

use crate::engine::clock::AudioClock;
use crate::engine::loader::LoadedStem;
use crate::error::{Result, StemmixError};
use crate::dsp::Biquad;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Default master sum level, matching a master volume of 75.
pub const MASTER_GAIN_DEFAULT: f32 = 0.75;
/// Macro filter sweep range.
pub const MACRO_LPF_MIN_HZ: f32 = 20.0;
pub const MACRO_LPF_MAX_HZ: f32 = 20_000.0;
/// Reverb return when the macro filter is fully closed.
pub const MACRO_REVERB_RETURN_MAX: f32 = 0.5;
/// Analysis window sizes: master tap and per-stem taps.
pub const MASTER_TAP_WINDOW: usize = 512;
pub const STEM_TAP_WINDOW: usize = 256;
/// Frames rendered per internal pass.
pub const RENDER_QUANTUM: usize = 128;

// ============================================================================
// Context description
// ============================================================================

/// Output format the graph renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioContextSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Upper bound on frames processed per internal pass.
    pub max_block: usize,
}

impl Default for AudioContextSpec {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            max_block: RENDER_QUANTUM,
        }
    }
}

impl AudioContextSpec {
    /// Describe the host output. Headless hosts get the standard stereo
    /// 48 kHz context.
    pub fn probe() -> Result<Self> {
        let spec = Self::default();
        spec.validate()?;
        log::info!(
            "audio context: {} Hz, {} channels, {}-frame blocks",
            spec.sample_rate,
            spec.channels,
            spec.max_block
        );
        Ok(spec)
    }

    /// Reject contexts the graph cannot run on. Low sample rates are legal
    /// but logged, since everything above Nyquist folds into the filters'
    /// clamped range.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(StemmixError::UnsupportedPlatform {
                reason: "output sample rate is zero".to_string(),
            });
        }
        if self.channels != 2 {
            return Err(StemmixError::UnsupportedPlatform {
                reason: format!("{}-channel output is not supported, need stereo", self.channels),
            });
        }
        if self.max_block == 0 {
            return Err(StemmixError::UnsupportedPlatform {
                reason: "render block size is zero".to_string(),
            });
        }
        if self.sample_rate < 22_050 {
            log::warn!(
                "sample rate {} Hz is unusually low; fixed filter bands will crowd Nyquist",
                self.sample_rate
            );
        }
        Ok(())
    }
}

/// Which analyser a resolution change or spectrum poll addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapTarget<'a> {
    Master,
    Stem(&'a str),
}

// ============================================================================
// Signal graph
// ============================================================================

/// Owns every node in the render topology.
///
/// Parameter setters take `&self` and are safe to call from control threads;
/// rendering and spectrum polling take `&mut self` and belong to whoever owns
/// the graph.
#[derive(Debug)]
pub struct SignalGraph {
    spec: AudioContextSpec,
    clock: Arc<AudioClock>,
    chains: Vec<StemChain>,
    reverb: ReverbBus,
    delay: DelayBus,
    master_gain: ParamCell,
    macro_cutoff: ParamCell,
    master_lpf: Biquad,
    master_tap: AnalysisTap,
    /// False while the context is suspended; rendering then emits silence
    /// and the clock holds still.
    context_running: FlagCell,
    mix_l: Vec<f32>,
    mix_r: Vec<f32>,
    rev_in_l: Vec<f32>,
    rev_in_r: Vec<f32>,
    del_in_l: Vec<f32>,
    del_in_r: Vec<f32>,
}

impl SignalGraph {
    /// Wire one chain per loaded stem into the shared buses and master
    /// section.
    pub fn new(
        spec: AudioContextSpec,
        clock: Arc<AudioClock>,
        stems: Vec<LoadedStem>,
    ) -> Result<Self> {
        spec.validate()?;
        let chains: Vec<StemChain> = stems
            .into_iter()
            .map(|stem| StemChain::new(stem, STEM_TAP_WINDOW, spec.max_block))
            .collect();
        log::info!(
            "signal graph ready: {} stem chain(s) at {} Hz",
            chains.len(),
            spec.sample_rate
        );
        Ok(Self {
            clock,
            chains,
            reverb: ReverbBus::new(spec.sample_rate),
            delay: DelayBus::new(spec.sample_rate),
            master_gain: ParamCell::new(MASTER_GAIN_DEFAULT),
            macro_cutoff: ParamCell::new(MACRO_LPF_MAX_HZ),
            master_lpf: Biquad::low_pass(
                spec.sample_rate as f64,
                MACRO_LPF_MAX_HZ as f64,
                chain::EQ_Q,
            ),
            master_tap: AnalysisTap::new(MASTER_TAP_WINDOW),
            context_running: FlagCell::new(true),
            mix_l: vec![0.0; spec.max_block],
            mix_r: vec![0.0; spec.max_block],
            rev_in_l: vec![0.0; spec.max_block],
            rev_in_r: vec![0.0; spec.max_block],
            del_in_l: vec![0.0; spec.max_block],
            del_in_r: vec![0.0; spec.max_block],
            spec,
        })
    }

    pub fn spec(&self) -> &AudioContextSpec {
        &self.spec
    }

    pub fn stem_count(&self) -> usize {
        self.chains.len()
    }

    pub fn stem_ids(&self) -> Vec<&str> {
        self.chains.iter().map(|c| c.id()).collect()
    }

    /// Longest stem duration, which is how long a full pass takes.
    pub fn duration_secs(&self) -> f64 {
        self.chains
            .iter()
            .map(|c| c.duration_secs())
            .fold(0.0, f64::max)
    }

    fn chain(&self, id: &str) -> Option<&StemChain> {
        self.chains.iter().find(|c| c.id() == id)
    }

    fn chain_mut(&mut self, id: &str) -> Option<&mut StemChain> {
        self.chains.iter_mut().find(|c| c.id() == id)
    }

    // ========================================================================
    // Control surface (&self; unknown stem ids are ignored)
    // ========================================================================

    /// Write a stem's resolved linear gain.
    pub fn set_stem_gain(&self, id: &str, linear: f32) {
        if let Some(chain) = self.chain(id) {
            chain.set_gain(linear);
        }
    }

    pub fn stem_gain(&self, id: &str) -> Option<f32> {
        self.chain(id).map(|c| c.gain())
    }

    pub fn set_stem_eq(&self, id: &str, band: EqBand, db: f32) {
        if let Some(chain) = self.chain(id) {
            chain.set_eq_db(band, db);
        }
    }

    pub fn set_stem_send(&self, id: &str, bus: SendBus, linear: f32) {
        if let Some(chain) = self.chain(id) {
            chain.set_send(bus, linear);
        }
    }

    pub fn stem_send(&self, id: &str, bus: SendBus) -> Option<f32> {
        self.chain(id).map(|c| c.send(bus))
    }

    /// Write the master sum level as a linear gain.
    pub fn set_master_gain(&self, linear: f32) {
        self.master_gain.set(linear);
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain.get()
    }

    /// One-knob macro: sweeps the master low-pass exponentially from
    /// 20 Hz (0) to fully open (100), while the reverb return fades up as
    /// the filter closes.
    pub fn set_macro_lpf(&self, amount: f32) {
        let cutoff = (MACRO_LPF_MIN_HZ * 1000.0_f32.powf(amount / 100.0)).min(MACRO_LPF_MAX_HZ);
        self.macro_cutoff.set(cutoff);
        let wet = (1.0 - amount / 100.0).max(0.0) * MACRO_REVERB_RETURN_MAX;
        self.reverb.set_return_gain(wet);
        log::debug!("macro lpf {:.1} -> cutoff {:.1} Hz, reverb return {:.2}", amount, cutoff, wet);
    }

    pub fn macro_cutoff_hz(&self) -> f32 {
        self.macro_cutoff.get()
    }

    /// Current reverb return level, wiring default until the macro moves.
    pub fn reverb_return_gain(&self) -> f32 {
        self.reverb.return_gain()
    }

    /// Mark the context running. Always safe, even when already running.
    pub fn resume(&self) {
        self.context_running.set(true);
    }

    /// Halt rendering output and freeze the clock until the next resume.
    pub fn suspend(&self) {
        self.context_running.set(false);
    }

    pub fn is_running(&self) -> bool {
        self.context_running.get()
    }

    // ========================================================================
    // Source lifecycle and analysis (&mut self)
    // ========================================================================

    /// Arm a fresh single-use source on every chain, positioned at the top.
    pub fn arm_all_sources(&mut self) {
        for chain in &mut self.chains {
            chain.arm_source();
        }
    }

    /// Drop all armed sources. The next play re-arms from the top.
    pub fn disarm_all_sources(&mut self) {
        for chain in &mut self.chains {
            chain.disarm_source();
        }
    }

    /// Swap an analyser to a new window size, clearing its history.
    pub fn set_analysis_resolution(&mut self, target: TapTarget<'_>, window: usize) {
        match target {
            TapTarget::Master => self.master_tap.set_window_size(window),
            TapTarget::Stem(id) => {
                if let Some(chain) = self.chain_mut(id) {
                    chain.tap_mut().set_window_size(window);
                }
            }
        }
    }

    pub fn poll_master_spectrum(&mut self) -> Vec<u8> {
        self.master_tap.byte_spectrum()
    }

    pub fn poll_stem_spectrum(&mut self, id: &str) -> Option<Vec<u8>> {
        self.chain_mut(id).map(|c| c.tap_mut().byte_spectrum())
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render the next stereo block into the output slices.
    ///
    /// A suspended context writes silence and leaves the clock untouched,
    /// so elapsed time freezes with it. Output longer than the block size
    /// is produced in quantum-sized passes.
    pub fn render_into(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        let total = out_l.len().min(out_r.len());
        if !self.context_running.get() {
            out_l[..total].fill(0.0);
            out_r[..total].fill(0.0);
            return;
        }

        let mut offset = 0;
        while offset < total {
            let frames = (total - offset).min(self.spec.max_block);

            self.mix_l[..frames].fill(0.0);
            self.mix_r[..frames].fill(0.0);
            self.rev_in_l[..frames].fill(0.0);
            self.rev_in_r[..frames].fill(0.0);
            self.del_in_l[..frames].fill(0.0);
            self.del_in_r[..frames].fill(0.0);

            for chain in self.chains.iter_mut() {
                chain.render_block(
                    frames,
                    &mut self.mix_l[..frames],
                    &mut self.mix_r[..frames],
                    &mut self.rev_in_l[..frames],
                    &mut self.rev_in_r[..frames],
                    &mut self.del_in_l[..frames],
                    &mut self.del_in_r[..frames],
                );
            }

            // Buses run every block, sends or not, so tails keep decaying
            self.reverb.render(
                &mut self.rev_in_l[..frames],
                &mut self.rev_in_r[..frames],
                &mut self.mix_l[..frames],
                &mut self.mix_r[..frames],
            );
            self.delay.render(
                &mut self.del_in_l[..frames],
                &mut self.del_in_r[..frames],
                &mut self.mix_l[..frames],
                &mut self.mix_r[..frames],
            );

            let gain = self.master_gain.get();
            for s in self.mix_l[..frames].iter_mut() {
                *s *= gain;
            }
            for s in self.mix_r[..frames].iter_mut() {
                *s *= gain;
            }

            let cutoff = self.macro_cutoff.get() as f64;
            self.master_lpf.set_frequency(cutoff);
            self.master_lpf
                .process_stereo(&mut self.mix_l[..frames], &mut self.mix_r[..frames]);

            self.master_tap
                .push_block(&self.mix_l[..frames], &self.mix_r[..frames]);

            out_l[offset..offset + frames].copy_from_slice(&self.mix_l[..frames]);
            out_r[offset..offset + frames].copy_from_slice(&self.mix_r[..frames]);
            self.clock.advance(frames as u64);
            offset += frames;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::AudioBuffer;

    const TEST_RATE: u32 = 8000;

    fn stem(id: &str, samples: Vec<f32>) -> LoadedStem {
        LoadedStem {
            id: id.to_string(),
            name: id.to_string(),
            source_url: format!("{}.wav", id),
            checksum: "0".repeat(64),
            buffer: AudioBuffer {
                samples: vec![samples.clone(), samples],
                sample_rate: TEST_RATE,
            },
        }
    }

    fn graph(stems: Vec<LoadedStem>) -> SignalGraph {
        let spec = AudioContextSpec {
            sample_rate: TEST_RATE,
            channels: 2,
            max_block: 128,
        };
        let clock = Arc::new(AudioClock::new(TEST_RATE));
        SignalGraph::new(spec, clock, stems).unwrap()
    }

    fn render(g: &mut SignalGraph, frames: usize) -> Vec<f32> {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        g.render_into(&mut left, &mut right);
        left
    }

    fn rms(xs: &[f32]) -> f32 {
        (xs.iter().map(|x| x * x).sum::<f32>() / xs.len() as f32).sqrt()
    }

    // ------------------------------------------------------------------
    // Context validation
    // ------------------------------------------------------------------

    #[test]
    fn test_spec_rejects_zero_rate() {
        let spec = AudioContextSpec {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(matches!(
            spec.validate(),
            Err(StemmixError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_spec_rejects_mono() {
        let spec = AudioContextSpec {
            channels: 1,
            ..Default::default()
        };
        assert!(matches!(
            spec.validate(),
            Err(StemmixError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn test_low_rate_is_accepted() {
        let spec = AudioContextSpec {
            sample_rate: 11_025,
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    #[test]
    fn test_unarmed_graph_renders_silence_but_clock_runs() {
        let mut g = graph(vec![stem("stem-0", vec![1.0; 1024])]);
        let out = render(&mut g, 512);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(g.clock.frames(), 512);
    }

    #[test]
    fn test_armed_stems_sum_through_master_gain() {
        let mut g = graph(vec![
            stem("stem-0", vec![0.5; 4096]),
            stem("stem-1", vec![0.25; 4096]),
        ]);
        g.set_stem_gain("stem-0", 1.0);
        g.set_stem_gain("stem-1", 1.0);
        g.set_master_gain(1.0);
        g.arm_all_sources();

        let out = render(&mut g, 512);
        // Steady-state DC passes the wide-open low-pass at unity
        for &s in &out[200..] {
            assert!((s - 0.75).abs() < 0.01, "expected 0.75, got {}", s);
        }
    }

    #[test]
    fn test_default_gains_follow_volume_75() {
        let mut g = graph(vec![stem("stem-0", vec![1.0; 4096])]);
        g.arm_all_sources();
        let out = render(&mut g, 512);
        // 1.0 source through stem gain 0.75 and master gain 0.75
        let expected = 0.75 * 0.75;
        assert!((out[300] - expected).abs() < 0.01);
    }

    #[test]
    fn test_suspend_freezes_clock_and_mutes_output() {
        let mut g = graph(vec![stem("stem-0", vec![0.5; 4096])]);
        g.arm_all_sources();
        render(&mut g, 256);
        assert_eq!(g.clock.frames(), 256);

        g.suspend();
        let out = render(&mut g, 256);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(g.clock.frames(), 256, "suspended clock must not advance");

        g.resume();
        g.resume(); // resuming a running context is a no-op
        let out = render(&mut g, 256);
        assert!(out.iter().any(|&s| s != 0.0));
        assert_eq!(g.clock.frames(), 512);
    }

    // ------------------------------------------------------------------
    // Macro filter
    // ------------------------------------------------------------------

    #[test]
    fn test_macro_sweep_darkens_and_raises_reverb() {
        let tone: Vec<f32> = (0..16384)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / TEST_RATE as f32).sin())
            .collect();
        let mut g = graph(vec![stem("stem-0", tone)]);
        g.set_stem_gain("stem-0", 1.0);
        g.set_master_gain(1.0);
        g.arm_all_sources();

        g.set_macro_lpf(100.0);
        assert_eq!(g.macro_cutoff_hz(), MACRO_LPF_MAX_HZ);
        assert_eq!(g.reverb_return_gain(), 0.0);
        let open = render(&mut g, 4096);

        g.set_macro_lpf(0.0);
        assert_eq!(g.macro_cutoff_hz(), MACRO_LPF_MIN_HZ);
        assert_eq!(g.reverb_return_gain(), MACRO_REVERB_RETURN_MAX);
        let closed = render(&mut g, 4096);

        // Skip the re-settling region after the coefficient jump
        assert!(rms(&closed[2048..]) < rms(&open[2048..]) * 0.05);
    }

    #[test]
    fn test_macro_midpoint_cutoff_is_exponential() {
        let g = graph(vec![]);
        g.set_macro_lpf(50.0);
        // 20 * 1000^0.5
        assert!((g.macro_cutoff_hz() - 632.45).abs() < 0.1);
    }

    // ------------------------------------------------------------------
    // Sends and buses
    // ------------------------------------------------------------------

    #[test]
    fn test_delay_send_echoes_into_master() {
        let mut impulse = vec![0.0_f32; 4096];
        impulse[0] = 1.0;
        let mut g = graph(vec![stem("stem-0", impulse)]);
        g.set_stem_gain("stem-0", 1.0);
        g.set_master_gain(1.0);
        g.set_stem_send("stem-0", SendBus::Delay, 1.0);
        g.arm_all_sources();

        let out = render(&mut g, 4096);
        let echo_at = (TEST_RATE as f64 * bus::DELAY_TIME_SECS) as usize;

        // Dry impulse lands immediately
        assert!(out[0].abs() > 0.5);
        // Quiet between the dry hit and the first echo
        assert!(out[echo_at / 2..echo_at - 10].iter().all(|s| s.abs() < 5e-3));
        // First echo at the delay time, scaled by the 0.3 return
        let echo = out[echo_at - 5..echo_at + 5]
            .iter()
            .map(|s| s.abs())
            .fold(0.0, f32::max);
        assert!((echo - 0.3).abs() < 0.05, "echo peak {}", echo);
    }

    #[test]
    fn test_reverb_send_adds_energy() {
        let mut g = graph(vec![stem("stem-0", vec![0.5; 8192])]);
        g.set_stem_gain("stem-0", 1.0);
        g.set_master_gain(1.0);
        g.arm_all_sources();
        let dry = render(&mut g, 2048);

        let mut wet_graph = graph(vec![stem("stem-0", vec![0.5; 8192])]);
        wet_graph.set_stem_gain("stem-0", 1.0);
        wet_graph.set_master_gain(1.0);
        wet_graph.set_stem_send("stem-0", SendBus::Reverb, 1.0);
        wet_graph.arm_all_sources();
        let wet = render(&mut wet_graph, 2048);

        // The convolved tail must change the signal it is mixed into
        let diff: f32 = dry
            .iter()
            .zip(wet.iter())
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(diff > 0.1, "reverb return added nothing (diff {})", diff);
    }

    // ------------------------------------------------------------------
    // Analysis taps
    // ------------------------------------------------------------------

    #[test]
    fn test_spectrum_polling_and_resolution() {
        let tone: Vec<f32> = (0..4096)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / TEST_RATE as f32).sin())
            .collect();
        let mut g = graph(vec![stem("stem-0", tone)]);
        g.arm_all_sources();
        render(&mut g, 1024);

        let master = g.poll_master_spectrum();
        assert_eq!(master.len(), MASTER_TAP_WINDOW / 2);
        assert!(master.iter().any(|&b| b > 0));

        let stem_bins = g.poll_stem_spectrum("stem-0").unwrap();
        assert_eq!(stem_bins.len(), STEM_TAP_WINDOW / 2);
        assert!(stem_bins.iter().any(|&b| b > 0));

        g.set_analysis_resolution(TapTarget::Master, 128);
        g.set_analysis_resolution(TapTarget::Stem("stem-0"), 128);
        assert_eq!(g.poll_master_spectrum().len(), 64);
        assert_eq!(g.poll_stem_spectrum("stem-0").unwrap().len(), 64);

        // A zero-size request is ignored, not planned
        g.set_analysis_resolution(TapTarget::Master, 0);
        assert_eq!(g.poll_master_spectrum().len(), 64);
    }

    #[test]
    fn test_unknown_stem_is_ignored() {
        let mut g = graph(vec![stem("stem-0", vec![0.5; 256])]);
        g.set_stem_gain("missing", 0.0);
        g.set_stem_eq("missing", EqBand::Low, 12.0);
        g.set_stem_send("missing", SendBus::Reverb, 1.0);
        assert_eq!(g.poll_stem_spectrum("missing"), None);
        assert_eq!(g.stem_gain("missing"), None);
        assert_eq!(g.stem_gain("stem-0"), Some(chain::DEFAULT_STEM_GAIN));
    }
}
