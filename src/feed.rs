//! Per-frame visualization sampling.
//!
//! External renderers (spectrum bars, level meters) pull one `FrameSample`
//! per display frame. Sampling always reads the taps' current state; frames
//! are never buffered, so a slow consumer sees fresh data instead of a
//! backlog.

use crate::graph::SignalGraph;
use serde::Serialize;
use std::time::{Duration, Instant};

/// How long a held peak survives without being beaten.
pub const PEAK_HOLD: Duration = Duration::from_millis(1000);
/// Meter zone thresholds. These are a contract with renderers, not
/// cosmetics.
pub const HOT_THRESHOLD: f32 = 0.8;
pub const WARM_THRESHOLD: f32 = 0.6;

/// Renderer-facing meter zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelZone {
    Safe,
    Warm,
    Hot,
}

impl LevelZone {
    pub fn classify(level: f32) -> Self {
        if level > HOT_THRESHOLD {
            Self::Hot
        } else if level > WARM_THRESHOLD {
            Self::Warm
        } else {
            Self::Safe
        }
    }
}

/// RMS and peak of a byte spectrum, normalized to `[0, 1]`.
pub fn rms_and_peak(bins: &[u8]) -> (f32, f32) {
    if bins.is_empty() {
        return (0.0, 0.0);
    }
    let mut sum_sq = 0.0_f32;
    let mut peak = 0.0_f32;
    for &b in bins {
        let x = b as f32 / 255.0;
        sum_sq += x * x;
        if x > peak {
            peak = x;
        }
    }
    ((sum_sq / bins.len() as f32).sqrt(), peak)
}

/// Time-based peak hold. The held value is replaced when a new peak exceeds
/// it, or when it has sat unbeaten past the hold window; there is no decay
/// curve in between.
#[derive(Debug)]
pub struct PeakHold {
    held: f32,
    updated: Instant,
    hold: Duration,
}

impl PeakHold {
    pub fn new() -> Self {
        Self::with_hold(PEAK_HOLD)
    }

    pub fn with_hold(hold: Duration) -> Self {
        Self {
            held: 0.0,
            updated: Instant::now(),
            hold,
        }
    }

    /// Feed one observation and get the current held value back.
    pub fn observe(&mut self, peak: f32) -> f32 {
        if peak > self.held || self.updated.elapsed() > self.hold {
            self.held = peak;
            self.updated = Instant::now();
        }
        self.held
    }

    pub fn held(&self) -> f32 {
        self.held
    }
}

impl Default for PeakHold {
    fn default() -> Self {
        Self::new()
    }
}

/// Meter values computed from one spectrum snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelReading {
    pub rms: f32,
    pub peak: f32,
    pub peak_held: f32,
    pub zone: LevelZone,
}

impl LevelReading {
    pub fn compute(bins: &[u8], hold: &mut PeakHold) -> Self {
        let (rms, peak) = rms_and_peak(bins);
        Self {
            rms,
            peak,
            peak_held: hold.observe(peak),
            zone: LevelZone::classify(rms),
        }
    }
}

/// One stem's slice of a frame.
#[derive(Debug, Clone, Serialize)]
pub struct StemFrame {
    pub id: String,
    pub bins: Vec<u8>,
    pub level: LevelReading,
}

/// Snapshot of every tap at one display frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameSample {
    pub elapsed_secs: f64,
    pub master_bins: Vec<u8>,
    pub master_level: LevelReading,
    pub stems: Vec<StemFrame>,
}

/// Pulls tap snapshots and keeps per-meter hold state between frames.
///
/// The feed itself is stateless about audio: stopping and restarting
/// playback needs no feed reset, the next sample simply reads whatever the
/// taps hold then.
#[derive(Debug)]
pub struct VisualizationFeed {
    master_hold: PeakHold,
    stem_holds: Vec<(String, PeakHold)>,
}

impl VisualizationFeed {
    pub fn new(stem_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            master_hold: PeakHold::new(),
            stem_holds: stem_ids
                .into_iter()
                .map(|id| (id, PeakHold::new()))
                .collect(),
        }
    }

    /// Read the current state of every tap.
    pub fn sample(&mut self, graph: &mut SignalGraph, elapsed_secs: f64) -> FrameSample {
        let master_bins = graph.poll_master_spectrum();
        let master_level = LevelReading::compute(&master_bins, &mut self.master_hold);

        let stems = self
            .stem_holds
            .iter_mut()
            .filter_map(|(id, hold)| {
                graph.poll_stem_spectrum(id).map(|bins| {
                    let level = LevelReading::compute(&bins, hold);
                    StemFrame {
                        id: id.clone(),
                        bins,
                        level,
                    }
                })
            })
            .collect();

        FrameSample {
            elapsed_secs,
            master_bins,
            master_level,
            stems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::AudioBuffer;
    use crate::engine::clock::AudioClock;
    use crate::engine::loader::LoadedStem;
    use crate::graph::AudioContextSpec;
    use std::sync::Arc;

    // ------------------------------------------------------------------
    // Level math
    // ------------------------------------------------------------------

    #[test]
    fn test_rms_and_peak_extremes() {
        let (rms, peak) = rms_and_peak(&[255; 64]);
        assert_eq!(rms, 1.0);
        assert_eq!(peak, 1.0);

        let (rms, peak) = rms_and_peak(&[0; 64]);
        assert_eq!(rms, 0.0);
        assert_eq!(peak, 0.0);

        assert_eq!(rms_and_peak(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_rms_of_uniform_bins() {
        let (rms, peak) = rms_and_peak(&[128; 32]);
        let x = 128.0 / 255.0;
        assert!((rms - x).abs() < 1e-6);
        assert!((peak - x).abs() < 1e-6);
    }

    #[test]
    fn test_peak_dominates_rms() {
        let mut bins = vec![0_u8; 64];
        bins[10] = 255;
        let (rms, peak) = rms_and_peak(&bins);
        assert_eq!(peak, 1.0);
        assert!(rms < 0.2);
    }

    #[test]
    fn test_zone_thresholds_are_strict() {
        assert_eq!(LevelZone::classify(0.81), LevelZone::Hot);
        assert_eq!(LevelZone::classify(0.8), LevelZone::Warm);
        assert_eq!(LevelZone::classify(0.61), LevelZone::Warm);
        assert_eq!(LevelZone::classify(0.6), LevelZone::Safe);
        assert_eq!(LevelZone::classify(0.0), LevelZone::Safe);
    }

    // ------------------------------------------------------------------
    // Peak hold
    // ------------------------------------------------------------------

    #[test]
    fn test_peak_hold_keeps_maximum() {
        let mut hold = PeakHold::with_hold(Duration::from_secs(60));
        assert_eq!(hold.observe(0.5), 0.5);
        assert_eq!(hold.observe(0.3), 0.5);
        assert_eq!(hold.observe(0.7), 0.7);
        assert_eq!(hold.held(), 0.7);
    }

    #[test]
    fn test_peak_hold_times_out() {
        let mut hold = PeakHold::with_hold(Duration::from_millis(10));
        hold.observe(0.9);
        std::thread::sleep(Duration::from_millis(25));
        // Past the hold window a lower peak takes over
        assert_eq!(hold.observe(0.2), 0.2);
    }

    // ------------------------------------------------------------------
    // Frame sampling
    // ------------------------------------------------------------------

    fn rig() -> (VisualizationFeed, SignalGraph) {
        let tone: Vec<f32> = (0..8192)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 500.0 * i as f32 / 8000.0).sin())
            .collect();
        let stems = vec![LoadedStem {
            id: "stem-0".to_string(),
            name: "Bass".to_string(),
            source_url: "bass.wav".to_string(),
            checksum: "0".repeat(64),
            buffer: AudioBuffer {
                samples: vec![tone.clone(), tone],
                sample_rate: 8000,
            },
        }];
        let feed = VisualizationFeed::new(stems.iter().map(|s| s.id.clone()));
        let spec = AudioContextSpec {
            sample_rate: 8000,
            channels: 2,
            max_block: 128,
        };
        let graph = SignalGraph::new(spec, Arc::new(AudioClock::new(8000)), stems).unwrap();
        (feed, graph)
    }

    #[test]
    fn test_sample_reads_current_taps() {
        let (mut feed, mut graph) = rig();
        graph.arm_all_sources();
        let mut l = vec![0.0; 1024];
        let mut r = vec![0.0; 1024];
        graph.render_into(&mut l, &mut r);

        let frame = feed.sample(&mut graph, 0.128);
        assert_eq!(frame.elapsed_secs, 0.128);
        assert_eq!(frame.master_bins.len(), 256);
        assert_eq!(frame.stems.len(), 1);
        assert_eq!(frame.stems[0].id, "stem-0");
        assert_eq!(frame.stems[0].bins.len(), 128);
        assert!(frame.master_level.rms > 0.0);
        assert!(frame.stems[0].level.peak > 0.0);
    }

    #[test]
    fn test_silent_graph_reads_safe_zero_levels() {
        let (mut feed, mut graph) = rig();
        // No sources armed: taps have only silence
        let mut l = vec![0.0; 512];
        let mut r = vec![0.0; 512];
        graph.render_into(&mut l, &mut r);

        let frame = feed.sample(&mut graph, 0.0);
        assert_eq!(frame.master_level.rms, 0.0);
        assert_eq!(frame.master_level.peak, 0.0);
        assert_eq!(frame.master_level.zone, LevelZone::Safe);
    }

    #[test]
    fn test_feed_tracks_only_known_stems() {
        let (_, mut graph) = rig();
        let mut feed = VisualizationFeed::new(vec!["stem-0".to_string(), "ghost".to_string()]);
        let frame = feed.sample(&mut graph, 0.0);
        // The ghost id resolves no tap and is simply absent
        assert_eq!(frame.stems.len(), 1);
        assert_eq!(frame.stems[0].id, "stem-0");
    }
}
