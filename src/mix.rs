//! Mix policy: the authoritative model of every user-facing control.
//!
//! `MixState` owns the stored control values and translates intents into
//! graph parameter writes. The graph holds resolved numbers only; policy
//! like "solo silences everyone else" lives here, and after every mutation
//! the graph's gain cells match what the rule says they should be.

use crate::engine::loader::LoadedStem;
use crate::graph::{
    EqBand, SendBus, SignalGraph, TapTarget, MASTER_TAP_WINDOW, STEM_TAP_WINDOW,
};
use crate::profile::LITE_TAP_WINDOW;
use serde::{Deserialize, Serialize};

/// Stored control defaults.
pub const DEFAULT_VOLUME: f32 = 75.0;
pub const DEFAULT_MACRO_LPF: f32 = 100.0;
/// Peaking bands accept this much boost or cut.
pub const EQ_DB_RANGE: f32 = 12.0;

/// Per-band EQ amounts in dB.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EqSettings {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

/// Stored FX send percentages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FxSettings {
    pub reverb: f32,
    pub delay: f32,
}

/// Everything the user can set on one stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemChannelState {
    pub id: String,
    pub name: String,
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
    pub eq: EqSettings,
    pub fx: FxSettings,
}

impl StemChannelState {
    fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            volume: DEFAULT_VOLUME,
            muted: false,
            solo: false,
            eq: EqSettings::default(),
            fx: FxSettings::default(),
        }
    }
}

/// Master-section controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterState {
    pub master_volume: f32,
    pub macro_lpf: f32,
    pub lite_mode: bool,
}

impl Default for MasterState {
    fn default() -> Self {
        Self {
            master_volume: DEFAULT_VOLUME,
            macro_lpf: DEFAULT_MACRO_LPF,
            lite_mode: false,
        }
    }
}

/// The gain a stem's node must hold given the mute/solo picture.
///
/// With any stem soloed, solo membership is the only thing that matters:
/// soloed stems play at their volume even when muted, everything else is
/// silent. With no solo active, mute wins.
pub fn effective_gain(volume: f32, muted: bool, solo: bool, any_solo: bool) -> f32 {
    if any_solo {
        if solo {
            volume / 100.0
        } else {
            0.0
        }
    } else if muted {
        0.0
    } else {
        volume / 100.0
    }
}

/// Control model for a loaded stem set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixState {
    stems: Vec<StemChannelState>,
    master: MasterState,
}

impl MixState {
    /// Fresh state with defaults for every loaded stem, in load order.
    pub fn from_loaded(stems: &[LoadedStem]) -> Self {
        Self {
            stems: stems
                .iter()
                .map(|s| StemChannelState::new(s.id.clone(), s.name.clone()))
                .collect(),
            master: MasterState::default(),
        }
    }

    pub fn stems(&self) -> &[StemChannelState] {
        &self.stems
    }

    pub fn stem(&self, id: &str) -> Option<&StemChannelState> {
        self.stems.iter().find(|s| s.id == id)
    }

    pub fn master(&self) -> &MasterState {
        &self.master
    }

    pub fn any_solo(&self) -> bool {
        self.stems.iter().any(|s| s.solo)
    }

    /// Push the full stored state into the graph. Run once after the graph
    /// is built so stored values and node values start out agreeing.
    pub fn sync(&self, graph: &SignalGraph) {
        self.refresh_all_gains(graph);
        for stem in &self.stems {
            graph.set_stem_eq(&stem.id, EqBand::Low, stem.eq.low);
            graph.set_stem_eq(&stem.id, EqBand::Mid, stem.eq.mid);
            graph.set_stem_eq(&stem.id, EqBand::High, stem.eq.high);
            graph.set_stem_send(&stem.id, SendBus::Reverb, stem.fx.reverb / 100.0);
            graph.set_stem_send(&stem.id, SendBus::Delay, stem.fx.delay / 100.0);
        }
        graph.set_master_gain(self.master.master_volume / 100.0);
        // The coupled reverb return follows the macro only once the knob has
        // moved; at the default the bus keeps its wiring-time return level
        if self.master.macro_lpf != DEFAULT_MACRO_LPF {
            graph.set_macro_lpf(self.master.macro_lpf);
        }
    }

    // ========================================================================
    // Gain policy
    // ========================================================================

    pub fn set_volume(&mut self, graph: &SignalGraph, id: &str, volume: f32) {
        let any_solo = self.any_solo();
        if let Some(stem) = self.stems.iter_mut().find(|s| s.id == id) {
            stem.volume = volume.clamp(0.0, 100.0);
            graph.set_stem_gain(
                &stem.id,
                effective_gain(stem.volume, stem.muted, stem.solo, any_solo),
            );
        }
    }

    pub fn toggle_mute(&mut self, graph: &SignalGraph, id: &str) {
        let any_solo = self.any_solo();
        if let Some(stem) = self.stems.iter_mut().find(|s| s.id == id) {
            stem.muted = !stem.muted;
            log::debug!("stem {} muted: {}", stem.id, stem.muted);
            graph.set_stem_gain(
                &stem.id,
                effective_gain(stem.volume, stem.muted, stem.solo, any_solo),
            );
        }
    }

    /// Flip a stem's solo flag and re-resolve every stem's gain in one pass,
    /// since solo state is global.
    pub fn toggle_solo(&mut self, graph: &SignalGraph, id: &str) {
        let Some(stem) = self.stems.iter_mut().find(|s| s.id == id) else {
            return;
        };
        stem.solo = !stem.solo;
        log::debug!("stem {} solo: {}", stem.id, stem.solo);
        self.refresh_all_gains(graph);
    }

    fn refresh_all_gains(&self, graph: &SignalGraph) {
        let any_solo = self.any_solo();
        for stem in &self.stems {
            graph.set_stem_gain(
                &stem.id,
                effective_gain(stem.volume, stem.muted, stem.solo, any_solo),
            );
        }
    }

    // ========================================================================
    // EQ and sends
    // ========================================================================

    pub fn set_eq(&mut self, graph: &SignalGraph, id: &str, band: EqBand, db: f32) {
        if let Some(stem) = self.stems.iter_mut().find(|s| s.id == id) {
            let db = db.clamp(-EQ_DB_RANGE, EQ_DB_RANGE);
            match band {
                EqBand::Low => stem.eq.low = db,
                EqBand::Mid => stem.eq.mid = db,
                EqBand::High => stem.eq.high = db,
            }
            graph.set_stem_eq(&stem.id, band, db);
        }
    }

    pub fn set_send(&mut self, graph: &SignalGraph, id: &str, bus: SendBus, amount: f32) {
        if let Some(stem) = self.stems.iter_mut().find(|s| s.id == id) {
            let amount = amount.clamp(0.0, 100.0);
            match bus {
                SendBus::Reverb => stem.fx.reverb = amount,
                SendBus::Delay => stem.fx.delay = amount,
            }
            graph.set_stem_send(&stem.id, bus, amount / 100.0);
        }
    }

    // ========================================================================
    // Master section
    // ========================================================================

    pub fn set_master_volume(&mut self, graph: &SignalGraph, volume: f32) {
        self.master.master_volume = volume.clamp(0.0, 100.0);
        graph.set_master_gain(self.master.master_volume / 100.0);
    }

    pub fn set_macro_lpf(&mut self, graph: &SignalGraph, amount: f32) {
        self.master.macro_lpf = amount.clamp(0.0, 100.0);
        graph.set_macro_lpf(self.master.macro_lpf);
    }

    /// Switch the performance profile.
    ///
    /// Enabling zeroes every live FX send (the stored percentages stay, so
    /// the mix model still shows what the user dialed in) and drops all
    /// analysis windows to the lite size. Disabling restores resolution but
    /// deliberately leaves sends at zero; users re-dial them.
    pub fn set_lite_mode(&mut self, graph: &mut SignalGraph, enabled: bool) {
        if self.master.lite_mode == enabled {
            return;
        }
        self.master.lite_mode = enabled;
        log::info!("lite mode {}", if enabled { "enabled" } else { "disabled" });

        if enabled {
            for stem in &self.stems {
                graph.set_stem_send(&stem.id, SendBus::Reverb, 0.0);
                graph.set_stem_send(&stem.id, SendBus::Delay, 0.0);
            }
        }

        let (master_window, stem_window) = if enabled {
            (LITE_TAP_WINDOW, LITE_TAP_WINDOW)
        } else {
            (MASTER_TAP_WINDOW, STEM_TAP_WINDOW)
        };
        graph.set_analysis_resolution(TapTarget::Master, master_window);
        for stem in &self.stems {
            graph.set_analysis_resolution(TapTarget::Stem(stem.id.as_str()), stem_window);
        }
    }
}
