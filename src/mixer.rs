//! Top-level engine facade.
//!
//! [`StemMixer`] owns one playback session end to end: the load barrier,
//! the signal graph, the mix control surface, the transport, and the
//! visualization feed. Callers talk to this type and nothing below it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::{
    AssetLoader, AudioClock, LoadOutcome, LoadReport, LoaderConfig, Transport, TransportState,
};
use crate::error::{Result, StemmixError};
use crate::feed::{FrameSample, VisualizationFeed};
use crate::graph::{AudioContextSpec, EqBand, SendBus, SignalGraph};
use crate::manifest::{StemDescriptor, TrackManifest};
use crate::mix::{MasterState, MixState, StemChannelState};
use crate::profile::PerformanceProfile;

/// One stem-mixing session behind a single facade.
///
/// The signal graph sits in an `Option` so `dispose` can release the audio
/// resources deterministically; playback and control calls after disposal
/// fail with a clean error instead of touching freed state.
#[derive(Debug)]
pub struct StemMixer {
    /// Random id naming this session in logs and reports.
    session_id: String,
    created_at: DateTime<Utc>,
    spec: AudioContextSpec,
    clock: Arc<AudioClock>,
    loader: AssetLoader,
    /// Kept so an explicit reload can refetch the same sources.
    descriptors: Vec<StemDescriptor>,
    graph: Option<SignalGraph>,
    mix: MixState,
    feed: VisualizationFeed,
    transport: Transport,
    report: LoadReport,
}

impl StemMixer {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Probe the host, run the load barrier over the manifest's stems, and
    /// wire the full signal graph.
    ///
    /// Returns a mixer that is ready to play. Individual stem failures are
    /// recorded in the load report rather than failing construction; only
    /// an unusable host or a barrier where every stem failed is fatal.
    pub async fn initialize(manifest: &TrackManifest, config: LoaderConfig) -> Result<Self> {
        let spec = AudioContextSpec::probe()?;
        let profile = PerformanceProfile::detect();
        Self::initialize_with(spec, manifest.stem_descriptors(), config, profile).await
    }

    /// Construction with every environment decision made by the caller.
    /// [`StemMixer::initialize`] is this with a probed context spec and a
    /// detected performance profile.
    pub async fn initialize_with(
        spec: AudioContextSpec,
        descriptors: Vec<StemDescriptor>,
        config: LoaderConfig,
        profile: PerformanceProfile,
    ) -> Result<Self> {
        spec.validate()?;
        let clock = Arc::new(AudioClock::new(spec.sample_rate));
        let loader = AssetLoader::new(config, spec.sample_rate);
        let LoadOutcome { stems, report } = loader.load_all(&descriptors).await?;

        let mix = MixState::from_loaded(&stems);
        let feed = VisualizationFeed::new(stems.iter().map(|s| s.id.clone()));
        let graph = SignalGraph::new(spec, Arc::clone(&clock), stems)?;
        mix.sync(&graph);

        let mut transport = Transport::new(Arc::clone(&clock));
        transport.mark_ready();

        let mut mixer = Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            spec,
            clock,
            loader,
            descriptors,
            graph: Some(graph),
            mix,
            feed,
            transport,
            report,
        };
        if profile.is_lite() {
            mixer.set_lite_mode(true)?;
        }
        log::info!(
            "session {} initialized: {} stem(s) at {} Hz, profile {}",
            mixer.session_id,
            mixer.mix.stems().len(),
            spec.sample_rate,
            profile
        );
        Ok(mixer)
    }

    /// Refetch every stem and rebuild the graph in place.
    ///
    /// This is the explicit user-triggered retry path; nothing in the
    /// engine calls it automatically. On success playback stops and every
    /// control value returns to its default alongside the fresh graph.
    /// While the refetch is in flight the load report reads as pending; a
    /// barrier where every stem fails leaves it that way and keeps the
    /// prior graph playable.
    pub async fn reload(&mut self) -> Result<&LoadReport> {
        if self.graph.is_none() {
            return Err(Self::disposed("reload"));
        }
        self.report = LoadReport::pending(&self.descriptors);
        let LoadOutcome { stems, report } = self.loader.load_all(&self.descriptors).await?;

        self.mix = MixState::from_loaded(&stems);
        self.feed = VisualizationFeed::new(stems.iter().map(|s| s.id.clone()));
        let graph = SignalGraph::new(self.spec, Arc::clone(&self.clock), stems)?;
        self.mix.sync(&graph);
        self.graph = Some(graph);
        self.report = report;
        self.transport.mark_ready();
        log::info!(
            "session {} reloaded: {} stem(s)",
            self.session_id,
            self.mix.stems().len()
        );
        Ok(&self.report)
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start playback from the top of every stem.
    ///
    /// Resumes the graph if the host suspended it, records the shared start
    /// timestamp, then schedules fresh sources against that single instant
    /// so all stems stay sample-aligned. Calling play while already playing
    /// returns the timestamp in effect without restarting anything.
    pub fn play(&mut self) -> Result<f64> {
        let Some(graph) = self.graph.as_mut() else {
            return Err(Self::disposed("play"));
        };
        if self.transport.is_playing() {
            return self.transport.play();
        }
        graph.resume();
        let started_at = self.transport.play()?;
        graph.arm_all_sources();
        log::debug!("session {} playing from {:.3}s", self.session_id, started_at);
        Ok(started_at)
    }

    /// Stop playback and discard the live sources. Sources are single-use;
    /// the next `play` schedules new ones from position zero.
    pub fn pause(&mut self) -> Result<()> {
        let Some(graph) = self.graph.as_mut() else {
            return Err(Self::disposed("pause"));
        };
        self.transport.pause();
        graph.disarm_all_sources();
        Ok(())
    }

    /// Seconds of audio-clock time since playback started; `0.0` before the
    /// first play and held at the pause point while paused.
    pub fn elapsed_secs(&self) -> f64 {
        self.transport.elapsed_secs()
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    // ========================================================================
    // Rendering and Visualization
    // ========================================================================

    /// Render the next block of stereo output. The host audio callback owns
    /// this; control calls from other threads never block it.
    pub fn render_into(&mut self, out_l: &mut [f32], out_r: &mut [f32]) -> Result<()> {
        let Some(graph) = self.graph.as_mut() else {
            return Err(Self::disposed("render"));
        };
        graph.render_into(out_l, out_r);
        Ok(())
    }

    /// One visualization frame, or `None` when nothing is playing.
    ///
    /// Meant to be polled once per UI frame. Each call reads the taps'
    /// current windows, so a stalled consumer never builds a backlog; it
    /// just picks up the present state on its next poll.
    pub fn sample_frame(&mut self) -> Option<FrameSample> {
        if !self.transport.is_playing() {
            return None;
        }
        let elapsed = self.transport.elapsed_secs();
        let graph = self.graph.as_mut()?;
        Some(self.feed.sample(graph, elapsed))
    }

    // ========================================================================
    // Control Surface
    // ========================================================================

    /// Set a stem fader, `0..=100`. Unknown ids are ignored.
    pub fn set_stem_volume(&mut self, id: &str, volume: f32) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("set volume"));
        };
        self.mix.set_volume(graph, id, volume);
        Ok(())
    }

    /// Flip a stem's mute. Ignored while any stem is soloed, in the sense
    /// that the flag is recorded but solo keeps deciding audibility.
    pub fn toggle_mute(&mut self, id: &str) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("toggle mute"));
        };
        self.mix.toggle_mute(graph, id);
        Ok(())
    }

    /// Flip a stem's solo and re-evaluate every stem's audible gain.
    pub fn toggle_solo(&mut self, id: &str) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("toggle solo"));
        };
        self.mix.toggle_solo(graph, id);
        Ok(())
    }

    /// Set one EQ band in dB, clamped to +/-12.
    pub fn set_stem_eq(&mut self, id: &str, band: EqBand, db: f32) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("set eq"));
        };
        self.mix.set_eq(graph, id, band, db);
        Ok(())
    }

    /// Set a stem's effect send amount, `0..=100`.
    pub fn set_stem_send(&mut self, id: &str, bus: SendBus, amount: f32) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("set send"));
        };
        self.mix.set_send(graph, id, bus, amount);
        Ok(())
    }

    /// Set the master fader, `0..=100`.
    pub fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("set master volume"));
        };
        self.mix.set_master_volume(graph, volume);
        Ok(())
    }

    /// Drive the macro filter, `0..=100`. Cutoff and the coupled reverb
    /// return move together from one control.
    pub fn set_macro_lpf(&mut self, amount: f32) -> Result<()> {
        let Some(graph) = self.graph.as_ref() else {
            return Err(Self::disposed("set macro filter"));
        };
        self.mix.set_macro_lpf(graph, amount);
        Ok(())
    }

    /// Switch the reduced-work profile. Enabling zeroes the live sends and
    /// shrinks every analysis window; disabling restores the windows but
    /// leaves sends where lite mode put them.
    pub fn set_lite_mode(&mut self, enabled: bool) -> Result<()> {
        let Some(graph) = self.graph.as_mut() else {
            return Err(Self::disposed("set lite mode"));
        };
        self.mix.set_lite_mode(graph, enabled);
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn spec(&self) -> &AudioContextSpec {
        &self.spec
    }

    /// Per-stem control values, in load order.
    pub fn stems(&self) -> &[StemChannelState] {
        self.mix.stems()
    }

    pub fn stem(&self, id: &str) -> Option<&StemChannelState> {
        self.mix.stem(id)
    }

    pub fn master(&self) -> &MasterState {
        self.mix.master()
    }

    /// Outcome of the most recent load barrier.
    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// Banner text when some stems failed to load, `None` when all loaded.
    pub fn load_warning(&self) -> Option<String> {
        self.report.warning()
    }

    /// Duration of the longest loaded stem, in seconds. Zero once disposed.
    pub fn duration_secs(&self) -> f64 {
        self.graph.as_ref().map_or(0.0, |g| g.duration_secs())
    }

    pub fn is_disposed(&self) -> bool {
        self.graph.is_none()
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release the signal graph and its sample buffers. The transport drops
    /// back to uninitialized. Idempotent; every playback or control call
    /// after the first dispose fails cleanly.
    pub fn dispose(&mut self) {
        if let Some(graph) = self.graph.take() {
            graph.suspend();
            self.transport.mark_uninitialized();
            log::debug!("session {} disposed", self.session_id);
        }
    }

    fn disposed(operation: &str) -> StemmixError {
        StemmixError::NotReady {
            operation: operation.to_string(),
            state: "disposed".to_string(),
        }
    }
}

impl Drop for StemMixer {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
