//! Transport state machine.
//!
//! Tracks the playback lifecycle and the shared start timestamp that keeps
//! all stems sample-aligned. Source scheduling itself lives in the signal
//! graph; the transport decides *whether* playback may start and records
//! *when* it did, against the engine's [`AudioClock`].

use std::fmt;
use std::sync::Arc;

use crate::engine::clock::AudioClock;
use crate::error::{Result, StemmixError};

/// Playback lifecycle states.
///
/// `Ready` is reached only after the load barrier completes with at least
/// one stem decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No stems loaded yet; playback requests are rejected.
    #[default]
    Uninitialized,
    /// Stems loaded, graph wired, never played or stopped after load.
    Ready,
    /// Sources are scheduled and the graph is rendering.
    Playing,
    /// Sources discarded; the next play reschedules from the top.
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Uninitialized => write!(f, "uninitialized"),
            TransportState::Ready => write!(f, "ready"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
        }
    }
}

/// Manages transport state and the shared playback start timestamp.
#[derive(Debug)]
pub struct Transport {
    state: TransportState,
    clock: Arc<AudioClock>,
    /// Audio-clock time recorded by the last `play()`.
    start_time: f64,
    /// Audio-clock time recorded by the last `pause()`.
    paused_at: f64,
    started_once: bool,
}

impl Transport {
    pub fn new(clock: Arc<AudioClock>) -> Self {
        Self {
            state: TransportState::Uninitialized,
            clock,
            start_time: 0.0,
            paused_at: 0.0,
            started_once: false,
        }
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Mark the engine ready for playback. Called once the load barrier
    /// settles with at least one stem, and again after a reload.
    pub fn mark_ready(&mut self) {
        self.state = TransportState::Ready;
        self.started_once = false;
        self.start_time = 0.0;
        self.paused_at = 0.0;
        log::debug!("transport ready");
    }

    /// Drop back to the uninitialized state, clearing every timing mark.
    /// Disposal uses this so a dead engine reads as never started.
    pub fn mark_uninitialized(&mut self) {
        self.state = TransportState::Uninitialized;
        self.started_once = false;
        self.start_time = 0.0;
        self.paused_at = 0.0;
        log::debug!("transport uninitialized");
    }

    /// Begin playback.
    ///
    /// Records the shared start timestamp from the audio clock and returns
    /// it so the caller can schedule every stem source against the same
    /// instant. Calling play while already playing is a no-op and returns
    /// the timestamp in effect.
    pub fn play(&mut self) -> Result<f64> {
        match self.state {
            TransportState::Uninitialized => Err(StemmixError::NotReady {
                operation: "play".to_string(),
                state: self.state.to_string(),
            }),
            TransportState::Playing => Ok(self.start_time),
            TransportState::Ready | TransportState::Paused => {
                self.start_time = self.clock.now_secs();
                self.started_once = true;
                self.state = TransportState::Playing;
                log::debug!("transport play at {:.3}s", self.start_time);
                Ok(self.start_time)
            }
        }
    }

    /// Pause playback. The caller discards its source nodes; they are
    /// single-use and will be recreated by the next `play()`. A pause in
    /// any non-playing state is a no-op.
    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.paused_at = self.clock.now_secs();
            self.state = TransportState::Paused;
            log::debug!("transport paused at {:.3}s", self.paused_at);
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Seconds of audio-clock time since the last `play()`, or `0.0` before
    /// the first play. While paused this holds at the pause point even if
    /// the host keeps pulling (silent) blocks.
    pub fn elapsed_secs(&self) -> f64 {
        if !self.started_once {
            return 0.0;
        }
        let until = match self.state {
            TransportState::Paused => self.paused_at,
            _ => self.clock.now_secs(),
        };
        (until - self.start_time).max(0.0)
    }

    /// Audio-clock timestamp recorded by the last `play()`.
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_ready(&self) -> bool {
        self.state != TransportState::Uninitialized
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn transport_at(sample_rate: u32) -> (Transport, Arc<AudioClock>) {
        let clock = Arc::new(AudioClock::new(sample_rate));
        (Transport::new(Arc::clone(&clock)), clock)
    }

    // ------------------------------------------------------------------------
    // State Transition Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_initial_state_is_uninitialized() {
        let (transport, _clock) = transport_at(48000);
        assert_eq!(transport.state(), TransportState::Uninitialized);
        assert!(!transport.is_playing());
        assert!(!transport.is_ready());
    }

    #[test]
    fn test_play_before_ready_is_rejected() {
        let (mut transport, _clock) = transport_at(48000);
        let err = transport.play().unwrap_err();
        match err {
            StemmixError::NotReady { operation, state } => {
                assert_eq!(operation, "play");
                assert_eq!(state, "uninitialized");
            }
            other => panic!("expected NotReady, got {:?}", other),
        }
        assert_eq!(transport.state(), TransportState::Uninitialized);
    }

    #[test]
    fn test_ready_to_playing() {
        let (mut transport, _clock) = transport_at(48000);
        transport.mark_ready();
        assert_eq!(transport.state(), TransportState::Ready);

        transport.play().unwrap();
        assert!(transport.is_playing());
    }

    #[test]
    fn test_playing_to_paused_and_back() {
        let (mut transport, _clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();

        transport.pause();
        assert_eq!(transport.state(), TransportState::Paused);

        transport.play().unwrap();
        assert!(transport.is_playing());
    }

    #[test]
    fn test_pause_when_not_playing_is_no_op() {
        let (mut transport, _clock) = transport_at(48000);
        transport.pause();
        assert_eq!(transport.state(), TransportState::Uninitialized);

        transport.mark_ready();
        transport.pause();
        assert_eq!(transport.state(), TransportState::Ready);
    }

    #[test]
    fn test_double_play_keeps_original_timestamp() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();

        clock.advance(48000);
        let first = transport.play().unwrap();
        clock.advance(48000);
        let second = transport.play().unwrap();

        assert_relative_eq!(first, second);
        assert!(transport.is_playing());
    }

    // ------------------------------------------------------------------------
    // Timing Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_elapsed_is_zero_before_first_play() {
        let (transport, clock) = transport_at(48000);
        clock.advance(96000);
        assert_relative_eq!(transport.elapsed_secs(), 0.0);
    }

    #[test]
    fn test_elapsed_immediately_after_play_is_zero() {
        let (mut transport, _clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();
        assert!(transport.elapsed_secs() >= 0.0);
        assert!(transport.elapsed_secs() < 0.001);
    }

    #[test]
    fn test_elapsed_tracks_clock_advance() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();

        clock.advance(48000 * 5);
        assert_relative_eq!(transport.elapsed_secs(), 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_play_records_shared_start_timestamp() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();

        clock.advance(24000);
        let stamp = transport.play().unwrap();
        assert_relative_eq!(stamp, 0.5, epsilon = 1e-9);
        assert_relative_eq!(transport.start_time(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_elapsed_freezes_while_paused() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();
        clock.advance(48000 * 2);
        transport.pause();

        clock.advance(48000 * 3);
        assert_relative_eq!(transport.elapsed_secs(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_replay_after_pause_resets_elapsed() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();
        clock.advance(48000 * 3);
        transport.pause();

        transport.play().unwrap();
        assert!(transport.elapsed_secs() < 0.001);

        clock.advance(48000);
        assert_relative_eq!(transport.elapsed_secs(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_mark_ready_after_reload_clears_start() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();
        clock.advance(48000);

        transport.mark_ready();
        assert_eq!(transport.state(), TransportState::Ready);
        assert_relative_eq!(transport.elapsed_secs(), 0.0);
    }

    #[test]
    fn test_mark_uninitialized_rejects_further_play() {
        let (mut transport, clock) = transport_at(48000);
        transport.mark_ready();
        transport.play().unwrap();
        clock.advance(48000 * 2);

        transport.mark_uninitialized();
        assert_eq!(transport.state(), TransportState::Uninitialized);
        assert!(!transport.is_ready());
        assert_relative_eq!(transport.elapsed_secs(), 0.0);
        assert!(transport.play().is_err());
    }

    #[test]
    fn test_transport_state_display() {
        assert_eq!(format!("{}", TransportState::Uninitialized), "uninitialized");
        assert_eq!(format!("{}", TransportState::Ready), "ready");
        assert_eq!(format!("{}", TransportState::Playing), "playing");
        assert_eq!(format!("{}", TransportState::Paused), "paused");
    }
}
