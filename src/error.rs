//! Error handling for the stemmix engine.
//!
//! Per-stem load failures are recoverable and never abort the load barrier;
//! fatal conditions are surfaced once as terminal states so an embedding UI
//! can render a stable error view.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for stemmix operations
pub type Result<T> = std::result::Result<T, StemmixError>;

/// Why a single stem failed to load.
///
/// Carried inside [`StemmixError::StemLoadFailed`] and recorded per stem in
/// the load report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadFailureKind {
    /// The fetch exceeded its deadline and was aborted.
    Timeout,
    /// The server answered with a non-success status.
    HttpError { status: u16 },
    /// The bytes arrived but could not be decoded as audio.
    DecodeError { reason: String },
    /// The response was rejected by the cross-origin policy check.
    Cors,
    /// The transport layer failed before a response arrived.
    Network { reason: String },
}

impl std::fmt::Display for LoadFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadFailureKind::Timeout => write!(f, "timed out"),
            LoadFailureKind::HttpError { status } => write!(f, "HTTP {}", status),
            LoadFailureKind::DecodeError { reason } => {
                write!(f, "unsupported or corrupt audio data ({})", reason)
            }
            LoadFailureKind::Cors => write!(f, "blocked by cross-origin policy"),
            LoadFailureKind::Network { reason } => write!(f, "network error ({})", reason),
        }
    }
}

/// Main error type for stemmix operations
#[derive(Error, Debug)]
pub enum StemmixError {
    // Platform errors
    #[error("Real-time audio is not supported on this platform: {reason}")]
    UnsupportedPlatform { reason: String },

    // Load errors
    #[error("Failed to load stem \"{name}\": {kind}")]
    StemLoadFailed { name: String, kind: LoadFailureKind },

    #[error("No audio stems could be loaded. Please check your internet connection and try again.")]
    AllStemsFailed,

    // Playback errors
    #[error("Playback failed: {reason}")]
    PlaybackFailure { reason: String },

    #[error("Engine is not ready for {operation}: {state}")]
    NotReady { operation: String, state: String },

    // Manifest errors
    #[error("Invalid track manifest: {reason}")]
    InvalidManifest { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StemmixError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StemmixError::UnsupportedPlatform { .. } => "UNSUPPORTED_PLATFORM",
            StemmixError::StemLoadFailed { .. } => "STEM_LOAD_FAILED",
            StemmixError::AllStemsFailed => "ALL_STEMS_FAILED",
            StemmixError::PlaybackFailure { .. } => "PLAYBACK_FAILURE",
            StemmixError::NotReady { .. } => "NOT_READY",
            StemmixError::InvalidManifest { .. } => "INVALID_MANIFEST",
            StemmixError::Io(_) => "IO_ERROR",
            StemmixError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors leave the engine usable: a failed stem is excluded
    /// from playback, a failed playback start may be retried by the listener.
    pub fn is_recoverable(&self) -> bool {
        match self {
            StemmixError::StemLoadFailed { .. } => true,
            StemmixError::PlaybackFailure { .. } => true,
            StemmixError::NotReady { .. } => true,
            StemmixError::InvalidManifest { .. } => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StemmixError::UnsupportedPlatform { .. } => vec![
                "Check that an audio output device is available",
                "Update your audio drivers",
            ],
            StemmixError::StemLoadFailed { kind, .. } => match kind {
                LoadFailureKind::Timeout => vec![
                    "Check your internet connection",
                    "Reload the track to try again",
                ],
                LoadFailureKind::HttpError { .. } => vec![
                    "The stem file may have been moved or deleted",
                    "Reload the track to try again",
                ],
                LoadFailureKind::DecodeError { .. } => vec![
                    "Stems must be PCM or float WAV files",
                    "Re-export the stem from its source project",
                ],
                LoadFailureKind::Cors => vec![
                    "Serve stem files from the same origin as the player",
                    "Add an Access-Control-Allow-Origin header for this origin",
                ],
                LoadFailureKind::Network { .. } => vec![
                    "Check your internet connection",
                    "Reload the track to try again",
                ],
            },
            StemmixError::AllStemsFailed => vec![
                "Check your internet connection",
                "Reload the track to try again",
            ],
            StemmixError::PlaybackFailure { .. } => vec![
                "Tap play again to retry",
                "Check that the audio output device is not suspended",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            StemmixError::StemLoadFailed { name, kind } => match kind {
                LoadFailureKind::Timeout => format!(
                    "Loading \"{}\" timed out. Please check your internet connection.",
                    name
                ),
                LoadFailureKind::DecodeError { .. } => format!(
                    "\"{}\" contains an unsupported audio format. Stems must be PCM or float WAV.",
                    name
                ),
                LoadFailureKind::Cors => format!(
                    "Cannot load \"{}\" due to CORS policy. Audio files must be served from the same domain.",
                    name
                ),
                LoadFailureKind::HttpError { status } => {
                    format!("Failed to load stem \"{}\": HTTP {}.", name, status)
                }
                LoadFailureKind::Network { reason } => {
                    format!("Failed to load stem \"{}\": {}.", name, reason)
                }
            },
            _ => self.to_string(),
        }
    }
}
