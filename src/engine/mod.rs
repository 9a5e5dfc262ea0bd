//! Audio Engine Module
//!
//! Core engine services around the signal graph:
//! - Audio buffer storage and normalization
//! - WAV decoding
//! - Sample-accurate clock and transport state machine
//! - Concurrent stem loading

pub mod buffer;
pub mod clock;
pub mod decode;
pub mod loader;
pub mod transport;

pub use buffer::AudioBuffer;
pub use clock::AudioClock;
pub use decode::{decode_wav_bytes, decode_wav_file};
pub use loader::{
    AssetLoader, LoadOutcome, LoadReport, LoadState, LoadedStem, LoaderConfig, StemLoadRecord,
};
pub use transport::{Transport, TransportState};
