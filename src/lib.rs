//! Stemmix - Stem-Mixing Audio Engine
//!
//! Stemmix plays the separated stems of one track as a single synchronized
//! performance and exposes live remix controls over it:
//! 1. Transport - sample-aligned start/stop shared by every stem
//! 2. Mix surface - faders, mute/solo, 3-band EQ, effect sends, macro filter
//! 3. Visualization feed - per-stem and master spectra with level zones
//!
//! # Architecture
//!
//! Stems are fetched and decoded behind a settle-all barrier, then wired
//! into a fixed signal graph: each stem runs source -> gain -> EQ -> tap
//! into the master sum, with post-EQ sends feeding shared reverb and delay
//! buses. The master section applies the sum gain and the macro low-pass
//! before the master analysis tap. [`mixer::StemMixer`] owns the whole
//! session and is the only type most callers need.

pub mod cli;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod feed;
pub mod graph;
pub mod manifest;
pub mod mix;
pub mod mixer;
pub mod profile;

pub use error::{Result, StemmixError};
pub use mixer::StemMixer;
