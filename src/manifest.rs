//! Track manifests.
//!
//! A manifest names a track and the stems that make it up. It is the only
//! externally supplied description the engine consumes; everything else
//! (mix state, load state) is derived at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StemmixError};

/// Identity of one stem, fixed for the lifetime of a loaded track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemDescriptor {
    pub id: String,
    pub name: String,
    pub source_url: String,
}

/// One stem entry as written in a manifest file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemEntry {
    pub name: String,
    pub url: String,
}

/// Externally supplied track description.
///
/// `bpm` and `key` are display metadata; the engine never beats-match or
/// pitch-shifts. `duration` is a "m:ss" string as written by editors, parsed
/// on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackManifest {
    pub title: String,
    #[serde(default = "default_bpm")]
    pub bpm: u32,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    pub stems: Vec<StemEntry>,
}

fn default_bpm() -> u32 {
    128
}

/// Fallback track length in seconds when the manifest omits or mangles
/// the duration field.
pub const DEFAULT_DURATION_SECS: u32 = 240;

impl TrackManifest {
    /// Parse a manifest from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let manifest: TrackManifest = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Read and parse a manifest file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(StemmixError::InvalidManifest {
                reason: "title is empty".to_string(),
            });
        }
        if self.stems.is_empty() {
            return Err(StemmixError::InvalidManifest {
                reason: "manifest lists no stems".to_string(),
            });
        }
        for (index, stem) in self.stems.iter().enumerate() {
            if stem.url.trim().is_empty() {
                return Err(StemmixError::InvalidManifest {
                    reason: format!("stem {} (\"{}\") has an empty url", index, stem.name),
                });
            }
        }
        Ok(())
    }

    /// Track length in seconds, parsed from the "m:ss" duration string.
    /// Falls back to [`DEFAULT_DURATION_SECS`] when absent or malformed.
    pub fn duration_secs(&self) -> u32 {
        self.duration
            .as_deref()
            .and_then(parse_clock)
            .unwrap_or(DEFAULT_DURATION_SECS)
    }

    /// Stable per-stem identities, assigned by manifest order.
    pub fn stem_descriptors(&self) -> Vec<StemDescriptor> {
        self.stems
            .iter()
            .enumerate()
            .map(|(index, stem)| StemDescriptor {
                id: format!("stem-{}", index),
                name: stem.name.clone(),
                source_url: stem.url.clone(),
            })
            .collect()
    }
}

/// The four canonical stems of a standard track layout, resolved against a
/// base URL (or directory path).
pub fn standard_stems(base_url: &str) -> Vec<StemDescriptor> {
    const LAYOUT: [(&str, &str); 4] = [
        ("Bass", "bass.wav"),
        ("Drums", "drums.wav"),
        ("FX & Vocals", "fx-vocals.wav"),
        ("Synths", "synths.wav"),
    ];
    let base = base_url.trim_end_matches('/');
    LAYOUT
        .iter()
        .enumerate()
        .map(|(index, (name, file))| StemDescriptor {
            id: format!("stem-{}", index),
            name: (*name).to_string(),
            source_url: format!("{}/{}", base, file),
        })
        .collect()
}

/// Parse a "m:ss" clock string into whole seconds.
fn parse_clock(text: &str) -> Option<u32> {
    let (minutes, seconds) = text.split_once(':')?;
    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds: u32 = seconds.trim().parse().ok()?;
    if seconds >= 60 {
        return None;
    }
    Some(minutes * 60 + seconds)
}

/// Format elapsed seconds as a "m:ss" clock string. Negative input clamps
/// to "0:00".
pub fn format_clock(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
