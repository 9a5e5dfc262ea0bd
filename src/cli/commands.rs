//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;
use std::time::Duration;

use log::info;
use walkdir::WalkDir;

use crate::engine::{AssetLoader, LoadState, LoaderConfig};
use crate::error::{Result, StemmixError};
use crate::graph::AudioContextSpec;
use crate::manifest::{format_clock, StemDescriptor, TrackManifest};

/// Run the full load barrier against a manifest or a directory of WAV
/// stems and print the per-stem report.
pub async fn probe(path: &Path, timeout_secs: u64, retries: u32) -> Result<()> {
    let spec = AudioContextSpec::probe()?;
    let descriptors = if path.is_dir() {
        discover_stems(path)?
    } else {
        TrackManifest::from_file(path)?.stem_descriptors()
    };

    info!(
        "probing {} stem(s) from {}",
        descriptors.len(),
        path.display()
    );

    let config = LoaderConfig {
        timeout: Duration::from_secs(timeout_secs),
        max_retries: retries,
        ..LoaderConfig::default()
    };
    let loader = AssetLoader::new(config, spec.sample_rate);
    let outcome = loader.load_all(&descriptors).await?;

    println!("=== Stem Load Report ===");
    println!("Source: {}", path.display());
    println!("Context: {} Hz, {} ch", spec.sample_rate, spec.channels);
    println!("Completed: {}", outcome.report.completed_at);
    println!();

    for record in &outcome.report.records {
        match &record.state {
            LoadState::Loaded => {
                if let (Some(stem), Some(digest)) = (
                    outcome.stems.iter().find(|s| s.id == record.id),
                    record.checksum.as_deref(),
                ) {
                    println!(
                        "  loaded  {:<16} {}  {} attempt(s)  sha256:{}",
                        record.name,
                        format_clock(stem.buffer.duration_secs()),
                        record.attempts,
                        &digest[..12]
                    );
                }
            }
            LoadState::Failed(kind) => {
                println!(
                    "  FAILED  {:<16} {}  {} attempt(s)",
                    record.name, kind, record.attempts
                );
            }
            LoadState::Pending => {
                println!("  pending {:<16} awaiting fetch", record.name);
            }
        }
    }

    println!();
    println!(
        "Loaded {} of {} stem(s).",
        outcome.stems.len(),
        outcome.report.records.len()
    );
    if let Some(warning) = outcome.report.warning() {
        println!("{}", warning);
    }

    Ok(())
}

/// Parse a manifest and pretty-print the model plus its derived fields.
pub fn print_manifest(path: &Path) -> Result<()> {
    let manifest = TrackManifest::from_file(path)?;

    println!("{}", serde_json::to_string_pretty(&manifest)?);
    println!();
    println!(
        "Duration: {} ({} s)",
        format_clock(manifest.duration_secs() as f64),
        manifest.duration_secs()
    );
    for descriptor in manifest.stem_descriptors() {
        println!("  {} [{}] -> {}", descriptor.name, descriptor.id, descriptor.source_url);
    }

    Ok(())
}

/// Discover WAV files under a directory, one descriptor per file in
/// filename order.
fn discover_stems(dir: &Path) -> Result<Vec<StemDescriptor>> {
    let mut descriptors = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("wav") {
            continue;
        }
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("stem")
            .to_string();
        descriptors.push(StemDescriptor {
            id: format!("stem-{}", descriptors.len()),
            name,
            source_url: path.to_string_lossy().into_owned(),
        });
    }
    if descriptors.is_empty() {
        return Err(StemmixError::InvalidManifest {
            reason: format!("no .wav stems found under {}", dir.display()),
        });
    }
    Ok(descriptors)
}
