//! Concurrent stem loading.
//!
//! Every stem is fetched, decoded, and normalized independently; the barrier
//! waits for the full set to settle before inspecting results, so one slow
//! or broken stem never blocks its siblings. A failed stem is recorded and
//! excluded from playback; the track is fatal only when nothing loads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::engine::buffer::AudioBuffer;
use crate::engine::decode;
use crate::error::{LoadFailureKind, Result, StemmixError};
use crate::manifest::StemDescriptor;

/// Retry and timeout policy for stem fetches.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Deadline for one fetch attempt (transfer, not decode). An attempt
    /// that exceeds it is aborted and reported as a timeout.
    pub timeout: Duration,
    /// Further attempts after the first, spent on any kind of failure.
    pub max_retries: u32,
    /// Base backoff step. Waits grow linearly: 1x, 2x, 3x before retries
    /// one, two, and three.
    pub backoff_unit: Duration,
    /// When set, responses must carry an `Access-Control-Allow-Origin`
    /// header matching this origin (or `*`), mirroring how a hosted player
    /// is policed. `None` disables the check.
    pub expected_origin: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            expected_origin: None,
        }
    }
}

/// Where one stem's load ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Loaded,
    Failed(LoadFailureKind),
}

/// Per-stem entry in the load report.
#[derive(Debug, Clone)]
pub struct StemLoadRecord {
    pub id: String,
    pub name: String,
    pub state: LoadState,
    /// Fetch attempts consumed, including the first.
    pub attempts: u32,
    /// SHA-256 of the fetched bytes; present only once loaded.
    pub checksum: Option<String>,
}

/// Outcome of one settled load barrier.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub completed_at: DateTime<Utc>,
    pub records: Vec<StemLoadRecord>,
}

impl LoadReport {
    /// Report for a barrier that has not settled: every stem pending, no
    /// attempts spent. The timestamp marks when the barrier was kicked off.
    pub fn pending(stems: &[StemDescriptor]) -> Self {
        Self {
            completed_at: Utc::now(),
            records: stems
                .iter()
                .map(|stem| StemLoadRecord {
                    id: stem.id.clone(),
                    name: stem.name.clone(),
                    state: LoadState::Pending,
                    attempts: 0,
                    checksum: None,
                })
                .collect(),
        }
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.state == LoadState::Loaded)
            .map(|r| r.name.as_str())
            .collect()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| matches!(r.state, LoadState::Failed(_)))
            .map(|r| r.name.as_str())
            .collect()
    }

    /// User-facing warning for a partial load, `None` when everything (or
    /// nothing) loaded. Fatal all-failure is reported through
    /// [`StemmixError::AllStemsFailed`] instead.
    pub fn warning(&self) -> Option<String> {
        let failed = self.failed_names();
        if failed.is_empty() || self.loaded_names().is_empty() {
            return None;
        }
        Some(format!(
            "Warning: {} stem(s) failed to load: {}. Playback will continue with available stems.",
            failed.len(),
            failed.join(", ")
        ))
    }
}

/// A stem that survived fetch, decode, and normalization.
#[derive(Debug, Clone)]
pub struct LoadedStem {
    pub id: String,
    pub name: String,
    pub source_url: String,
    /// SHA-256 of the raw fetched bytes, for cache validation and logs.
    pub checksum: String,
    /// Stereo samples at the engine's context rate.
    pub buffer: AudioBuffer,
}

/// Everything the barrier produced: playable stems plus the full report.
#[derive(Debug)]
pub struct LoadOutcome {
    pub stems: Vec<LoadedStem>,
    pub report: LoadReport,
}

/// Fetches and decodes stems against a fixed policy and context rate.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    client: reqwest::Client,
    config: LoaderConfig,
    target_sample_rate: u32,
}

impl AssetLoader {
    pub fn new(config: LoaderConfig, target_sample_rate: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            target_sample_rate,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load every stem concurrently and wait for all of them to settle.
    ///
    /// Returns `Err(AllStemsFailed)` only when no stem loads; otherwise the
    /// outcome carries the loaded subset and a report naming what failed.
    pub async fn load_all(&self, stems: &[StemDescriptor]) -> Result<LoadOutcome> {
        let mut handles = Vec::with_capacity(stems.len());
        for stem in stems {
            let client = self.client.clone();
            let config = self.config.clone();
            let stem = stem.clone();
            let target_rate = self.target_sample_rate;
            handles.push(tokio::spawn(async move {
                load_with_retry(&client, &config, &stem, target_rate).await
            }));
        }

        let mut loaded = Vec::new();
        let mut records = Vec::with_capacity(stems.len());
        for (handle, stem) in handles.into_iter().zip(stems) {
            match handle.await {
                Ok((Ok(loaded_stem), attempts)) => {
                    records.push(StemLoadRecord {
                        id: stem.id.clone(),
                        name: stem.name.clone(),
                        state: LoadState::Loaded,
                        attempts,
                        checksum: Some(loaded_stem.checksum.clone()),
                    });
                    loaded.push(loaded_stem);
                }
                Ok((Err(kind), attempts)) => {
                    records.push(StemLoadRecord {
                        id: stem.id.clone(),
                        name: stem.name.clone(),
                        state: LoadState::Failed(kind),
                        attempts,
                        checksum: None,
                    });
                }
                Err(join_error) => {
                    // A crashed load task settles its stem as failed rather
                    // than poisoning the barrier.
                    records.push(StemLoadRecord {
                        id: stem.id.clone(),
                        name: stem.name.clone(),
                        state: LoadState::Failed(LoadFailureKind::Network {
                            reason: format!("load task aborted: {}", join_error),
                        }),
                        attempts: 0,
                        checksum: None,
                    });
                }
            }
        }

        let report = LoadReport {
            completed_at: Utc::now(),
            records,
        };
        log::info!(
            "load barrier settled: {} loaded, {} failed",
            report.loaded_names().len(),
            report.failed_names().len()
        );
        if let Some(warning) = report.warning() {
            log::warn!("{}", warning);
        }

        if loaded.is_empty() {
            return Err(StemmixError::AllStemsFailed);
        }
        Ok(LoadOutcome {
            stems: loaded,
            report,
        })
    }
}

/// One stem's full retry loop. Returns the terminal result and how many
/// attempts it took.
async fn load_with_retry(
    client: &reqwest::Client,
    config: &LoaderConfig,
    stem: &StemDescriptor,
    target_rate: u32,
) -> (std::result::Result<LoadedStem, LoadFailureKind>, u32) {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match load_once(client, config, stem, target_rate).await {
            Ok(loaded) => return (Ok(loaded), attempts),
            Err(kind) if attempts <= config.max_retries => {
                let wait = config.backoff_unit * attempts;
                log::warn!(
                    "retrying \"{}\" in {:?} (attempt {}/{}): {}",
                    stem.name,
                    wait,
                    attempts,
                    config.max_retries,
                    kind
                );
                tokio::time::sleep(wait).await;
            }
            Err(kind) => {
                log::error!(
                    "stem \"{}\" failed after {} attempt(s): {}",
                    stem.name,
                    attempts,
                    kind
                );
                return (Err(kind), attempts);
            }
        }
    }
}

/// One fetch-decode-normalize attempt.
async fn load_once(
    client: &reqwest::Client,
    config: &LoaderConfig,
    stem: &StemDescriptor,
    target_rate: u32,
) -> std::result::Result<LoadedStem, LoadFailureKind> {
    let bytes = tokio::time::timeout(config.timeout, fetch_bytes(client, config, &stem.source_url))
        .await
        .map_err(|_| LoadFailureKind::Timeout)??;

    let checksum = format!("{:x}", Sha256::digest(&bytes));
    let buffer = decode::decode_wav_bytes(&bytes)?
        .into_stereo()
        .resampled(target_rate);

    log::debug!(
        "loaded \"{}\" ({} bytes, {:.2}s, sha256 {})",
        stem.name,
        bytes.len(),
        buffer.duration_secs(),
        &checksum[..12]
    );
    Ok(LoadedStem {
        id: stem.id.clone(),
        name: stem.name.clone(),
        source_url: stem.source_url.clone(),
        checksum,
        buffer,
    })
}

/// Fetch raw bytes from an HTTP(S) URL or a local path. The caller wraps
/// this in the attempt deadline.
async fn fetch_bytes(
    client: &reqwest::Client,
    config: &LoaderConfig,
    url: &str,
) -> std::result::Result<Vec<u8>, LoadFailureKind> {
    if let Some(path) = local_source(url) {
        return tokio::fs::read(path)
            .await
            .map_err(|e| LoadFailureKind::Network {
                reason: format!("failed to read {}: {}", path, e),
            });
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(classify_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(LoadFailureKind::HttpError {
            status: status.as_u16(),
        });
    }
    if let Some(origin) = &config.expected_origin {
        check_cross_origin(&response, origin)?;
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(classify_reqwest_error)
}

/// Treat anything that is not an http(s) URL as a filesystem path.
fn local_source(url: &str) -> Option<&str> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(path);
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return None;
    }
    Some(url)
}

fn classify_reqwest_error(e: reqwest::Error) -> LoadFailureKind {
    if e.is_timeout() {
        LoadFailureKind::Timeout
    } else if e.is_connect() {
        LoadFailureKind::Network {
            reason: format!("cannot connect: {}", e),
        }
    } else {
        LoadFailureKind::Network { reason: e.to_string() }
    }
}

/// Enforce the configured cross-origin policy against a response.
fn check_cross_origin(
    response: &reqwest::Response,
    origin: &str,
) -> std::result::Result<(), LoadFailureKind> {
    let allowed = response
        .headers()
        .get("access-control-allow-origin")
        .and_then(|v| v.to_str().ok());
    match allowed {
        Some("*") => Ok(()),
        Some(value) if value == origin => Ok(()),
        _ => Err(LoadFailureKind::Cors),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
