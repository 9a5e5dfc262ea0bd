//! WAV decoding.
//!
//! Stems arrive as raw bytes (fetched over HTTP or read from disk) and are
//! decoded here into [`AudioBuffer`]s. All integer bit depths hound supports
//! are normalized to 32-bit float. Decode failures are reported as
//! [`LoadFailureKind::DecodeError`] so the loader can classify them; a
//! refetch may still succeed when the bytes were truncated in transit.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::engine::buffer::AudioBuffer;
use crate::error::{LoadFailureKind, Result, StemmixError};

/// Decode a complete WAV stream held in memory.
///
/// Returns the buffer exactly as stored in the file (original channel count
/// and sample rate). Callers normalize to stereo at the context rate.
pub fn decode_wav_bytes(bytes: &[u8]) -> std::result::Result<AudioBuffer, LoadFailureKind> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| LoadFailureKind::DecodeError {
        reason: format!("not a valid WAV stream: {}", e),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    let sample_rate = spec.sample_rate;

    if channels == 0 {
        return Err(LoadFailureKind::DecodeError {
            reason: "WAV header declares zero channels".to_string(),
        });
    }
    if channels > 2 {
        return Err(LoadFailureKind::DecodeError {
            reason: format!("{}-channel audio (only mono and stereo supported)", channels),
        });
    }

    let interleaved = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    if interleaved.is_empty() {
        return Err(LoadFailureKind::DecodeError {
            reason: "WAV stream contains no audio frames".to_string(),
        });
    }

    Ok(AudioBuffer::from_interleaved(
        &interleaved,
        channels,
        sample_rate,
    ))
}

/// Decode a WAV file from disk.
///
/// Convenience wrapper for local sources and the CLI probe. The file name
/// is carried into the error so a failed stem can be identified.
pub fn decode_wav_file(path: &Path) -> Result<AudioBuffer> {
    let bytes = std::fs::read(path)?;
    decode_wav_bytes(&bytes).map_err(|kind| StemmixError::StemLoadFailed {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        kind,
    })
}

/// Read all samples from the reader and convert to f32 in -1.0..=1.0.
fn read_samples_as_f32<R: std::io::Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> std::result::Result<Vec<f32>, LoadFailureKind> {
    let decode_err = |what: &str, e: hound::Error| LoadFailureKind::DecodeError {
        reason: format!("failed to read {} samples: {}", what, e),
    };

    match sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(|e| decode_err("float", e)),
        SampleFormat::Int => match bits_per_sample {
            8 => reader
                .samples::<i8>()
                .map(|s| s.map(|v| v as f32 / 128.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("8-bit", e)),
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("16-bit", e)),
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8388608.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("24-bit", e)),
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2147483648.0))
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| decode_err("32-bit int", e)),
            other => Err(LoadFailureKind::DecodeError {
                reason: format!("unsupported bit depth: {}-bit integer audio", other),
            }),
        },
    }
}
