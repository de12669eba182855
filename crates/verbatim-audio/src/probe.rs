use std::path::Path;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use verbatim_core::audio::AudioInput;

use crate::error::AudioError;
use crate::transcode::Transcoder;

const DEFAULT_SAMPLE_RATE: u32 = 16_000;
const DEFAULT_CHANNELS: u16 = 1;
/// Bytes per second assumed when estimating duration from file size.
const FALLBACK_BYTES_PER_SEC: u64 = 32_000;

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    sample_rate: String,
    #[serde(default)]
    channels: u16,
    #[serde(default)]
    duration: String,
    #[serde(default)]
    bit_rate: String,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: String,
}

/// Build an [`AudioInput`] for a file, filling sample rate, channels,
/// duration, and codec from the transcoder's inspection mode.
///
/// A missing file is an error; a failed or unparseable probe is not: the
/// descriptor falls back to 16 kHz mono with a size-derived duration.
pub async fn probe(
    transcoder: &Transcoder,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<AudioInput, AudioError> {
    let meta = tokio::fs::metadata(path).await?;

    let mut input = AudioInput::new(path);
    input.size_bytes = meta.len();

    let raw = match transcoder.probe_json(path, cancel).await {
        Ok(raw) => raw,
        Err(AudioError::Cancelled) => return Err(AudioError::Cancelled),
        Err(e) => {
            warn!(file = %path.display(), error = %e, "probe failed, using defaults");
            apply_fallback(&mut input);
            return Ok(input);
        }
    };

    let parsed: ProbeOutput = match serde_json::from_slice(&raw) {
        Ok(p) => p,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "unparseable probe output, using defaults");
            apply_fallback(&mut input);
            return Ok(input);
        }
    };

    apply_probe(&mut input, &parsed);
    Ok(input)
}

fn apply_fallback(input: &mut AudioInput) {
    input.sample_rate = DEFAULT_SAMPLE_RATE;
    input.channels = DEFAULT_CHANNELS;
    input.duration_secs = (input.size_bytes / FALLBACK_BYTES_PER_SEC) as f64;
}

fn apply_probe(input: &mut AudioInput, parsed: &ProbeOutput) {
    if let Some(stream) = parsed.streams.iter().find(|s| s.codec_type == "audio") {
        input.sample_rate = stream.sample_rate.parse().unwrap_or(DEFAULT_SAMPLE_RATE);
        input.channels = if stream.channels == 0 { DEFAULT_CHANNELS } else { stream.channels };
        input.duration_secs = stream
            .duration
            .parse()
            .or_else(|_| parsed.format.duration.parse())
            .unwrap_or_else(|_: std::num::ParseFloatError| {
                (input.size_bytes / FALLBACK_BYTES_PER_SEC) as f64
            });
        if !stream.codec_name.is_empty() {
            input.metadata.insert("codec".to_owned(), stream.codec_name.clone());
        }
        if !stream.bit_rate.is_empty() {
            input.metadata.insert("bitrate".to_owned(), stream.bit_rate.clone());
        }
    }

    if input.sample_rate == 0 {
        input.sample_rate = DEFAULT_SAMPLE_RATE;
    }
    if input.channels == 0 {
        input.channels = DEFAULT_CHANNELS;
    }
}
