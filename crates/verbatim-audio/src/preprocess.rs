use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::info;

use verbatim_core::audio::AudioInput;

use crate::error::AudioError;
use crate::transcode::Transcoder;

/// Convert the input to mono 16 kHz when the chosen backend demands it and
/// the input differs; otherwise pass it through untouched.
///
/// The returned descriptor carries `temp_path` iff a derived file was
/// produced. The caller owns that file and must delete it on every exit path.
pub async fn preprocess(
    transcoder: &Transcoder,
    input: &AudioInput,
    requires_mono_16k: bool,
    temp_dir: &Path,
    job_id: &str,
    cancel: &CancellationToken,
) -> Result<AudioInput, AudioError> {
    if !requires_mono_16k || input.is_mono_16k() {
        return Ok(input.clone());
    }

    tokio::fs::create_dir_all(temp_dir).await?;
    let target = temp_dir.join(format!("{job_id}_16k.wav"));
    transcoder.to_mono_16k(&input.path, &target, cancel).await?;

    let size_bytes = tokio::fs::metadata(&target).await.map(|m| m.len()).unwrap_or(0);

    let mut derived = input.clone();
    derived.temp_path = Some(target.clone());
    derived.sample_rate = 16_000;
    derived.channels = 1;
    derived.format = "wav".to_owned();
    derived.size_bytes = size_bytes;

    info!(
        original = %input.path.display(),
        converted = %target.display(),
        original_sr = input.sample_rate,
        original_channels = input.channels,
        "audio preprocessing completed"
    );

    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_16k_input() -> AudioInput {
        let mut input = AudioInput::new("/a/clip.wav");
        input.sample_rate = 16_000;
        input.channels = 1;
        input
    }

    #[tokio::test]
    async fn pass_through_when_backend_has_no_requirement() {
        let t = Transcoder::new("no-ffmpeg", "no-ffprobe");
        let cancel = CancellationToken::new();
        let mut input = AudioInput::new("/a/clip.webm");
        input.sample_rate = 48_000;
        input.channels = 2;

        let out = preprocess(&t, &input, false, Path::new("/tmp"), "job_1", &cancel)
            .await
            .unwrap();
        assert_eq!(out, input);
        assert!(out.temp_path.is_none());
    }

    #[tokio::test]
    async fn pass_through_when_already_mono_16k() {
        let t = Transcoder::new("no-ffmpeg", "no-ffprobe");
        let cancel = CancellationToken::new();
        let input = mono_16k_input();
        let out = preprocess(&t, &input, true, Path::new("/tmp"), "job_1", &cancel)
            .await
            .unwrap();
        assert!(out.temp_path.is_none());
    }

    #[tokio::test]
    async fn transcode_failure_surfaces_error() {
        // Pipeline treats this as non-fatal and falls back to the original;
        // the preprocess step itself reports the failure.
        let t = Transcoder::new("no-ffmpeg-binary", "no-ffprobe");
        let cancel = CancellationToken::new();
        let dir = tempfile::tempdir().unwrap();
        let mut input = AudioInput::new("/a/clip.webm");
        input.sample_rate = 48_000;
        input.channels = 2;

        let result = preprocess(&t, &input, true, dir.path(), "job_1", &cancel).await;
        assert!(result.is_err());
    }
}
