use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::AudioError;

/// Invocation wrapper around the external transcoder binaries.
///
/// Subprocesses are spawned with `kill_on_drop` so cancelling the owning
/// future reaps the child, and both pipes are read to completion to avoid
/// back-pressure stalls.
#[derive(Clone, Debug)]
pub struct Transcoder {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_owned(),
            ffprobe: "ffprobe".to_owned(),
        }
    }
}

impl Transcoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Inspect a media file; returns the raw JSON of format + streams.
    pub async fn probe_json(&self, path: &Path, cancel: &CancellationToken) -> Result<Vec<u8>, AudioError> {
        let args = probe_args(path);
        self.run(&self.ffprobe, &args, cancel).await
    }

    /// Rewrite a container in place (copy all streams). Used to restore the
    /// duration header that streamed containers lack.
    pub async fn rewrite_container(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AudioError> {
        let args = rewrite_args(input, output);
        self.run(&self.ffmpeg, &args, cancel).await.map(|_| ())
    }

    /// Transcode to mono 16 kHz WAV.
    pub async fn to_mono_16k(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AudioError> {
        let args = mono_16k_args(input, output);
        self.run(&self.ffmpeg, &args, cancel).await.map(|_| ())
    }

    /// Concatenate the files named in a concat-demuxer list file and
    /// re-encode to MP3 at quality level 2.
    pub async fn concat_to_mp3(
        &self,
        list_file: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), AudioError> {
        let args = concat_args(list_file, output);
        self.run(&self.ffmpeg, &args, cancel).await.map(|_| ())
    }

    async fn run(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, AudioError> {
        debug!(program, ?args, "running transcoder");
        let output_fut = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            out = output_fut => out?,
            () = cancel.cancelled() => return Err(AudioError::Cancelled),
        };

        if !output.status.success() {
            return Err(AudioError::CommandFailed {
                command: program.to_owned(),
                status: output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_owned(), |c| c.to_string()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(output.stdout)
    }
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

pub(crate) fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".into(),
        "quiet".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        "-show_streams".into(),
        path_arg(path),
    ]
}

pub(crate) fn rewrite_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(input),
        "-c".into(),
        "copy".into(),
        path_arg(output),
    ]
}

pub(crate) fn mono_16k_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(input),
        "-ac".into(),
        "1".into(),
        "-ar".into(),
        "16000".into(),
        path_arg(output),
    ]
}

pub(crate) fn concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        path_arg(list_file),
        "-acodec".into(),
        "libmp3lame".into(),
        "-q:a".into(),
        "2".into(),
        path_arg(output),
    ]
}
