//! Concatenate a live session's chunk files into one playable container.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use verbatim_audio::Transcoder;
use verbatim_core::ids::JobId;
use verbatim_store::JobRepo;

use crate::error::StreamError;

const LIVE_SESSIONS_DIR: &str = "live_sessions";
const MERGED_AUDIO_NAME: &str = "merged_audio.mp3";
const CONCAT_LIST_NAME: &str = "files.txt";
const MERGEABLE_EXTS: [&str; 3] = ["webm", "ogg", "mp3"];

pub struct SessionFinalizer {
    upload_root: PathBuf,
    transcoder: Transcoder,
    jobs: JobRepo,
}

impl SessionFinalizer {
    pub fn new(upload_root: impl Into<PathBuf>, transcoder: Transcoder, jobs: JobRepo) -> Self {
        Self {
            upload_root: upload_root.into(),
            transcoder,
            jobs,
        }
    }

    /// Merge all chunk files of a session (sorted by modification time)
    /// through the transcoder and point the master job at the result.
    ///
    /// Idempotent: an absent session directory, a single chunk, or an
    /// already-produced merge are all quiet no-ops.
    pub async fn finalize(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StreamError> {
        let session_dir = self.upload_root.join(LIVE_SESSIONS_DIR).join(session_id);
        if !session_dir.is_dir() {
            return Ok(());
        }

        let output_path = session_dir.join(MERGED_AUDIO_NAME);
        if output_path.exists() {
            info!(session_id, "session already finalized");
            return Ok(());
        }

        let mut audio_files: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(&session_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if MERGEABLE_EXTS.contains(&ext) {
                audio_files.push(path);
            }
        }

        if audio_files.len() <= 1 {
            return Ok(());
        }

        // Modification time reflects arrival order of the chunks
        let mut keyed: Vec<(std::time::SystemTime, PathBuf)> = Vec::with_capacity(audio_files.len());
        for path in audio_files {
            let modified = tokio::fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            keyed.push((modified, path));
        }
        keyed.sort_by_key(|(modified, _)| *modified);

        let list_path = session_dir.join(CONCAT_LIST_NAME);
        let mut list_content = String::new();
        for (_, path) in &keyed {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            list_content.push_str(&format!("file '{}'\n", escape_concat_name(&name)));
        }
        tokio::fs::write(&list_path, &list_content).await?;

        let result = self
            .transcoder
            .concat_to_mp3(&list_path, &output_path, cancel)
            .await;

        // Originals stay on disk for operator discretion; only the list
        // file is removed.
        let _ = tokio::fs::remove_file(&list_path).await;
        result?;

        if let Err(e) = self
            .jobs
            .update_audio_path(&JobId::from_raw(session_id), &output_path.to_string_lossy())
        {
            error!(session_id, error = %e, "failed to update master job audio path");
        }

        info!(session_id, output = %output_path.display(), "finalized live session audio");
        Ok(())
    }
}

/// Escape single quotes per the concat demuxer's quoting rules.
fn escape_concat_name(name: &str) -> String {
    name.replace('\'', "'\\''")
}
