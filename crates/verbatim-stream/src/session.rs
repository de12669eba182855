//! Per-connection state machine for the live streaming socket.
//!
//! `Idle` until a `config` control frame arrives, then `Streaming`: binary
//! frames append to the session's audio file in receive order. The socket
//! transport lives in the server crate; this type only consumes frames.

use std::path::PathBuf;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use verbatim_core::ids::{JobId, SessionId};
use verbatim_core::job::JobStatus;
use verbatim_core::params::JobParams;
use verbatim_store::JobRepo;

use crate::error::StreamError;

/// Container extension used for accumulated live audio.
pub const LIVE_CONTAINER_EXT: &str = "webm";
const LIVE_SESSIONS_DIR: &str = "live_sessions";

#[derive(Debug, Deserialize)]
struct ControlMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct StreamConfig {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    meeting_name: String,
    #[serde(default)]
    sample_rate: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Closed,
}

pub struct StreamSession {
    upload_root: PathBuf,
    jobs: JobRepo,
    user_id: String,
    id: SessionId,
    state: SessionState,
    audio_file: Option<tokio::fs::File>,
    audio_path: Option<PathBuf>,
    sample_rate_hint: u32,
}

impl StreamSession {
    pub fn new(upload_root: impl Into<PathBuf>, jobs: JobRepo, user_id: impl Into<String>) -> Self {
        Self {
            upload_root: upload_root.into(),
            jobs,
            user_id: user_id.into(),
            id: SessionId::new(),
            state: SessionState::Idle,
            audio_file: None,
            audio_path: None,
            sample_rate_hint: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn audio_path(&self) -> Option<&std::path::Path> {
        self.audio_path.as_deref()
    }

    pub fn sample_rate_hint(&self) -> u32 {
        self.sample_rate_hint
    }

    /// Handle a text (control) frame. Unreadable JSON and unknown types are
    /// ignored; the socket stays open. Only the error of opening the session
    /// file is fatal.
    pub async fn handle_text(&mut self, raw: &str) -> Result<(), StreamError> {
        let message: ControlMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                debug!(error = %e, "ignoring unreadable control frame");
                return Ok(());
            }
        };

        match message.kind.as_str() {
            "config" => {
                if self.state != SessionState::Idle {
                    debug!(session_id = %self.id, "ignoring repeated config frame");
                    return Ok(());
                }
                let config: StreamConfig =
                    serde_json::from_value(message.payload).unwrap_or_default();
                self.apply_config(config).await
            }
            "ping" | "audio" => Ok(()),
            other => {
                debug!(kind = other, "ignoring unknown control frame");
                Ok(())
            }
        }
    }

    async fn apply_config(&mut self, config: StreamConfig) -> Result<(), StreamError> {
        if !config.session_id.is_empty() {
            self.id = SessionId::from_raw(config.session_id.clone());
        }
        self.sample_rate_hint = config.sample_rate;

        let session_dir = self.upload_root.join(LIVE_SESSIONS_DIR).join(self.id.as_str());
        tokio::fs::create_dir_all(&session_dir).await?;

        let audio_path = session_dir.join(format!("{}.{LIVE_CONTAINER_EXT}", self.id));
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&audio_path)
            .await?;
        self.audio_file = Some(file);
        self.audio_path = Some(audio_path.clone());

        let title = if config.meeting_name.is_empty() {
            format!("Live Session {}", self.id)
        } else {
            config.meeting_name.clone()
        };

        let master_id = JobId::from_raw(self.id.as_str());
        let params = JobParams::default();
        if let Err(e) = self.jobs.upsert_master(
            &master_id,
            &self.user_id,
            &title,
            &audio_path.to_string_lossy(),
            &params,
        ) {
            warn!(session_id = %self.id, error = %e, "failed to upsert master job");
        } else {
            // Master stays in processing while the session is live
            let _ = self.jobs.update_status(&master_id, JobStatus::Processing);
        }

        self.state = SessionState::Streaming;
        info!(session_id = %self.id, sample_rate = config.sample_rate, "stream configured");
        Ok(())
    }

    /// Append a binary audio frame. Frames before `config` are dropped.
    pub async fn handle_binary(&mut self, data: &[u8]) -> Result<(), StreamError> {
        match (&mut self.audio_file, self.state) {
            (Some(file), SessionState::Streaming) => {
                file.write_all(data).await?;
                Ok(())
            }
            _ => {
                debug!(session_id = %self.id, bytes = data.len(), "dropping audio frame before config");
                Ok(())
            }
        }
    }

    /// Release the audio file. Terminal; already-merged chunks are kept.
    pub async fn close(&mut self) {
        if let Some(mut file) = self.audio_file.take() {
            let _ = file.flush().await;
        }
        self.state = SessionState::Closed;
        info!(session_id = %self.id, "stream session closed");
    }
}
