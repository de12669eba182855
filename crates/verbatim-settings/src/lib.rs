//! Environment-driven configuration for the verbatim server.
//!
//! Compiled defaults are overridden by `VERBATIM_*` environment variables.
//! Credentials are optional: a backend whose key is absent is simply not
//! registered at startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Root for uploads: quick chunks under `quick_transcriptions/`,
    /// live audio under `live_sessions/<session>/`.
    pub upload_dir: PathBuf,
    /// Per-job output directories are created under this root.
    pub output_dir: PathBuf,
    /// Scratch space for preprocessed audio.
    pub temp_dir: PathBuf,
    pub database_path: PathBuf,

    pub server_port: u16,

    pub default_transcription_model: String,
    pub default_diarization_model: String,

    pub groq_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub mistral_api_key: Option<String>,

    /// Bearer token accepted on the streaming socket.
    pub stream_token: Option<String>,

    /// Lifetime of an ephemeral quick job.
    pub quick_job_ttl_secs: u64,
    /// How often the expiry sweep runs.
    pub expiry_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data/uploads"),
            output_dir: PathBuf::from("data/outputs"),
            temp_dir: PathBuf::from("data/tmp"),
            database_path: PathBuf::from("data/verbatim.db"),
            server_port: 8585,
            default_transcription_model: "groq_whisper".to_owned(),
            default_diarization_model: "pyannote".to_owned(),
            groq_api_key: None,
            openai_api_key: None,
            mistral_api_key: None,
            stream_token: None,
            quick_job_ttl_secs: 6 * 60 * 60,
            expiry_interval_secs: 60 * 60,
        }
    }
}

impl Settings {
    /// Load settings from the process environment over compiled defaults.
    pub fn from_env() -> Self {
        let mut s = Self::default();
        if let Some(v) = env_var("VERBATIM_UPLOAD_DIR") {
            s.upload_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("VERBATIM_OUTPUT_DIR") {
            s.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("VERBATIM_TEMP_DIR") {
            s.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = env_var("VERBATIM_DATABASE_PATH") {
            s.database_path = PathBuf::from(v);
        }
        if let Some(v) = env_var("VERBATIM_PORT") {
            match v.parse() {
                Ok(port) => s.server_port = port,
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable VERBATIM_PORT"),
            }
        }
        if let Some(v) = env_var("VERBATIM_DEFAULT_MODEL") {
            s.default_transcription_model = v;
        }
        if let Some(v) = env_var("VERBATIM_DEFAULT_DIARIZATION_MODEL") {
            s.default_diarization_model = v;
        }
        s.groq_api_key = env_var("GROQ_API_KEY");
        s.openai_api_key = env_var("OPENAI_API_KEY");
        s.mistral_api_key = env_var("MISTRAL_API_KEY");
        s.stream_token = env_var("VERBATIM_STREAM_TOKEN");
        if let Some(v) = env_var("VERBATIM_QUICK_JOB_TTL_SECS") {
            match v.parse() {
                Ok(secs) => s.quick_job_ttl_secs = secs,
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable VERBATIM_QUICK_JOB_TTL_SECS"),
            }
        }
        if let Some(v) = env_var("VERBATIM_EXPIRY_INTERVAL_SECS") {
            match v.parse() {
                Ok(secs) => s.expiry_interval_secs = secs,
                Err(_) => tracing::warn!(value = %v, "ignoring unparseable VERBATIM_EXPIRY_INTERVAL_SECS"),
            }
        }
        s
    }

    pub fn quick_job_ttl(&self) -> Duration {
        Duration::from_secs(self.quick_job_ttl_secs)
    }

    pub fn expiry_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_interval_secs)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.default_transcription_model, "groq_whisper");
        assert_eq!(s.default_diarization_model, "pyannote");
        assert_eq!(s.quick_job_ttl_secs, 21_600);
        assert_eq!(s.expiry_interval_secs, 3_600);
        assert!(s.groq_api_key.is_none());
    }

    #[test]
    fn durations_derive_from_seconds() {
        let s = Settings::default();
        assert_eq!(s.quick_job_ttl(), Duration::from_secs(6 * 60 * 60));
        assert_eq!(s.expiry_interval(), Duration::from_secs(60 * 60));
    }
}
