//! Separate-processing speaker diarization via an external CLI.
//!
//! Only the invocation contract is owned here: the command receives the audio
//! path plus optional speaker bounds and VAD thresholds, and prints a JSON
//! segment list on stdout.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use verbatim_core::audio::AudioInput;
use verbatim_core::transcript::{DiarizationResult, DiarizationSegment};

use crate::contract::{
    f64_param, u64_param, AdapterError, DiarizationAdapter, ModelCapabilities, ParamKind,
    ParamMap, ParameterSpec, ProcessingContext,
};

pub const DEFAULT_COMMAND: &str = "pyannote-diarize";

#[derive(Debug, Deserialize)]
struct CliOutput {
    #[serde(default)]
    segments: Vec<CliSegment>,
}

#[derive(Debug, Deserialize)]
struct CliSegment {
    start: f64,
    end: f64,
    speaker: String,
}

pub struct PyannoteAdapter {
    command: String,
    capabilities: ModelCapabilities,
    schema: Vec<ParameterSpec>,
}

impl PyannoteAdapter {
    pub fn new() -> Self {
        Self::with_command(DEFAULT_COMMAND)
    }

    pub fn with_command(command: impl Into<String>) -> Self {
        let capabilities = ModelCapabilities {
            model_id: "pyannote".into(),
            model_family: "pyannote".into(),
            display_name: "PyAnnote speaker diarization".into(),
            description: "Speaker clustering via the pyannote diarization CLI".into(),
            supported_languages: vec!["*".into()],
            supported_formats: vec!["wav".into()],
            requires_gpu: false,
            memory_requirement_mb: 2_048,
            requires_mono_16k: true,
            features: BTreeMap::from([("diarization".to_owned(), true)]),
            metadata: BTreeMap::new(),
        };

        let schema = vec![
            ParameterSpec::new("min_speakers", ParamKind::Integer, "speakers",
                "Lower bound on the number of speakers"),
            ParameterSpec::new("max_speakers", ParamKind::Integer, "speakers",
                "Upper bound on the number of speakers"),
            ParameterSpec::new("segmentation_onset", ParamKind::Float, "vad",
                "Voice-activity onset threshold")
                .range(0.0, 1.0),
            ParameterSpec::new("segmentation_offset", ParamKind::Float, "vad",
                "Voice-activity offset threshold")
                .range(0.0, 1.0),
        ];

        Self {
            command: command.into(),
            capabilities,
            schema,
        }
    }

    fn build_args(audio_path: &Path, params: &ParamMap) -> Vec<String> {
        let mut args = vec![audio_path.to_string_lossy().into_owned()];
        if let Some(min) = u64_param(params, "min_speakers") {
            args.push("--min-speakers".into());
            args.push(min.to_string());
        }
        if let Some(max) = u64_param(params, "max_speakers") {
            args.push("--max-speakers".into());
            args.push(max.to_string());
        }
        if let Some(onset) = f64_param(params, "segmentation_onset") {
            args.push("--segmentation-onset".into());
            args.push(format!("{onset}"));
        }
        if let Some(offset) = f64_param(params, "segmentation_offset") {
            args.push("--segmentation-offset".into());
            args.push(format!("{offset}"));
        }
        args
    }

    fn command_resolves(&self) -> bool {
        let cmd = Path::new(&self.command);
        if cmd.is_absolute() {
            return cmd.exists();
        }
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(&self.command).exists()))
            .unwrap_or(false)
    }
}

impl Default for PyannoteAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiarizationAdapter for PyannoteAdapter {
    fn capabilities(&self) -> &ModelCapabilities {
        &self.capabilities
    }

    fn parameter_schema(&self) -> &[ParameterSpec] {
        &self.schema
    }

    async fn prepare_environment(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.command_resolves()
    }

    #[instrument(skip_all, fields(job_id = %proc_ctx.job_id))]
    async fn diarize(
        &self,
        audio: &AudioInput,
        params: &ParamMap,
        proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<DiarizationResult, AdapterError> {
        let args = Self::build_args(audio.effective_path(), params);

        let output_fut = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::select! {
            out = output_fut => out?,
            () = cancel.cancelled() => return Err(AdapterError::Cancelled),
        };

        if !output.status.success() {
            return Err(AdapterError::MalformedResponse(format!(
                "diarization command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let parsed: CliOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        Ok(DiarizationResult {
            segments: parsed
                .segments
                .into_iter()
                .map(|s| DiarizationSegment {
                    start: s.start,
                    end: s.end,
                    speaker: s.speaker,
                })
                .collect(),
        })
    }
}
