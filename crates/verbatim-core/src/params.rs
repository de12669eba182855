use serde::{Deserialize, Serialize};

/// Model families a job may request. Unknown strings fall back to the
/// configured default at selection time, so the field stays a plain string
/// on the wire; these constants name the recognized values.
pub mod family {
    pub const WHISPER: &str = "whisper";
    pub const OPENAI: &str = "openai";
    pub const GROQ: &str = "groq";
    pub const MISTRAL_VOXTRAL: &str = "mistral_voxtral";
    pub const NVIDIA_CANARY: &str = "nvidia_canary";
}

/// Registered model ids.
pub mod model {
    pub const GROQ_WHISPER: &str = "groq_whisper";
    pub const OPENAI_WHISPER: &str = "openai_whisper";
    pub const VOXTRAL: &str = "voxtral";
    pub const CANARY: &str = "canary";
    pub const WHISPERX: &str = "whisperx";
    pub const PYANNOTE: &str = "pyannote";
    pub const SORTFORMER: &str = "nvidia_sortformer";
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    Transcribe,
    Translate,
}

impl Task {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
        }
    }
}

/// The generic job parameter record. Optional fields mean "use the adapter
/// default" and are elided when translated into backend parameter maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobParams {
    pub model_family: String,
    pub model: String,
    pub task: Task,
    pub language: Option<String>,

    pub diarize: bool,
    pub diarize_model: Option<String>,
    pub min_speakers: Option<u32>,
    pub max_speakers: Option<u32>,

    pub temperature: f64,
    pub beam_size: u32,
    pub best_of: u32,
    pub patience: f64,

    pub vad_onset: f64,
    pub vad_offset: f64,

    pub initial_prompt: Option<String>,
    pub api_key: Option<String>,
    pub callback_url: Option<String>,

    pub multi_track: bool,
}

impl Default for JobParams {
    fn default() -> Self {
        Self {
            model_family: String::new(),
            model: String::new(),
            task: Task::Transcribe,
            language: None,
            diarize: false,
            diarize_model: None,
            min_speakers: None,
            max_speakers: None,
            temperature: 0.0,
            beam_size: 5,
            best_of: 5,
            patience: 1.0,
            vad_onset: 0.5,
            vad_offset: 0.363,
            initial_prompt: None,
            api_key: None,
            callback_url: None,
            multi_track: false,
        }
    }
}
