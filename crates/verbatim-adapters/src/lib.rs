//! Backend adapters: the uniform transcription/diarization contract, the
//! process-wide model registry, and the per-backend parameter translation.

pub mod contract;
mod cloud;
pub mod groq;
pub mod mock;
pub mod openai;
pub mod params;
pub mod pyannote;
pub mod registry;
pub mod voxtral;

pub use contract::{
    AdapterError, DiarizationAdapter, ModelCapabilities, ParamKind, ParamMap, ParameterSpec,
    ProcessingContext, TranscriptionAdapter,
};
pub use registry::ModelRegistry;
