//! Per-job processing pipeline: model selection, preprocessing,
//! transcription, diarization merging, LLM refinement, persistence,
//! and terminal-state notification.

mod error;
pub mod merge;
pub mod multitrack;
pub mod pipeline;
pub mod selector;
pub mod smart;

pub use error::PipelineError;
pub use multitrack::JobProcessor;
pub use pipeline::{PipelineConfig, ProcessingPipeline};
pub use selector::ModelDefaults;
