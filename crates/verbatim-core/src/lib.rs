//! Shared domain types for the verbatim transcription orchestrator.

pub mod audio;
pub mod events;
pub mod ids;
pub mod job;
pub mod params;
pub mod transcript;
