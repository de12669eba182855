use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A timed interval of spoken text, optionally attributed to a speaker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<WordSegment>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// The persisted transcript shape. This JSON layout is the compatibility
/// contract with clients reading the job row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_segments: Option<Vec<WordSegment>>,
    /// Wall-clock processing time in seconds.
    #[serde(default)]
    pub processing_time: f64,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TranscriptResult {
    /// Largest segment end time, or 0.0 for an empty transcript. Used as the
    /// time offset when appending a live chunk to its master transcript.
    pub fn max_end(&self) -> f64 {
        self.segments.iter().fold(0.0, |acc, s| acc.max(s.end))
    }

    /// Whether the persisted form carries any content. A bare `{}` row is
    /// treated the same as an absent transcript.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.segments.is_empty()
    }
}

/// One speaker-attributed interval produced by a diarization backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiarizationResult {
    pub segments: Vec<DiarizationSegment>,
}
