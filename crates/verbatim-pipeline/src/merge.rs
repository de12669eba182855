//! Assign each transcript segment (and word) the speaker with maximum
//! temporal overlap from a separate diarization pass.

use tracing::info;

use verbatim_core::transcript::{DiarizationResult, DiarizationSegment, TranscriptResult};

/// Merge diarization into a transcript. The input is not mutated; the
/// returned value is a copy with speakers attached.
pub fn merge_diarization(
    transcript: &TranscriptResult,
    diarization: &DiarizationResult,
) -> TranscriptResult {
    info!(
        transcript_segments = transcript.segments.len(),
        diarization_segments = diarization.segments.len(),
        "merging diarization with transcription"
    );

    let mut merged = transcript.clone();

    for segment in &mut merged.segments {
        if let Some(speaker) = best_speaker(segment.start, segment.end, &diarization.segments) {
            segment.speaker = Some(speaker.to_owned());
        }
    }

    if let Some(words) = merged.word_segments.as_mut() {
        for word in words {
            if let Some(speaker) = best_speaker(word.start, word.end, &diarization.segments) {
                word.speaker = Some(speaker.to_owned());
            }
        }
    }

    merged
}

/// The speaker whose interval overlaps `[start, end]` the most. Zero overlap
/// yields `None`.
fn best_speaker<'a>(start: f64, end: f64, segments: &'a [DiarizationSegment]) -> Option<&'a str> {
    let mut max_overlap = 0.0;
    let mut best = None;

    for seg in segments {
        let overlap = (end.min(seg.end) - start.max(seg.start)).max(0.0);
        if overlap > max_overlap {
            max_overlap = overlap;
            best = Some(seg.speaker.as_str());
        }
    }

    best
}
