//! Optional LLM post-pass: consistent speaker labels, typo fixes, and a
//! meeting summary. Parse failures are swallowed; the raw transcript wins.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Deserialize;
use tracing::{info, warn};

use verbatim_core::transcript::TranscriptResult;
use verbatim_llm::{ChatClient, ChatMessage, LlmError};

/// At most this many segments go into the prompt to bound context size.
pub const MAX_PROMPT_SEGMENTS: usize = 500;
pub const ANALYSIS_MODEL: &str = "llama-3.3-70b-versatile";
const ANALYSIS_TEMPERATURE: f64 = 0.1;

#[derive(Debug, Default, Deserialize)]
struct Analysis {
    #[serde(default)]
    segments: BTreeMap<String, SegmentUpdate>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Default, Deserialize)]
struct SegmentUpdate {
    #[serde(default)]
    speaker: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default)]
pub struct SmartAnalysisOutcome {
    pub updated_segments: usize,
    pub summary: Option<String>,
}

/// Refine the transcript in place. An LLM transport error is returned (the
/// caller logs and keeps the raw transcript); a malformed response is not an
/// error at all.
pub async fn apply_smart_analysis(
    llm: &ChatClient,
    job_title: &str,
    result: &mut TranscriptResult,
) -> Result<SmartAnalysisOutcome, LlmError> {
    let prompt = build_prompt(job_title, result);
    let messages = [
        ChatMessage::system(
            "You are an expert transcriber and secretary. You output valid JSON only. \
             You fix typos and assign speakers accurately.",
        ),
        ChatMessage::user(prompt),
    ];

    let sent = result.segments.len().min(MAX_PROMPT_SEGMENTS);
    info!(segments = sent, "sending transcript for smart analysis");

    let resp = llm
        .chat_completion(ANALYSIS_MODEL, &messages, ANALYSIS_TEMPERATURE)
        .await?;
    let content = resp.content()?;

    let Some(json) = extract_json(content) else {
        warn!("smart analysis response carried no JSON object");
        return Ok(SmartAnalysisOutcome::default());
    };

    let analysis: Analysis = match serde_json::from_str(json) {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "failed to parse smart analysis JSON");
            return Ok(SmartAnalysisOutcome::default());
        }
    };

    let mut updated = 0;
    for (idx_str, update) in &analysis.segments {
        let Ok(idx) = idx_str.parse::<usize>() else { continue };
        let Some(segment) = result.segments.get_mut(idx) else { continue };
        if !update.text.is_empty() {
            segment.text = update.text.clone();
        }
        if !update.speaker.is_empty() {
            segment.speaker = Some(update.speaker.clone());
        }
        updated += 1;
    }

    info!(updated_segments = updated, "applied smart analysis updates");

    Ok(SmartAnalysisOutcome {
        updated_segments: updated,
        summary: (!analysis.summary.is_empty()).then(|| analysis.summary),
    })
}

fn build_prompt(job_title: &str, result: &TranscriptResult) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "Meeting/Recording Title: {job_title}");
    prompt.push_str(
        "Act as a professional Meeting Secretary. Your task is to proofread and structure the raw transcript segments below.\n\
         1. **Speaker Identification**: Assign consistent speaker labels (e.g., 'Speaker 1', 'Speaker 2'). If a speaker is unclear, infer from context or carry over the previous speaker. Ensure NO segment is left without a speaker.\n\
         2. **Proofreading**: Fix spelling errors, typos, and grammatical issues while preserving the original meaning and tone.\n\
         3. **Formatting**: Ensure text is capitalized and punctuated correctly.\n\
         4. **Summary**: Provide a concise meeting summary.\n\n\
         Return STRICTLY a JSON object with this structure:\n\
         {\n\
           \"segments\": {\n\
             \"0\": { \"speaker\": \"Speaker 1\", \"text\": \"Corrected text for segment 0\" },\n\
             \"1\": { \"speaker\": \"Speaker 1\", \"text\": \"Corrected text for segment 1\" }\n\
           },\n\
           \"summary\": \"The meeting discussed...\"\n\
         }\n\n\
         Raw Segments:\n",
    );

    for (i, segment) in result.segments.iter().take(MAX_PROMPT_SEGMENTS).enumerate() {
        let _ = writeln!(prompt, "[{i}] {}", segment.text);
    }
    prompt.push_str("\nJSON Output:");
    prompt
}

/// Slice between the first `{` and the last `}`, tolerating markdown fences
/// around the object.
fn extract_json(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end >= start).then(|| &content[start..=end])
}
