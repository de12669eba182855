//! Shared plumbing for OpenAI-compatible hosted transcription endpoints.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use verbatim_core::transcript::{TranscriptResult, TranscriptSegment};

use crate::contract::AdapterError;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("failed to build HTTP client")
}

/// The `verbose_json` response shape shared by whisper-compatible endpoints.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct VerboseJson {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerboseSegment {
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
}

/// Upload an audio file as multipart form data and decode a verbose_json
/// transcription response. Cancellation aborts the in-flight request.
pub(crate) async fn multipart_transcribe(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    audio_path: &Path,
    fields: Vec<(&'static str, String)>,
    cancel: &CancellationToken,
) -> Result<VerboseJson, AdapterError> {
    let bytes = tokio::fs::read(audio_path).await?;
    let file_name = audio_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_owned());

    let mut form = reqwest::multipart::Form::new()
        .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
    for (key, value) in fields {
        form = form.text(key, value);
    }

    let request = client.post(url).bearer_auth(api_key).multipart(form).send();
    let resp = tokio::select! {
        resp = request => resp.map_err(|e| AdapterError::Network(e.to_string()))?,
        () = cancel.cancelled() => return Err(AdapterError::Cancelled),
    };

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AdapterError::Backend { status: status.as_u16(), body });
    }

    resp.json::<VerboseJson>()
        .await
        .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
}

/// Convert a verbose_json payload into the persisted transcript shape.
/// When the backend returns text without segments, a single full-span
/// segment is synthesized so downstream merging always has timings.
pub(crate) fn into_transcript(
    resp: VerboseJson,
    model_used: &str,
    provider: &str,
    started: Instant,
) -> TranscriptResult {
    let mut segments: Vec<TranscriptSegment> = resp
        .segments
        .into_iter()
        .map(|s| TranscriptSegment {
            start: s.start,
            end: s.end,
            text: s.text,
            speaker: None,
            words: None,
        })
        .collect();

    if segments.is_empty() && !resp.text.is_empty() {
        segments.push(TranscriptSegment {
            start: 0.0,
            end: resp.duration,
            text: resp.text.clone(),
            speaker: None,
            words: None,
        });
    }

    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("provider".to_owned(), provider.to_owned());

    TranscriptResult {
        language: resp.language,
        text: resp.text,
        segments,
        word_segments: None,
        processing_time: started.elapsed().as_secs_f64(),
        model_used: model_used.to_owned(),
        metadata,
    }
}
