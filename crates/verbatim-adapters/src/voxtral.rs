//! Mistral Voxtral transcription.

use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use verbatim_core::audio::AudioInput;
use verbatim_core::transcript::TranscriptResult;

use crate::cloud;
use crate::contract::{
    feature, str_param, AdapterError, ModelCapabilities, ParamKind, ParamMap, ParameterSpec,
    ProcessingContext, TranscriptionAdapter,
};

const API_URL: &str = "https://api.mistral.ai/v1/audio/transcriptions";
pub const DEFAULT_MODEL: &str = "voxtral-mini-latest";

pub struct VoxtralAdapter {
    client: reqwest::Client,
    api_key: Option<String>,
    capabilities: ModelCapabilities,
    schema: Vec<ParameterSpec>,
}

impl VoxtralAdapter {
    pub fn new(api_key: Option<String>) -> Self {
        let capabilities = ModelCapabilities {
            model_id: "voxtral".into(),
            model_family: "mistral_voxtral".into(),
            display_name: "Mistral Voxtral".into(),
            description: "Hosted speech understanding on Mistral's Voxtral models".into(),
            supported_languages: ["ar", "de", "en", "es", "fr", "hi", "it", "nl", "pt"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            supported_formats: ["flac", "mp3", "m4a", "ogg", "wav", "webm"]
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            requires_gpu: false,
            memory_requirement_mb: 0,
            requires_mono_16k: false,
            features: [
                (feature::TIMESTAMPS, true),
                (feature::DIARIZATION, false),
                (feature::LANGUAGE_DETECTION, true),
            ]
            .iter()
            .map(|(k, v)| ((*k).to_owned(), *v))
            .collect(),
            metadata: BTreeMap::from([
                ("provider".to_owned(), "mistral".to_owned()),
                ("api_url".to_owned(), API_URL.to_owned()),
            ]),
        };

        let schema = vec![
            ParameterSpec::new("api_key", ParamKind::String, "authentication",
                "Mistral API key (overrides the system default)"),
            ParameterSpec::new("model", ParamKind::String, "basic", "Voxtral model")
                .default_value(serde_json::json!(DEFAULT_MODEL)),
            ParameterSpec::new("language", ParamKind::String, "basic",
                "Language of the input audio (ISO-639-1)"),
        ];

        Self {
            client: cloud::build_client(),
            api_key,
            capabilities,
            schema,
        }
    }

    fn resolve_api_key(&self, params: &ParamMap) -> Result<String, AdapterError> {
        str_param(params, "api_key")
            .map(str::to_owned)
            .or_else(|| self.api_key.clone())
            .ok_or_else(|| AdapterError::MissingCredential("voxtral".into()))
    }
}

#[async_trait]
impl TranscriptionAdapter for VoxtralAdapter {
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
        self.api_key.is_some()
    }

    #[instrument(skip_all, fields(job_id = %proc_ctx.job_id))]
    async fn transcribe(
        &self,
        audio: &AudioInput,
        params: &ParamMap,
        proc_ctx: &ProcessingContext,
        cancel: &CancellationToken,
    ) -> Result<TranscriptResult, AdapterError> {
        let started = Instant::now();
        let api_key = self.resolve_api_key(params)?;
        let model = str_param(params, "model").unwrap_or(DEFAULT_MODEL).to_owned();

        let mut fields: Vec<(&'static str, String)> = vec![("model", model.clone())];
        if let Some(lang) = str_param(params, "language") {
            fields.push(("language", lang.to_owned()));
        }

        let resp = cloud::multipart_transcribe(
            &self.client,
            API_URL,
            &api_key,
            audio.effective_path(),
            fields,
            cancel,
        )
        .await?;

        Ok(cloud::into_transcript(resp, &model, "mistral", started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_name_the_family() {
        let adapter = VoxtralAdapter::new(None);
        assert_eq!(adapter.capabilities().model_family, "mistral_voxtral");
        assert_eq!(adapter.capabilities().memory_requirement_mb, 0);
    }

    #[tokio::test]
    async fn readiness_tracks_credential() {
        assert!(VoxtralAdapter::new(Some("key".into())).is_ready().await);
        assert!(!VoxtralAdapter::new(None).is_ready().await);
    }
}
