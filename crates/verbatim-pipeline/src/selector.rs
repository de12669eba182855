//! Family-to-model routing and the embedded-vs-separate diarization decision.

use tracing::info;

use verbatim_core::params::{family, model, JobParams};

/// Configured fallback models.
#[derive(Clone, Debug)]
pub struct ModelDefaults {
    pub transcription: String,
    pub diarization: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            transcription: model::GROQ_WHISPER.to_owned(),
            diarization: model::PYANNOTE.to_owned(),
        }
    }
}

/// Pick the transcription model id and, when diarization is requested, the
/// separate diarization model id. `None` for the diarization id means the
/// transcription pass embeds it.
pub fn select_models(params: &JobParams, defaults: &ModelDefaults) -> (String, Option<String>) {
    let transcription = match params.model_family.as_str() {
        // Local whisper requests are routed to the hosted backend
        family::WHISPER | family::GROQ => model::GROQ_WHISPER.to_owned(),
        family::OPENAI => model::OPENAI_WHISPER.to_owned(),
        family::MISTRAL_VOXTRAL => model::VOXTRAL.to_owned(),
        family::NVIDIA_CANARY => model::CANARY.to_owned(),
        _ => defaults.transcription.clone(),
    };

    let diarization = if params.diarize {
        if transcription_includes_diarization(&transcription, params) {
            None
        } else {
            Some(defaults.diarization.clone())
        }
    } else {
        None
    };

    info!(
        transcription = %transcription,
        diarization = diarization.as_deref().unwrap_or("embedded/none"),
        family = %params.model_family,
        "selected models"
    );

    (transcription, diarization)
}

/// Whether the chosen transcription model already produces speaker labels.
/// A user-forced separate-processing diarizer overrides the embedded pass.
pub fn transcription_includes_diarization(model_id: &str, params: &JobParams) -> bool {
    model_id == model::WHISPERX
        && params.diarize
        && params.diarize_model.as_deref() != Some(model::SORTFORMER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(family: &str) -> JobParams {
        JobParams {
            model_family: family.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn family_table_routes_to_model_ids() {
        let defaults = ModelDefaults::default();
        assert_eq!(select_models(&params("groq"), &defaults).0, "groq_whisper");
        assert_eq!(select_models(&params("openai"), &defaults).0, "openai_whisper");
        assert_eq!(select_models(&params("mistral_voxtral"), &defaults).0, "voxtral");
        assert_eq!(select_models(&params("nvidia_canary"), &defaults).0, "canary");
    }

    #[test]
    fn whisper_family_routes_to_hosted_backend() {
        let defaults = ModelDefaults::default();
        assert_eq!(select_models(&params("whisper"), &defaults).0, "groq_whisper");
    }

    #[test]
    fn unknown_family_uses_configured_default() {
        let defaults = ModelDefaults {
            transcription: "canary".into(),
            diarization: "pyannote".into(),
        };
        assert_eq!(select_models(&params("brand_new_family"), &defaults).0, "canary");
        assert_eq!(select_models(&params(""), &defaults).0, "canary");
    }

    #[test]
    fn no_diarization_when_not_requested() {
        let defaults = ModelDefaults::default();
        let (_, diar) = select_models(&params("groq"), &defaults);
        assert!(diar.is_none());
    }

    #[test]
    fn separate_diarization_for_cloud_models() {
        let defaults = ModelDefaults::default();
        let mut p = params("groq");
        p.diarize = true;
        let (_, diar) = select_models(&p, &defaults);
        assert_eq!(diar.as_deref(), Some("pyannote"));
    }

    #[test]
    fn embedded_diarization_when_model_is_native() {
        let defaults = ModelDefaults {
            transcription: model::WHISPERX.to_owned(),
            diarization: model::PYANNOTE.to_owned(),
        };
        let mut p = params("some_local_family");
        p.diarize = true;
        let (transcription, diar) = select_models(&p, &defaults);
        assert_eq!(transcription, model::WHISPERX);
        assert!(diar.is_none(), "native diarization should be embedded");
    }

    #[test]
    fn forced_separate_diarizer_overrides_embedded() {
        let defaults = ModelDefaults {
            transcription: model::WHISPERX.to_owned(),
            diarization: model::PYANNOTE.to_owned(),
        };
        let mut p = params("some_local_family");
        p.diarize = true;
        p.diarize_model = Some(model::SORTFORMER.to_owned());
        let (_, diar) = select_models(&p, &defaults);
        assert_eq!(diar.as_deref(), Some(model::PYANNOTE));
    }

    #[test]
    fn includes_diarization_requires_diarize_flag() {
        let p = params("x");
        assert!(!transcription_includes_diarization(model::WHISPERX, &p));
    }
}
