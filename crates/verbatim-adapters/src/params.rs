//! Translation from the generic job parameter record into each backend's
//! parameter map. One mapping function per target backend; optional fields
//! are elided when unset so adapters fall back to their own defaults.

use serde_json::json;

use verbatim_core::params::{model, JobParams, Task};

use crate::contract::ParamMap;
use crate::groq;

/// Dispatch to the mapping function for a model id. Unknown ids get the
/// full generic map.
pub fn params_for_model(model_id: &str, p: &JobParams) -> ParamMap {
    match model_id {
        model::GROQ_WHISPER => groq_params(p),
        model::OPENAI_WHISPER => openai_params(p),
        model::VOXTRAL => voxtral_params(p),
        model::CANARY => canary_params(p),
        model::WHISPERX => whisperx_params(p),
        model::PYANNOTE => pyannote_params(p),
        model::SORTFORMER => sortformer_params(p),
        _ => generic_params(p),
    }
}

pub fn groq_params(p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    // Local whisper model names (base, small, large-v3, ...) collapse onto
    // the hosted default unless an explicit hosted model was requested.
    let model = if p.model.is_empty() || !p.model.contains("whisper-large") {
        groq::DEFAULT_MODEL.to_owned()
    } else {
        p.model.clone()
    };
    map.insert("model".into(), json!(model));
    map.insert("temperature".into(), json!(p.temperature));
    if let Some(lang) = &p.language {
        map.insert("language".into(), json!(lang));
    }
    if let Some(prompt) = &p.initial_prompt {
        map.insert("prompt".into(), json!(prompt));
    }
    if let Some(key) = p.api_key.as_deref().filter(|k| !k.is_empty()) {
        map.insert("api_key".into(), json!(key));
    }
    map
}

pub fn openai_params(p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("model".into(), json!(p.model));
    map.insert("temperature".into(), json!(p.temperature));
    if let Some(lang) = &p.language {
        map.insert("language".into(), json!(lang));
    }
    if let Some(prompt) = &p.initial_prompt {
        map.insert("prompt".into(), json!(prompt));
    }
    if let Some(key) = p.api_key.as_deref().filter(|k| !k.is_empty()) {
        map.insert("api_key".into(), json!(key));
    }
    map
}

pub fn voxtral_params(p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert(
        "language".into(),
        json!(p.language.as_deref().unwrap_or("en")),
    );
    if !p.model.is_empty() {
        map.insert("model".into(), json!(p.model));
    }
    if let Some(key) = p.api_key.as_deref().filter(|k| !k.is_empty()) {
        map.insert("api_key".into(), json!(key));
    }
    map
}

/// Canary is the translation-capable encoder: a `translate` task forces the
/// target language to English.
pub fn canary_params(p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("timestamps".into(), json!(true));
    map.insert("output_format".into(), json!("json"));
    map.insert("auto_convert_audio".into(), json!(true));
    map.insert("task".into(), json!(p.task.as_str()));
    let source = p.language.as_deref().unwrap_or("en");
    map.insert("source_lang".into(), json!(source));
    if p.task == Task::Translate {
        map.insert("target_lang".into(), json!("en"));
    } else {
        map.insert("target_lang".into(), json!(source));
    }
    map
}

pub fn whisperx_params(p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("model".into(), json!(p.model));
    map.insert("task".into(), json!(p.task.as_str()));
    map.insert("diarize".into(), json!(p.diarize));
    map.insert("temperature".into(), json!(p.temperature));
    map.insert("best_of".into(), json!(p.best_of));
    map.insert("beam_size".into(), json!(p.beam_size));
    map.insert("patience".into(), json!(p.patience));
    map.insert("vad_onset".into(), json!(p.vad_onset));
    map.insert("vad_offset".into(), json!(p.vad_offset));
    if let Some(dm) = &p.diarize_model {
        map.insert("diarize_model".into(), json!(dm));
    }
    if let Some(lang) = &p.language {
        map.insert("language".into(), json!(lang));
    }
    if let Some(min) = p.min_speakers {
        map.insert("min_speakers".into(), json!(min));
    }
    if let Some(max) = p.max_speakers {
        map.insert("max_speakers".into(), json!(max));
    }
    if let Some(prompt) = &p.initial_prompt {
        map.insert("initial_prompt".into(), json!(prompt));
    }
    map
}

pub fn pyannote_params(p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("output_format".into(), json!("json"));
    map.insert("auto_convert_audio".into(), json!(true));
    if let Some(min) = p.min_speakers {
        map.insert("min_speakers".into(), json!(min));
    }
    if let Some(max) = p.max_speakers {
        map.insert("max_speakers".into(), json!(max));
    }
    // VAD thresholds drive the diarizer's segmentation sensitivity
    if p.vad_onset > 0.0 {
        map.insert("segmentation_onset".into(), json!(p.vad_onset));
    }
    if p.vad_offset > 0.0 {
        map.insert("segmentation_offset".into(), json!(p.vad_offset));
    }
    map
}

pub fn sortformer_params(_p: &JobParams) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("output_format".into(), json!("json"));
    map.insert("auto_convert_audio".into(), json!(true));
    map
}

pub fn generic_params(p: &JobParams) -> ParamMap {
    let mut map = whisperx_params(p);
    map.insert("timestamps".into(), json!(true));
    map.insert("output_format".into(), json!("json"));
    map.insert("auto_convert_audio".into(), json!(true));
    map
}
