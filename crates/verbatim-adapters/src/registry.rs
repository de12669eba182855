//! Name-to-adapter registry. Built once at startup, immutable afterwards;
//! lookups are plain keyed reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::contract::{
    AdapterError, DiarizationAdapter, ModelCapabilities, ParamKind, ParamMap, ParameterSpec,
    TranscriptionAdapter,
};

#[derive(Default)]
pub struct ModelRegistry {
    transcription: HashMap<String, Arc<dyn TranscriptionAdapter>>,
    diarization: HashMap<String, Arc<dyn DiarizationAdapter>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_transcription(&mut self, adapter: Arc<dyn TranscriptionAdapter>) {
        let id = adapter.capabilities().model_id.clone();
        info!(model_id = %id, "registered transcription adapter");
        self.transcription.insert(id, adapter);
    }

    pub fn register_diarization(&mut self, adapter: Arc<dyn DiarizationAdapter>) {
        let id = adapter.capabilities().model_id.clone();
        info!(model_id = %id, "registered diarization adapter");
        self.diarization.insert(id, adapter);
    }

    pub fn transcription_adapter(
        &self,
        id: &str,
    ) -> Result<Arc<dyn TranscriptionAdapter>, AdapterError> {
        self.transcription
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::NotRegistered(id.to_owned()))
    }

    pub fn diarization_adapter(
        &self,
        id: &str,
    ) -> Result<Arc<dyn DiarizationAdapter>, AdapterError> {
        self.diarization
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::NotRegistered(id.to_owned()))
    }

    /// Call `prepare_environment` on every adapter. Individual failures are
    /// collected and logged; the registry stays usable for the models that
    /// initialized.
    pub async fn initialize_models(&self) -> Vec<(String, AdapterError)> {
        let mut failures = Vec::new();
        for (id, adapter) in &self.transcription {
            if let Err(e) = adapter.prepare_environment().await {
                error!(model_id = %id, error = %e, "transcription adapter initialization failed");
                failures.push((id.clone(), e));
            }
        }
        for (id, adapter) in &self.diarization {
            if let Err(e) = adapter.prepare_environment().await {
                error!(model_id = %id, error = %e, "diarization adapter initialization failed");
                failures.push((id.clone(), e));
            }
        }
        failures
    }

    pub fn all_capabilities(&self) -> BTreeMap<String, ModelCapabilities> {
        let mut caps = BTreeMap::new();
        for (id, adapter) in &self.transcription {
            caps.insert(id.clone(), adapter.capabilities().clone());
        }
        for (id, adapter) in &self.diarization {
            caps.insert(id.clone(), adapter.capabilities().clone());
        }
        caps
    }

    /// Readiness probe for every registered model.
    pub async fn model_status(&self) -> BTreeMap<String, bool> {
        let mut status = BTreeMap::new();
        for (id, adapter) in &self.transcription {
            status.insert(id.clone(), adapter.is_ready().await);
        }
        for (id, adapter) in &self.diarization {
            status.insert(id.clone(), adapter.is_ready().await);
        }
        status
    }

    /// Cross-check a parameter map against the model's declared schema.
    pub fn validate_parameters(&self, model_id: &str, params: &ParamMap) -> Result<(), AdapterError> {
        let schema: &[ParameterSpec] = if let Some(a) = self.transcription.get(model_id) {
            a.parameter_schema()
        } else if let Some(a) = self.diarization.get(model_id) {
            a.parameter_schema()
        } else {
            return Err(AdapterError::NotRegistered(model_id.to_owned()));
        };

        let mut problems = Vec::new();
        for spec in schema {
            match params.get(&spec.name) {
                None => {
                    if spec.required {
                        problems.push(format!("missing required parameter {}", spec.name));
                    }
                }
                Some(value) => {
                    if !kind_matches(spec.kind, value) {
                        problems.push(format!("parameter {} has wrong type", spec.name));
                        continue;
                    }
                    if let Some(n) = value.as_f64() {
                        if spec.min.is_some_and(|min| n < min) || spec.max.is_some_and(|max| n > max) {
                            problems.push(format!("parameter {} out of range", spec.name));
                        }
                    }
                    if !spec.options.is_empty() {
                        if let Some(s) = value.as_str() {
                            if !spec.options.iter().any(|o| o == s) {
                                problems.push(format!("parameter {}: unknown option {s}", spec.name));
                            }
                        }
                    }
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(AdapterError::InvalidParameters(problems.join("; ")))
        }
    }
}

fn kind_matches(kind: ParamKind, value: &Value) -> bool {
    match kind {
        ParamKind::String => value.is_string(),
        ParamKind::Integer => value.is_i64() || value.is_u64(),
        ParamKind::Float => value.is_number(),
        ParamKind::Boolean => value.is_boolean(),
    }
}
