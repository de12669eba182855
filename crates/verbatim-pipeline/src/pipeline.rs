//! End-to-end per-job orchestration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use verbatim_adapters::{AdapterError, ModelRegistry, ProcessingContext};
use verbatim_audio::{preprocess, probe, AudioError, Transcoder};
use verbatim_core::events::JobEvent;
use verbatim_core::ids::JobId;
use verbatim_core::job::JobStatus;
use verbatim_events::{JobBroadcaster, WebhookDispatcher, WebhookPayload};
use verbatim_llm::ChatClient;
use verbatim_store::{ExecutionRepo, JobRepo, JobRow};

use crate::error::PipelineError;
use crate::merge::merge_diarization;
use crate::multitrack::{JobProcessor, MultiTrackProcessor};
use crate::selector::{select_models, ModelDefaults};
use crate::smart::apply_smart_analysis;

/// Extension of live-capture containers that need their duration header
/// restored before playback-facing use.
const LIVE_CONTAINER_EXT: &str = "webm";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub defaults: ModelDefaults,
}

pub struct ProcessingPipeline {
    registry: Arc<ModelRegistry>,
    jobs: JobRepo,
    executions: ExecutionRepo,
    broadcaster: Arc<JobBroadcaster>,
    webhooks: Arc<WebhookDispatcher>,
    llm: Option<ChatClient>,
    transcoder: Transcoder,
    config: PipelineConfig,
}

impl ProcessingPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ModelRegistry>,
        jobs: JobRepo,
        executions: ExecutionRepo,
        broadcaster: Arc<JobBroadcaster>,
        webhooks: Arc<WebhookDispatcher>,
        transcoder: Transcoder,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            jobs,
            executions,
            broadcaster,
            webhooks,
            llm: None,
            transcoder,
            config,
        }
    }

    /// Attach the chat client used for smart analysis. Without one, the
    /// refinement pass is skipped entirely.
    pub fn with_llm(mut self, llm: ChatClient) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Process one job to a terminal state: probe, preprocess, transcribe,
    /// merge diarization, refine, persist, notify. Temp files produced along
    /// the way are deleted on every exit path.
    #[instrument(skip(self, cancel), fields(job_id = %job_id))]
    pub async fn process_job(
        self: Arc<Self>,
        job_id: JobId,
        cancel: CancellationToken,
    ) -> Result<(), PipelineError> {
        let job = self.jobs.get(&job_id)?;

        // Validation failures are synchronous: no execution record is opened.
        if !tokio::fs::try_exists(&job.audio_path).await.unwrap_or(false) {
            let msg = format!("audio file missing: {}", job.audio_path);
            let _ = self.jobs.update_status(&job_id, JobStatus::Failed);
            self.broadcaster
                .publish(JobEvent::job_update(job_id.as_str().to_owned(), "failed", Some(&msg)))
                .await;
            return Err(PipelineError::InvalidInput(msg));
        }

        let actual_parameters = serde_json::to_string(&job.params)?;
        let execution = self.executions.create(&job_id, &actual_parameters)?;
        let _ = self.jobs.update_status(&job_id, JobStatus::Processing);
        self.broadcaster
            .publish(JobEvent::job_update(job_id.as_str().to_owned(), "processing", None))
            .await;

        let mut temp_files: Vec<PathBuf> = Vec::new();
        let outcome = if job.multi_track && job.params.multi_track {
            let handle: Arc<dyn JobProcessor> = Arc::new(Arc::clone(&self));
            MultiTrackProcessor::new(handle, self.jobs.clone())
                .process(&job, &cancel)
                .await
        } else {
            self.run_single_track(&job, &cancel, &mut temp_files).await
        };

        for temp in temp_files {
            if let Err(e) = tokio::fs::remove_file(&temp).await {
                warn!(file = %temp.display(), error = %e, "failed to clean up temporary file");
            }
        }

        match outcome {
            Ok(()) => {
                let _ = self.jobs.update_status(&job_id, JobStatus::Completed);
                self.finish(&job, execution.id, JobStatus::Completed, None).await;
                counter!("jobs_completed_total").increment(1);
                info!("job processed successfully");
                Ok(())
            }
            Err(e) => {
                let msg = if e.is_cancellation() {
                    "cancelled before completion".to_owned()
                } else {
                    e.to_string()
                };
                let _ = self.jobs.update_status(&job_id, JobStatus::Failed);
                self.finish(&job, execution.id, JobStatus::Failed, Some(&msg)).await;
                counter!("jobs_failed_total").increment(1);
                Err(e)
            }
        }
    }

    async fn run_single_track(
        &self,
        job: &JobRow,
        cancel: &CancellationToken,
        temp_files: &mut Vec<PathBuf>,
    ) -> Result<(), PipelineError> {
        let mut audio_path = PathBuf::from(&job.audio_path);

        // Streamed containers often lack a duration header; rewrite in place
        // so downstream players seek correctly. Failure keeps the original.
        if audio_path.extension().and_then(|e| e.to_str()) == Some(LIVE_CONTAINER_EXT) {
            audio_path = self.fix_live_container(job, &audio_path, cancel).await?;
        }

        let audio = probe::probe(&self.transcoder, &audio_path, cancel).await?;

        let (transcription_id, diarization_id) = select_models(&job.params, &self.config.defaults);

        let proc_ctx = ProcessingContext {
            job_id: job.id.to_string(),
            output_dir: self.config.output_dir.join(job.id.as_str()),
            temp_dir: self.config.temp_dir.clone(),
            metadata: BTreeMap::new(),
        };
        tokio::fs::create_dir_all(&proc_ctx.output_dir)
            .await
            .map_err(AudioError::from)?;

        let adapter = self
            .registry
            .transcription_adapter(&transcription_id)
            .map_err(PipelineError::Transcription)?;
        if !adapter.is_ready().await {
            return Err(PipelineError::Transcription(AdapterError::NotReady(
                transcription_id,
            )));
        }

        let requires_mono_16k = adapter.capabilities().requires_mono_16k;
        let prepared = match preprocess::preprocess(
            &self.transcoder,
            &audio,
            requires_mono_16k,
            &self.config.temp_dir,
            job.id.as_str(),
            cancel,
        )
        .await
        {
            Ok(prepared) => {
                if let Some(temp) = &prepared.temp_path {
                    temp_files.push(temp.clone());
                }
                prepared
            }
            Err(AudioError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "audio preprocessing failed, using original");
                audio.clone()
            }
        };

        let params = verbatim_adapters::params::params_for_model(&transcription_id, &job.params);
        let mut transcript = adapter
            .transcribe(&prepared, &params, &proc_ctx, cancel)
            .await
            .map_err(PipelineError::Transcription)?;

        if let Some(diarization_id) = diarization_id {
            match self.registry.diarization_adapter(&diarization_id) {
                Err(e) => {
                    warn!(model_id = %diarization_id, error = %e, "diarization adapter not found, skipping");
                }
                Ok(diarizer) => {
                    if !diarizer.is_ready().await {
                        warn!(model_id = %diarization_id, "diarization adapter not ready, skipping");
                    } else {
                        let dparams = verbatim_adapters::params::params_for_model(
                            &diarization_id,
                            &job.params,
                        );
                        match diarizer.diarize(&prepared, &dparams, &proc_ctx, cancel).await {
                            Ok(diarization) => {
                                transcript = merge_diarization(&transcript, &diarization);
                            }
                            Err(e) => {
                                if cancel.is_cancelled() {
                                    return Err(PipelineError::Cancelled);
                                }
                                warn!(error = %e, "diarization failed, proceeding with transcription only");
                            }
                        }
                    }
                }
            }
        }

        if let Some(llm) = &self.llm {
            let title = job.title.as_deref().unwrap_or("Untitled");
            match apply_smart_analysis(llm, title, &mut transcript).await {
                Ok(outcome) => {
                    if let Some(summary) = outcome.summary {
                        if let Err(e) = self.jobs.update_summary(&job.id, &summary) {
                            warn!(error = %e, "failed to save meeting summary");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "smart analysis failed, proceeding with raw transcript");
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let transcript_json = serde_json::to_string(&transcript)?;
        self.jobs.update_transcript(&job.id, &transcript_json)?;
        info!(text_length = transcript.text.len(), "saved transcription results");
        Ok(())
    }

    /// Rewrite the live container to restore its duration header. Returns
    /// the path processing should continue with.
    async fn fix_live_container(
        &self,
        job: &JobRow,
        audio_path: &std::path::Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, PipelineError> {
        let fixed = audio_path.with_file_name(format!(
            "{}_fixed.{LIVE_CONTAINER_EXT}",
            audio_path.file_stem().and_then(|s| s.to_str()).unwrap_or("audio")
        ));

        match self.transcoder.rewrite_container(audio_path, &fixed, cancel).await {
            Ok(()) => {
                let usable = tokio::fs::metadata(&fixed).await.map(|m| m.len() > 0).unwrap_or(false);
                if !usable {
                    return Ok(audio_path.to_owned());
                }
                match self.jobs.update_audio_path(&job.id, &fixed.to_string_lossy()) {
                    Ok(()) => {
                        info!(new_path = %fixed.display(), "live container metadata fixed");
                        Ok(fixed)
                    }
                    Err(e) => {
                        error!(error = %e, "failed to update job audio path, keeping original");
                        Ok(audio_path.to_owned())
                    }
                }
            }
            Err(AudioError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                warn!(error = %e, "failed to fix live container metadata, proceeding with original");
                Ok(audio_path.to_owned())
            }
        }
    }

    /// Close the execution record, broadcast the terminal event, and fire
    /// the webhook when a callback URL is present.
    async fn finish(&self, job: &JobRow, execution_id: i64, status: JobStatus, error: Option<&str>) {
        let execution = match self.executions.complete(execution_id, status, error) {
            Ok(row) => Some(row),
            Err(e) => {
                error!(error = %e, "failed to close execution record");
                None
            }
        };

        self.broadcaster
            .publish(JobEvent::job_update(
                job.id.as_str().to_owned(),
                &status.to_string(),
                error,
            ))
            .await;

        let Some(url) = job.params.callback_url.as_deref().filter(|u| !u.is_empty()) else {
            return;
        };

        // Re-read the row so the payload carries the persisted transcript
        let fresh = self.jobs.find(&job.id).ok().flatten();
        let (audio_path, transcript, summary) = match fresh {
            Some(row) => (row.audio_path, row.transcript, row.summary),
            None => (job.audio_path.clone(), None, None),
        };

        let duration_ms = execution.as_ref().and_then(|e| e.processing_duration_ms);
        let completed_at = execution
            .and_then(|e| e.completed_at)
            .unwrap_or_else(|| Utc::now().to_rfc3339());

        let payload = WebhookPayload {
            job_id: job.id.to_string(),
            status: status.to_string(),
            audio_path,
            transcript,
            summary,
            error_message: error.map(str::to_owned),
            completed_at,
            metadata: serde_json::json!({
                "model": job.params.model,
                "model_family": job.params.model_family,
                "duration_ms": duration_ms,
            }),
        };
        self.webhooks.dispatch(url.to_owned(), payload);
    }
}

#[async_trait]
impl JobProcessor for Arc<ProcessingPipeline> {
    async fn process_job(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        ProcessingPipeline::process_job(Arc::clone(self), job_id.clone(), cancel.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use verbatim_adapters::mock::{MockDiarization, MockTranscription};
    use verbatim_core::params::JobParams;
    use verbatim_core::transcript::TranscriptResult;
    use verbatim_store::Database;

    struct Fixture {
        pipeline: Arc<ProcessingPipeline>,
        jobs: JobRepo,
        executions: ExecutionRepo,
        broadcaster: Arc<JobBroadcaster>,
        dir: tempfile::TempDir,
    }

    fn fixture(registry: ModelRegistry) -> Fixture {
        let db = Database::in_memory().unwrap();
        let jobs = JobRepo::new(db.clone());
        let executions = ExecutionRepo::new(db);
        let broadcaster = Arc::new(JobBroadcaster::new());
        let dir = tempfile::tempdir().unwrap();

        let config = PipelineConfig {
            output_dir: dir.path().join("outputs"),
            temp_dir: dir.path().join("tmp"),
            defaults: ModelDefaults::default(),
        };
        let pipeline = Arc::new(ProcessingPipeline::new(
            Arc::new(registry),
            jobs.clone(),
            executions.clone(),
            Arc::clone(&broadcaster),
            Arc::new(WebhookDispatcher::new()),
            // Bogus binaries force the probe fallback so tests never need ffmpeg
            Transcoder::new("missing-ffmpeg", "missing-ffprobe"),
            config,
        ));

        Fixture { pipeline, jobs, executions, broadcaster, dir }
    }

    fn create_job(fx: &Fixture, params: JobParams) -> JobId {
        let id = JobId::new();
        let audio = fx.dir.path().join(format!("{id}.wav"));
        let mut f = std::fs::File::create(&audio).unwrap();
        f.write_all(&vec![0u8; 64_000]).unwrap();
        let row = JobRow::new(id.clone(), audio.to_string_lossy().into_owned(), params);
        fx.jobs.create(&row).unwrap();
        id
    }

    fn groq_params() -> JobParams {
        JobParams {
            model_family: "groq".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cloud_job_completes_without_diarization() {
        let mut registry = ModelRegistry::new();
        let stt = Arc::new(MockTranscription::succeeding("groq_whisper"));
        let diarizer = Arc::new(MockDiarization::succeeding("pyannote"));
        registry.register_transcription(stt.clone());
        registry.register_diarization(diarizer.clone());

        let fx = fixture(registry);
        let job_id = create_job(&fx, groq_params());

        Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await
            .unwrap();

        let job = fx.jobs.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let transcript: TranscriptResult =
            serde_json::from_str(job.transcript.as_deref().unwrap()).unwrap();
        assert!(!transcript.segments.is_empty());
        assert_eq!(transcript.language, "en");
        // Diarization was never requested
        assert_eq!(diarizer.call_count(), 0);
        assert_eq!(stt.call_count(), 1);

        let exec = fx.executions.latest_for_job(&job_id).unwrap().unwrap();
        assert_eq!(exec.status, JobStatus::Completed);
        assert!(exec.completed_at.is_some());
        assert!(exec.processing_duration_ms.unwrap() >= 0);
    }

    #[tokio::test]
    async fn separate_diarization_attaches_speakers() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        let diarizer = Arc::new(MockDiarization::succeeding("pyannote"));
        registry.register_diarization(diarizer.clone());

        let fx = fixture(registry);
        let mut params = groq_params();
        params.diarize = true;
        let job_id = create_job(&fx, params);

        Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(diarizer.call_count(), 1);
        let transcript: TranscriptResult = serde_json::from_str(
            fx.jobs.get(&job_id).unwrap().transcript.as_deref().unwrap(),
        )
        .unwrap();
        let speakers: std::collections::BTreeSet<_> = transcript
            .segments
            .iter()
            .filter_map(|s| s.speaker.clone())
            .collect();
        assert_eq!(speakers.len(), 2, "expected two distinct speakers");
        assert!(transcript.segments.iter().all(|s| s.speaker.is_some()));
    }

    #[tokio::test]
    async fn transcription_failure_is_terminal() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::failing(
            "groq_whisper",
            "backend returned 500",
        )));

        let fx = fixture(registry);
        let job_id = create_job(&fx, groq_params());

        let result = Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PipelineError::Transcription(_))));

        let job = fx.jobs.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.transcript.is_none(), "no transcript on failure");

        let exec = fx.executions.latest_for_job(&job_id).unwrap().unwrap();
        assert_eq!(exec.status, JobStatus::Failed);
        assert!(exec.error_message.unwrap().contains("500"));
        assert!(exec.completed_at.is_some());
    }

    #[tokio::test]
    async fn unready_diarizer_is_skipped_not_fatal() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        registry.register_diarization(Arc::new(
            MockDiarization::succeeding("pyannote").not_ready(),
        ));

        let fx = fixture(registry);
        let mut params = groq_params();
        params.diarize = true;
        let job_id = create_job(&fx, params);

        Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await
            .unwrap();

        let transcript: TranscriptResult = serde_json::from_str(
            fx.jobs.get(&job_id).unwrap().transcript.as_deref().unwrap(),
        )
        .unwrap();
        assert!(transcript.segments.iter().all(|s| s.speaker.is_none()));
    }

    #[tokio::test]
    async fn failing_diarizer_keeps_transcript() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        registry.register_diarization(Arc::new(MockDiarization::failing("pyannote", "oom")));

        let fx = fixture(registry);
        let mut params = groq_params();
        params.diarize = true;
        let job_id = create_job(&fx, params);

        Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fx.jobs.get(&job_id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn missing_adapter_fails_the_job() {
        let fx = fixture(ModelRegistry::new());
        let job_id = create_job(&fx, groq_params());

        let result = Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::Transcription(AdapterError::NotRegistered(_)))
        ));
        assert_eq!(fx.jobs.get(&job_id).unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn missing_audio_fails_without_execution_record() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        let fx = fixture(registry);

        let id = JobId::new();
        let row = JobRow::new(id.clone(), "/nonexistent/audio.wav", groq_params());
        fx.jobs.create(&row).unwrap();

        let result = Arc::clone(&fx.pipeline)
            .process_job(id.clone(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
        assert_eq!(fx.jobs.get(&id).unwrap().status, JobStatus::Failed);
        assert!(fx.executions.latest_for_job(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn cancellation_fails_execution_and_preserves_transcript_row() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        let fx = fixture(registry);
        let job_id = create_job(&fx, groq_params());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Arc::clone(&fx.pipeline).process_job(job_id.clone(), cancel).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_cancellation());

        let job = fx.jobs.get(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.transcript.is_none(), "cancelled job must not write a transcript");

        let exec = fx.executions.latest_for_job(&job_id).unwrap().unwrap();
        assert_eq!(exec.status, JobStatus::Failed);
        assert!(exec.error_message.unwrap().to_lowercase().contains("cancel"));
    }

    #[tokio::test]
    async fn status_events_broadcast_in_order() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        let fx = fixture(registry);
        let job_id = create_job(&fx, groq_params());

        let (_sub, mut rx) = fx.broadcaster.subscribe(job_id.as_str()).await;

        Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.data["status"], "processing");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.data["status"], "completed");
    }

    #[tokio::test]
    async fn mono_16k_requirement_passes_through_matching_input() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(
            MockTranscription::succeeding("groq_whisper").requiring_mono_16k(),
        ));
        let fx = fixture(registry);

        // The probe fallback reports 16 kHz mono, so no conversion is needed
        let job_id = create_job(&fx, groq_params());
        Arc::clone(&fx.pipeline)
            .process_job(job_id.clone(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fx.jobs.get(&job_id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn multi_track_job_delegates_and_merges() {
        let mut registry = ModelRegistry::new();
        registry.register_transcription(Arc::new(MockTranscription::succeeding("groq_whisper")));
        let fx = fixture(registry);

        let track_a = create_job(&fx, groq_params());
        let track_b = create_job(&fx, groq_params());

        let master_id = JobId::new();
        let audio = fx.dir.path().join("master.wav");
        std::fs::write(&audio, vec![0u8; 1000]).unwrap();
        let mut master = JobRow::new(
            master_id.clone(),
            audio.to_string_lossy().into_owned(),
            JobParams { multi_track: true, ..groq_params() },
        );
        master.multi_track = true;
        master.track_ids = Some(vec![
            track_a.as_str().to_owned(),
            track_b.as_str().to_owned(),
        ]);
        fx.jobs.create(&master).unwrap();

        Arc::clone(&fx.pipeline)
            .process_job(master_id.clone(), CancellationToken::new())
            .await
            .unwrap();

        let merged: TranscriptResult = serde_json::from_str(
            fx.jobs.get(&master_id).unwrap().transcript.as_deref().unwrap(),
        )
        .unwrap();
        // Two sample segments per track
        assert_eq!(merged.segments.len(), 4);
        assert!(merged
            .segments
            .iter()
            .all(|s| s.speaker.as_deref().is_some_and(|sp| sp.starts_with("Track "))));
        assert_eq!(fx.jobs.get(&master_id).unwrap().status, JobStatus::Completed);
        // Track executions were recorded under the full envelope
        assert!(fx.executions.latest_for_job(&track_a).unwrap().is_some());
    }
}
