//! Multi-track processing. The sub-processor holds only an
//! operation-invocation handle onto the pipeline, not the pipeline itself,
//! which keeps the dependency one-directional.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use verbatim_core::ids::JobId;
use verbatim_core::transcript::TranscriptResult;
use verbatim_store::{JobRepo, JobRow};

use crate::error::PipelineError;

/// The one pipeline operation other components may invoke.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process_job(
        &self,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError>;
}

/// Runs each sub-track through the pipeline, then interleaves the per-track
/// transcripts into the master by start time, labeling unattributed segments
/// with their track.
pub struct MultiTrackProcessor {
    handle: Arc<dyn JobProcessor>,
    jobs: JobRepo,
}

impl MultiTrackProcessor {
    pub fn new(handle: Arc<dyn JobProcessor>, jobs: JobRepo) -> Self {
        Self { handle, jobs }
    }

    pub async fn process(
        &self,
        master: &JobRow,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let tracks = master
            .track_ids
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::MultiTrack("job has no sub-tracks".into()))?;

        info!(job_id = %master.id, tracks = tracks.len(), "processing multi-track job");

        let mut combined = TranscriptResult::default();

        for (index, raw_id) in tracks.iter().enumerate() {
            let track_id = JobId::from_raw(raw_id.clone());
            self.handle
                .process_job(&track_id, cancel)
                .await
                .map_err(|e| PipelineError::MultiTrack(format!("track {track_id}: {e}")))?;

            let row = self.jobs.get(&track_id)?;
            let json = row.transcript.ok_or_else(|| {
                PipelineError::MultiTrack(format!("track {track_id} produced no transcript"))
            })?;
            let result: TranscriptResult = serde_json::from_str(&json)?;

            let label = format!("Track {}", index + 1);
            for mut segment in result.segments {
                if segment.speaker.is_none() {
                    segment.speaker = Some(label.clone());
                }
                combined.segments.push(segment);
            }
            if combined.language.is_empty() {
                combined.language = result.language;
            }
            if combined.model_used.is_empty() {
                combined.model_used = result.model_used;
            }
            combined.processing_time += result.processing_time;
        }

        combined
            .segments
            .sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));
        combined.text = combined
            .segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        self.jobs
            .update_transcript(&master.id, &serde_json::to_string(&combined)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verbatim_core::params::JobParams;
    use verbatim_core::transcript::TranscriptSegment;
    use verbatim_store::Database;

    /// Stand-in pipeline that writes a canned transcript to the track row.
    struct StubProcessor {
        jobs: JobRepo,
    }

    #[async_trait]
    impl JobProcessor for StubProcessor {
        async fn process_job(
            &self,
            job_id: &JobId,
            _cancel: &CancellationToken,
        ) -> Result<(), PipelineError> {
            let offset = if job_id.as_str().ends_with('1') { 0.0 } else { 0.5 };
            let result = TranscriptResult {
                language: "en".into(),
                text: format!("text from {job_id}"),
                segments: vec![TranscriptSegment {
                    start: offset,
                    end: offset + 1.0,
                    text: format!("text from {job_id}"),
                    speaker: None,
                    words: None,
                }],
                ..Default::default()
            };
            self.jobs
                .update_transcript(job_id, &serde_json::to_string(&result).unwrap())?;
            Ok(())
        }
    }

    fn setup() -> (JobRepo, JobRow) {
        let db = Database::in_memory().unwrap();
        let jobs = JobRepo::new(db);

        let mut master = JobRow::new(JobId::from_raw("job_master"), "/a.wav", JobParams::default());
        master.multi_track = true;
        master.track_ids = Some(vec!["job_track1".into(), "job_track2".into()]);
        jobs.create(&master).unwrap();

        for tid in ["job_track1", "job_track2"] {
            let row = JobRow::new(JobId::from_raw(tid), format!("/{tid}.wav"), JobParams::default());
            jobs.create(&row).unwrap();
        }
        (jobs, master)
    }

    #[tokio::test]
    async fn merges_tracks_sorted_by_start() {
        let (jobs, master) = setup();
        let processor =
            MultiTrackProcessor::new(Arc::new(StubProcessor { jobs: jobs.clone() }), jobs.clone());

        processor.process(&master, &CancellationToken::new()).await.unwrap();

        let merged: TranscriptResult = serde_json::from_str(
            &jobs.get(&master.id).unwrap().transcript.unwrap(),
        )
        .unwrap();
        assert_eq!(merged.segments.len(), 2);
        assert!(merged.segments[0].start <= merged.segments[1].start);
        assert_eq!(merged.segments[0].speaker.as_deref(), Some("Track 1"));
        assert_eq!(merged.segments[1].speaker.as_deref(), Some("Track 2"));
        assert!(merged.text.contains("job_track1"));
    }

    #[tokio::test]
    async fn missing_track_list_is_an_error() {
        let (jobs, mut master) = setup();
        master.track_ids = None;
        let processor =
            MultiTrackProcessor::new(Arc::new(StubProcessor { jobs: jobs.clone() }), jobs);
        let result = processor.process(&master, &CancellationToken::new()).await;
        assert!(matches!(result, Err(PipelineError::MultiTrack(_))));
    }
}
