//! In-memory store for short-lived and live jobs, with periodic eviction of
//! expired entries and their on-disk artifacts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use verbatim_core::job::JobStatus;
use verbatim_core::params::JobParams;

/// Lifetime of an ephemeral quick job.
pub const EPHEMERAL_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// "Never expires" for live-session jobs saved to the portal.
pub const PERMANENT_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuickJob {
    pub id: String,
    pub title: String,
    pub status: JobStatus,
    pub audio_path: PathBuf,
    pub params: JobParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QuickJob {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Sole owner of quick-job entries. The map lock is held only for map
/// operations; artifact deletion happens after release.
pub struct QuickJobStore {
    jobs: RwLock<HashMap<String, QuickJob>>,
    temp_dir: PathBuf,
}

impl QuickJobStore {
    pub fn new(temp_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let temp_dir = temp_dir.into();
        std::fs::create_dir_all(&temp_dir)?;
        Ok(Self {
            jobs: RwLock::new(HashMap::new()),
            temp_dir,
        })
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn insert(&self, job: QuickJob) {
        self.jobs.write().insert(job.id.clone(), job);
    }

    /// Fetch a live entry; expired entries read as absent.
    pub fn get(&self, id: &str) -> Option<QuickJob> {
        let jobs = self.jobs.read();
        let job = jobs.get(id)?;
        if job.is_expired_at(Utc::now()) {
            return None;
        }
        Some(job.clone())
    }

    pub fn set_status(&self, id: &str, status: JobStatus, error_message: Option<String>) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(id) {
            job.status = status;
            job.error_message = error_message;
        }
    }

    pub fn set_transcript(&self, id: &str, transcript: String) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(id) {
            job.transcript = Some(transcript);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    pub fn transcript_cache_path(&self, id: &str) -> PathBuf {
        self.temp_dir.join(format!("{id}_transcript.json"))
    }

    pub fn output_dir_path(&self, id: &str) -> PathBuf {
        self.temp_dir.join(format!("{id}_output"))
    }

    /// Evict every entry past its expiry and delete its artifacts: audio
    /// file, transcript cache, and output directory. Returns the evicted ids.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<QuickJob> = {
            let mut jobs = self.jobs.write();
            let ids: Vec<String> = jobs
                .values()
                .filter(|j| j.is_expired_at(now))
                .map(|j| j.id.clone())
                .collect();
            ids.iter().filter_map(|id| jobs.remove(id)).collect()
        };

        let mut removed = Vec::with_capacity(expired.len());
        for job in expired {
            if let Err(e) = std::fs::remove_file(&job.audio_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(file = %job.audio_path.display(), error = %e, "failed to delete expired audio");
                }
            }
            let _ = std::fs::remove_file(self.transcript_cache_path(&job.id));
            let _ = std::fs::remove_dir_all(self.output_dir_path(&job.id));
            info!(job_id = %job.id, "evicted expired quick job");
            removed.push(job.id);
        }
        removed
    }

    /// Periodic eviction loop; exits when the shutdown token fires.
    pub async fn run_expiry(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval is immediate
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_expired(Utc::now());
                    if !removed.is_empty() {
                        info!(count = removed.len(), "expiry sweep removed quick jobs");
                    }
                }
                () = shutdown.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, Arc<QuickJobStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(QuickJobStore::new(dir.path().join("quick")).unwrap());
        (dir, store)
    }

    fn job(store: &QuickJobStore, id: &str, ttl: Duration) -> QuickJob {
        let audio = store.temp_dir().join(format!("{id}.webm"));
        std::fs::write(&audio, b"audio").unwrap();
        let now = Utc::now();
        QuickJob {
            id: id.to_owned(),
            title: "Quick Transcription".into(),
            status: JobStatus::Pending,
            audio_path: audio,
            params: JobParams::default(),
            transcript: None,
            error_message: None,
            created_at: now,
            expires_at: now + chrono::Duration::from_std(ttl).unwrap(),
        }
    }

    #[test]
    fn insert_and_get() {
        let (_dir, store) = store();
        store.insert(job(&store, "chunk1", EPHEMERAL_TTL));
        let fetched = store.get("chunk1").unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn expired_entry_reads_as_absent() {
        let (_dir, store) = store();
        let mut j = job(&store, "chunk1", EPHEMERAL_TTL);
        j.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.insert(j);
        assert!(store.get("chunk1").is_none());
        // Entry still occupies the map until the sweep runs
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn status_and_transcript_updates() {
        let (_dir, store) = store();
        store.insert(job(&store, "chunk1", EPHEMERAL_TTL));
        store.set_status("chunk1", JobStatus::Failed, Some("env setup failed".into()));
        store.set_transcript("chunk1", "[Speaker 1]: hello".into());
        let fetched = store.get("chunk1").unwrap();
        assert_eq!(fetched.status, JobStatus::Failed);
        assert_eq!(fetched.error_message.as_deref(), Some("env setup failed"));
        assert_eq!(fetched.transcript.as_deref(), Some("[Speaker 1]: hello"));
    }

    #[test]
    fn sweep_removes_entry_and_artifacts() {
        let (_dir, store) = store();
        let mut j = job(&store, "chunk1", EPHEMERAL_TTL);
        j.expires_at = Utc::now() - chrono::Duration::seconds(1);
        let audio_path = j.audio_path.clone();
        store.insert(j);

        // Build the on-disk artifacts the sweep must remove
        std::fs::write(store.transcript_cache_path("chunk1"), b"{}").unwrap();
        std::fs::create_dir_all(store.output_dir_path("chunk1")).unwrap();

        let removed = store.sweep_expired(Utc::now());
        assert_eq!(removed, vec!["chunk1".to_owned()]);
        assert!(store.get("chunk1").is_none());
        assert_eq!(store.len(), 0);
        assert!(!audio_path.exists());
        assert!(!store.transcript_cache_path("chunk1").exists());
        assert!(!store.output_dir_path("chunk1").exists());
    }

    #[test]
    fn sweep_keeps_live_entries() {
        let (_dir, store) = store();
        store.insert(job(&store, "permanent", PERMANENT_TTL));
        store.insert(job(&store, "fresh", EPHEMERAL_TTL));
        let removed = store.sweep_expired(Utc::now());
        assert!(removed.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn expiry_loop_stops_on_shutdown() {
        let (_dir, store) = store();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&store).run_expiry(
            Duration::from_secs(3600),
            shutdown.clone(),
        ));
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("expiry loop should exit promptly")
            .unwrap();
    }
}
