use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use verbatim_core::ids::JobId;
use verbatim_core::job::JobStatus;
use verbatim_core::params::JobParams;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// One persistent transcription job. The live-session master job uses the
/// session id as its row id; chunk jobs are hidden rows deleted after merge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRow {
    pub id: JobId,
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub audio_path: String,
    pub params: JobParams,
    pub status: JobStatus,
    pub transcript: Option<String>,
    pub summary: Option<String>,
    /// Hidden rows are excluded from user listings.
    pub hidden: bool,
    pub multi_track: bool,
    pub track_ids: Option<Vec<String>>,
    pub created_at: String,
}

impl JobRow {
    pub fn new(id: JobId, audio_path: impl Into<String>, params: JobParams) -> Self {
        Self {
            id,
            user_id: None,
            title: None,
            audio_path: audio_path.into(),
            params,
            status: JobStatus::Pending,
            transcript: None,
            summary: None,
            hidden: false,
            multi_track: false,
            track_ids: None,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Clone)]
pub struct JobRepo {
    db: Database,
}

const SELECT_COLUMNS: &str = "id, user_id, title, audio_path, parameters, status, transcript,
            summary, hidden, multi_track, track_ids, created_at";

impl JobRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a fully formed row.
    #[instrument(skip(self, row), fields(job_id = %row.id))]
    pub fn create(&self, row: &JobRow) -> Result<(), StoreError> {
        let params_json = serde_json::to_string(&row.params)?;
        let track_ids_json = row
            .track_ids
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO jobs (id, user_id, title, audio_path, parameters, status,
                                   transcript, summary, hidden, multi_track, track_ids, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                rusqlite::params![
                    row.id.as_str(),
                    row.user_id,
                    row.title,
                    row.audio_path,
                    params_json,
                    row.status.to_string(),
                    row.transcript,
                    row.summary,
                    row.hidden,
                    row.multi_track,
                    track_ids_json,
                    row.created_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Get a job by id, erroring when absent.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn get(&self, id: &JobId) -> Result<JobRow, StoreError> {
        self.find(id)?
            .ok_or_else(|| StoreError::NotFound(format!("job {id}")))
    }

    /// Get a job by id, `None` when absent.
    pub fn find(&self, id: &JobId) -> Result<Option<JobRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {SELECT_COLUMNS} FROM jobs WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_job(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Insert the live-session master job, or reclaim an existing row by
    /// updating its owner and title. Called on every `config` frame.
    #[instrument(skip(self, params), fields(job_id = %id))]
    pub fn upsert_master(
        &self,
        id: &JobId,
        user_id: &str,
        title: &str,
        audio_path: &str,
        params: &JobParams,
    ) -> Result<(), StoreError> {
        if self.find(id)?.is_some() {
            self.db.with_conn(|conn| {
                conn.execute(
                    "UPDATE jobs SET user_id = ?1, title = ?2 WHERE id = ?3",
                    rusqlite::params![user_id, title, id.as_str()],
                )?;
                Ok(())
            })
        } else {
            let mut row = JobRow::new(id.clone(), audio_path, params.clone());
            row.user_id = Some(user_id.to_owned());
            row.title = Some(title.to_owned());
            row.status = JobStatus::Processing;
            self.create(&row)
        }
    }

    #[instrument(skip(self), fields(job_id = %id, status = %status))]
    pub fn update_status(&self, id: &JobId, status: JobStatus) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE jobs SET status = ?1 WHERE id = ?2",
                rusqlite::params![status.to_string(), id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("job {id}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self, transcript_json), fields(job_id = %id))]
    pub fn update_transcript(&self, id: &JobId, transcript_json: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE jobs SET transcript = ?1 WHERE id = ?2",
                rusqlite::params![transcript_json, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("job {id}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self, summary), fields(job_id = %id))]
    pub fn update_summary(&self, id: &JobId, summary: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE jobs SET summary = ?1 WHERE id = ?2",
                rusqlite::params![summary, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("job {id}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self), fields(job_id = %id))]
    pub fn update_audio_path(&self, id: &JobId, audio_path: &str) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE jobs SET audio_path = ?1 WHERE id = ?2",
                rusqlite::params![audio_path, id.as_str()],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("job {id}")));
            }
            Ok(())
        })
    }

    /// Delete a job row. Execution records cascade.
    #[instrument(skip(self), fields(job_id = %id))]
    pub fn delete(&self, id: &JobId) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM jobs WHERE id = ?1", [id.as_str()])?;
            Ok(())
        })
    }

    /// List a user's jobs, newest first. Hidden rows are excluded.
    #[instrument(skip(self))]
    pub fn list_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<JobRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM jobs
                 WHERE user_id = ?1 AND hidden = 0
                 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            let mut rows = stmt.query(rusqlite::params![user_id, limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_job(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> Result<JobRow, StoreError> {
    let params_raw: String = row_helpers::get(row, 4, "jobs", "parameters")?;
    let status_raw: String = row_helpers::get(row, 5, "jobs", "status")?;
    let track_ids_raw: Option<String> = row_helpers::get_opt(row, 10, "jobs", "track_ids")?;

    Ok(JobRow {
        id: JobId::from_raw(row_helpers::get::<String>(row, 0, "jobs", "id")?),
        user_id: row_helpers::get_opt(row, 1, "jobs", "user_id")?,
        title: row_helpers::get_opt(row, 2, "jobs", "title")?,
        audio_path: row_helpers::get(row, 3, "jobs", "audio_path")?,
        params: row_helpers::parse_typed_json(&params_raw, "jobs", "parameters")?,
        status: row_helpers::parse_enum(&status_raw, "jobs", "status")?,
        transcript: row_helpers::get_opt(row, 6, "jobs", "transcript")?,
        summary: row_helpers::get_opt(row, 7, "jobs", "summary")?,
        hidden: row_helpers::get(row, 8, "jobs", "hidden")?,
        multi_track: row_helpers::get(row, 9, "jobs", "multi_track")?,
        track_ids: track_ids_raw
            .map(|raw| row_helpers::parse_typed_json(&raw, "jobs", "track_ids"))
            .transpose()?,
        created_at: row_helpers::get(row, 11, "jobs", "created_at")?,
    })
}
