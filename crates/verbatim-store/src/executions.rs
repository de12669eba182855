use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use verbatim_core::ids::JobId;
use verbatim_core::job::JobStatus;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// One processing attempt for a job. When the status is terminal,
/// `completed_at` is set and `processing_duration_ms` equals the wall-clock
/// distance from `started_at`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRow {
    pub id: i64,
    pub job_id: JobId,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub status: JobStatus,
    /// Snapshot of the job parameters at dispatch time (JSON).
    pub actual_parameters: String,
    pub error_message: Option<String>,
    pub processing_duration_ms: Option<i64>,
}

#[derive(Clone)]
pub struct ExecutionRepo {
    db: Database,
}

impl ExecutionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a `processing` execution record for a dispatch.
    #[instrument(skip(self, actual_parameters), fields(job_id = %job_id))]
    pub fn create(&self, job_id: &JobId, actual_parameters: &str) -> Result<ExecutionRow, StoreError> {
        let started_at = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO job_executions (job_id, started_at, status, actual_parameters)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    job_id.as_str(),
                    started_at,
                    JobStatus::Processing.to_string(),
                    actual_parameters,
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(ExecutionRow {
                id,
                job_id: job_id.clone(),
                started_at: started_at.clone(),
                completed_at: None,
                status: JobStatus::Processing,
                actual_parameters: actual_parameters.to_owned(),
                error_message: None,
                processing_duration_ms: None,
            })
        })
    }

    /// Close an execution with a terminal status. Sets `completed_at` and
    /// computes the processing duration from the stored start time.
    #[instrument(skip(self, error_message), fields(execution_id = id, status = %status))]
    pub fn complete(
        &self,
        id: i64,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<ExecutionRow, StoreError> {
        let completed = Utc::now();
        self.db.with_conn(|conn| {
            let started_at: String = conn
                .query_row(
                    "SELECT started_at FROM job_executions WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .map_err(|_| StoreError::NotFound(format!("execution {id}")))?;

            let duration_ms = DateTime::parse_from_rfc3339(&started_at)
                .map(|started| (completed - started.with_timezone(&Utc)).num_milliseconds().max(0))
                .unwrap_or(0);

            conn.execute(
                "UPDATE job_executions
                 SET completed_at = ?1, status = ?2, error_message = ?3, processing_duration_ms = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    completed.to_rfc3339(),
                    status.to_string(),
                    error_message,
                    duration_ms,
                    id,
                ],
            )?;
            Ok(())
        })?;
        self.get(id)
    }

    pub fn get(&self, id: i64) -> Result<ExecutionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_id, started_at, completed_at, status, actual_parameters,
                        error_message, processing_duration_ms
                 FROM job_executions WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => row_to_execution(row),
                None => Err(StoreError::NotFound(format!("execution {id}"))),
            }
        })
    }

    /// Most recent execution for a job, if any.
    pub fn latest_for_job(&self, job_id: &JobId) -> Result<Option<ExecutionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_id, started_at, completed_at, status, actual_parameters,
                        error_message, processing_duration_ms
                 FROM job_executions WHERE job_id = ?1 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([job_id.as_str()])?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_execution(row)?)),
                None => Ok(None),
            }
        })
    }

    pub fn list_for_job(&self, job_id: &JobId) -> Result<Vec<ExecutionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, job_id, started_at, completed_at, status, actual_parameters,
                        error_message, processing_duration_ms
                 FROM job_executions WHERE job_id = ?1 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([job_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_execution(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> Result<ExecutionRow, StoreError> {
    let status_raw: String = row_helpers::get(row, 4, "job_executions", "status")?;
    Ok(ExecutionRow {
        id: row_helpers::get(row, 0, "job_executions", "id")?,
        job_id: JobId::from_raw(row_helpers::get::<String>(row, 1, "job_executions", "job_id")?),
        started_at: row_helpers::get(row, 2, "job_executions", "started_at")?,
        completed_at: row_helpers::get_opt(row, 3, "job_executions", "completed_at")?,
        status: row_helpers::parse_enum(&status_raw, "job_executions", "status")?,
        actual_parameters: row_helpers::get(row, 5, "job_executions", "actual_parameters")?,
        error_message: row_helpers::get_opt(row, 6, "job_executions", "error_message")?,
        processing_duration_ms: row_helpers::get_opt(row, 7, "job_executions", "processing_duration_ms")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobRepo, JobRow};
    use verbatim_core::params::JobParams;

    fn setup() -> (JobRepo, ExecutionRepo, JobId) {
        let db = Database::in_memory().unwrap();
        let jobs = JobRepo::new(db.clone());
        let executions = ExecutionRepo::new(db);
        let job = JobRow::new(JobId::new(), "/a.wav", JobParams::default());
        jobs.create(&job).unwrap();
        (jobs, executions, job.id)
    }

    #[test]
    fn create_opens_processing_execution() {
        let (_jobs, executions, job_id) = setup();
        let exec = executions.create(&job_id, "{}").unwrap();
        assert_eq!(exec.status, JobStatus::Processing);
        assert!(exec.completed_at.is_none());
        assert!(exec.processing_duration_ms.is_none());
    }

    #[test]
    fn complete_sets_terminal_invariants() {
        let (_jobs, executions, job_id) = setup();
        let exec = executions.create(&job_id, "{}").unwrap();
        let done = executions.complete(exec.id, JobStatus::Completed, None).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.processing_duration_ms.unwrap() >= 0);
        assert!(done.error_message.is_none());
    }

    #[test]
    fn complete_with_failure_records_message() {
        let (_jobs, executions, job_id) = setup();
        let exec = executions.create(&job_id, "{}").unwrap();
        let done = executions
            .complete(exec.id, JobStatus::Failed, Some("transcription failed: 500"))
            .unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(done.error_message.as_deref(), Some("transcription failed: 500"));
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn complete_missing_execution_is_not_found() {
        let (_jobs, executions, _job_id) = setup();
        let result = executions.complete(9_999, JobStatus::Failed, None);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn latest_for_job_picks_newest() {
        let (_jobs, executions, job_id) = setup();
        let first = executions.create(&job_id, "{}").unwrap();
        executions.complete(first.id, JobStatus::Failed, Some("boom")).unwrap();
        let second = executions.create(&job_id, "{}").unwrap();

        let latest = executions.latest_for_job(&job_id).unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.status, JobStatus::Processing);

        let all = executions.list_for_job(&job_id).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn executions_cascade_with_job_delete() {
        let (jobs, executions, job_id) = setup();
        executions.create(&job_id, "{}").unwrap();
        jobs.delete(&job_id).unwrap();
        assert!(executions.latest_for_job(&job_id).unwrap().is_none());
    }
}
