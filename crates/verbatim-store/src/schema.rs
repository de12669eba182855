pub const SCHEMA_VERSION: u32 = 1;

pub const PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA foreign_keys = ON;
";

pub const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        user_id TEXT,
        title TEXT,
        audio_path TEXT NOT NULL,
        parameters TEXT NOT NULL,
        status TEXT NOT NULL,
        transcript TEXT,
        summary TEXT,
        hidden INTEGER NOT NULL DEFAULT 0,
        multi_track INTEGER NOT NULL DEFAULT 0,
        track_ids TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_jobs_user ON jobs(user_id);
    CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);

    CREATE TABLE IF NOT EXISTS job_executions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        status TEXT NOT NULL,
        actual_parameters TEXT NOT NULL,
        error_message TEXT,
        processing_duration_ms INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_executions_job ON job_executions(job_id);
";
