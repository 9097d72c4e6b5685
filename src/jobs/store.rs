//! # Job Store
//!
//! Persistence for jobs, transcript results, audio sources and model
//! descriptors.
//!
//! The scheduler and the HTTP handlers only see the [`JobStore`] trait for the
//! job/result lifecycle. [`Database`] implements it on SQLite: one connection
//! behind a `parking_lot::Mutex`, one small statement (or transaction) per call.
//!
//! ## Key Rust Concepts:
//! - **Trait objects**: `Arc<dyn JobStore>` lets tests and the scheduler share one store
//! - **Interior mutability**: every method takes `&self`; the mutex isolates each call
//! - **Transactions**: status checks and the writes that depend on them commit together

use crate::error::{AppError, AppResult};
use crate::models::{
    AudioSource, DescriptorStatus, Job, JobStatus, ModelDescriptor, ModelKind, TranscriptResult,
};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// Job and result lifecycle operations used by the scheduler and handlers.
///
/// Status changes are monotonic: implementations reject any transition not
/// allowed by [`JobStatus::can_transition_to`] with `AppError::Conflict`.
pub trait JobStore: Send + Sync {
    fn create_job(&self, job: Job) -> AppResult<Job>;
    fn get_job(&self, id: Uuid) -> AppResult<Job>;
    /// Newest first.
    fn list_jobs(&self) -> AppResult<Vec<Job>>;
    fn mark_running(&self, id: Uuid) -> AppResult<Job>;
    /// Finish the job and create its result from the normalized text.
    fn mark_finished(&self, id: Uuid, text: String) -> AppResult<TranscriptResult>;
    fn mark_failed(&self, id: Uuid, error: String) -> AppResult<Job>;
    /// Removes the job and its result.
    fn delete_job(&self, id: Uuid) -> AppResult<()>;
    /// Result owned by the job `job_id`.
    fn get_result(&self, job_id: Uuid) -> AppResult<TranscriptResult>;
    /// Newest first.
    fn list_results(&self) -> AppResult<Vec<TranscriptResult>>;
    fn delete_result(&self, id: Uuid) -> AppResult<()>;
    fn set_summary(&self, job_id: Uuid, summary: String, algorithm: String) -> AppResult<TranscriptResult>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audio_sources (
    id BLOB PRIMARY KEY,
    filename TEXT NOT NULL,
    path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    duration_secs REAL,
    sample_rate INTEGER,
    uploaded_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS jobs (
    id BLOB PRIMARY KEY,
    audio_id BLOB NOT NULL,
    model_name TEXT NOT NULL,
    model_params TEXT NOT NULL,
    status TEXT NOT NULL,
    progress REAL NOT NULL DEFAULT 0.0,
    submitted_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    error TEXT
);

CREATE TABLE IF NOT EXISTS results (
    id BLOB PRIMARY KEY,
    job_id BLOB NOT NULL UNIQUE REFERENCES jobs(id) ON DELETE CASCADE,
    text TEXT NOT NULL,
    summary TEXT,
    summary_algo TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS models (
    id BLOB PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    local_path TEXT,
    config TEXT NOT NULL,
    version TEXT NOT NULL,
    size_bytes INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_submitted ON jobs(submitted_at);
"#;

const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;

const JOB_COLUMNS: &str =
    "id, audio_id, model_name, model_params, status, progress, submitted_at, started_at, finished_at, error";
const RESULT_COLUMNS: &str = "id, job_id, text, summary, summary_algo, created_at";
const AUDIO_COLUMNS: &str = "id, filename, path, size_bytes, duration_secs, sample_rate, uploaded_at";
const MODEL_COLUMNS: &str =
    "id, name, display_name, kind, status, local_path, config, version, size_bytes, created_at, updated_at";

// Enums are stored as their snake_case serde names.
macro_rules! text_enum_sql {
    ($($ty:ty),*) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                match serde_json::to_value(self) {
                    Ok(Value::String(name)) => Ok(ToSqlOutput::from(name)),
                    _ => Err(rusqlite::Error::ToSqlConversionFailure(
                        format!("{} is not a plain string", stringify!($ty)).into(),
                    )),
                }
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let raw = value.as_str()?;
                serde_json::from_value(Value::String(raw.to_string()))
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    )*};
}

text_enum_sql!(JobStatus, ModelKind, DescriptorStatus);

fn job_from_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    let params: Value = row.get(3)?;
    let progress: f64 = row.get(5)?;
    Ok(Job {
        id: row.get(0)?,
        audio_id: row.get(1)?,
        model_name: row.get(2)?,
        model_params: match params {
            Value::Object(map) => map,
            _ => Default::default(),
        },
        status: row.get(4)?,
        progress: progress as f32,
        submitted_at: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
        error: row.get(9)?,
    })
}

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TranscriptResult> {
    Ok(TranscriptResult {
        id: row.get(0)?,
        job_id: row.get(1)?,
        text: row.get(2)?,
        summary: row.get(3)?,
        summary_algo: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn audio_from_row(row: &Row<'_>) -> rusqlite::Result<AudioSource> {
    let path: String = row.get(2)?;
    let size_bytes: i64 = row.get(3)?;
    Ok(AudioSource {
        id: row.get(0)?,
        filename: row.get(1)?,
        path: PathBuf::from(path),
        size_bytes: size_bytes.max(0) as u64,
        duration_secs: row.get(4)?,
        sample_rate: row.get(5)?,
        uploaded_at: row.get(6)?,
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<ModelDescriptor> {
    let local_path: Option<String> = row.get(5)?;
    let size_bytes: Option<i64> = row.get(8)?;
    Ok(ModelDescriptor {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        kind: row.get(3)?,
        status: row.get(4)?,
        local_path: local_path.map(PathBuf::from),
        config: row.get(6)?,
        version: row.get(7)?,
        size_bytes: size_bytes.map(|size| size.max(0) as u64),
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn job_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Job '{}' not found", id))
}

fn model_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Model '{}' not found", id))
}

fn load_job(conn: &Connection, id: Uuid) -> AppResult<Job> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
        params![id],
        job_from_row,
    )
    .optional()?
    .ok_or_else(|| job_not_found(id))
}

fn load_model(conn: &Connection, id: Uuid) -> AppResult<ModelDescriptor> {
    conn.query_row(
        &format!("SELECT {} FROM models WHERE id = ?1", MODEL_COLUMNS),
        params![id],
        model_from_row,
    )
    .optional()?
    .ok_or_else(|| model_not_found(id))
}

/// Load the job and check that it may move to `next`.
fn check_transition(conn: &Connection, id: Uuid, next: JobStatus) -> AppResult<Job> {
    let job = load_job(conn, id)?;
    if !job.status.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Job '{}' cannot move from {} to {}",
            id,
            job.status.as_str(),
            next.as_str()
        )));
    }
    Ok(job)
}

fn write_model(conn: &Connection, descriptor: &ModelDescriptor) -> AppResult<()> {
    conn.execute(
        "UPDATE models SET name = ?2, display_name = ?3, kind = ?4, status = ?5, local_path = ?6,
                config = ?7, version = ?8, size_bytes = ?9, updated_at = ?10
         WHERE id = ?1",
        params![
            descriptor.id,
            descriptor.name,
            descriptor.display_name,
            descriptor.kind,
            descriptor.status,
            descriptor.local_path.as_deref().map(path_text),
            descriptor.config,
            descriptor.version,
            descriptor.size_bytes.map(|size| size as i64),
            descriptor.updated_at,
        ],
    )?;
    Ok(())
}

pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Database {
    /// Store that never touches the disk.
    pub fn in_memory() -> AppResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    /// Open (or create) the SQLite database at `path`.
    ///
    /// Jobs that were still pending or running when the previous process
    /// stopped have no worker any more; they are marked failed.
    pub fn open(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let database = Self::init(Connection::open(&path)?, Some(path))?;

        let interrupted = database.conn.lock().execute(
            "UPDATE jobs SET status = ?1, finished_at = ?2, error = ?3
             WHERE status IN ('pending', 'running')",
            params![
                JobStatus::Failed,
                Utc::now(),
                "service restarted before the job completed"
            ],
        )?;
        if interrupted > 0 {
            warn!(count = interrupted, "marked interrupted jobs as failed");
        }

        info!(path = ?database.path, "database opened");
        Ok(database)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> AppResult<Self> {
        conn.execute_batch(PRAGMAS)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // Audio sources

    pub fn insert_audio(&self, audio: AudioSource) -> AppResult<AudioSource> {
        self.conn.lock().execute(
            &format!("INSERT INTO audio_sources ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", AUDIO_COLUMNS),
            params![
                audio.id,
                audio.filename,
                path_text(&audio.path),
                audio.size_bytes as i64,
                audio.duration_secs,
                audio.sample_rate,
                audio.uploaded_at,
            ],
        )?;
        Ok(audio)
    }

    pub fn get_audio(&self, id: Uuid) -> AppResult<AudioSource> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM audio_sources WHERE id = ?1", AUDIO_COLUMNS),
                params![id],
                audio_from_row,
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("Audio '{}' not found", id)))
    }

    /// Newest first.
    pub fn list_audio(&self) -> AppResult<Vec<AudioSource>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM audio_sources ORDER BY uploaded_at DESC",
            AUDIO_COLUMNS
        ))?;
        let audio = stmt
            .query_map([], audio_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(audio)
    }

    pub fn delete_audio(&self, id: Uuid) -> AppResult<AudioSource> {
        let audio = self.get_audio(id)?;
        self.conn
            .lock()
            .execute("DELETE FROM audio_sources WHERE id = ?1", params![id])?;
        Ok(audio)
    }

    // Model descriptors

    /// Insert a descriptor; names are unique.
    pub fn insert_model(&self, descriptor: ModelDescriptor) -> AppResult<ModelDescriptor> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let taken: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM models WHERE name = ?1)",
            params![descriptor.name],
            |row| row.get(0),
        )?;
        if taken {
            return Err(AppError::Conflict(format!(
                "Model '{}' is already registered",
                descriptor.name
            )));
        }
        tx.execute(
            &format!(
                "INSERT INTO models ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                MODEL_COLUMNS
            ),
            params![
                descriptor.id,
                descriptor.name,
                descriptor.display_name,
                descriptor.kind,
                descriptor.status,
                descriptor.local_path.as_deref().map(path_text),
                descriptor.config,
                descriptor.version,
                descriptor.size_bytes.map(|size| size as i64),
                descriptor.created_at,
                descriptor.updated_at,
            ],
        )?;
        tx.commit()?;
        Ok(descriptor)
    }

    pub fn get_model(&self, id: Uuid) -> AppResult<ModelDescriptor> {
        load_model(&self.conn.lock(), id)
    }

    pub fn find_model_by_name(&self, name: &str) -> AppResult<Option<ModelDescriptor>> {
        let model = self
            .conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM models WHERE name = ?1", MODEL_COLUMNS),
                params![name],
                model_from_row,
            )
            .optional()?;
        Ok(model)
    }

    /// Sorted by name.
    pub fn list_models(&self) -> AppResult<Vec<ModelDescriptor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM models ORDER BY name", MODEL_COLUMNS))?;
        let models = stmt
            .query_map([], model_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(models)
    }

    /// Mark `id` active and demote the previously active model of the same kind.
    pub fn activate_model(&self, id: Uuid) -> AppResult<ModelDescriptor> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut descriptor = load_model(&tx, id)?;
        let now = Utc::now();

        tx.execute(
            "UPDATE models SET status = ?1, updated_at = ?2
             WHERE kind = ?3 AND status = ?4 AND id != ?5",
            params![
                DescriptorStatus::Available,
                now,
                descriptor.kind,
                DescriptorStatus::Active,
                id
            ],
        )?;
        descriptor.status = DescriptorStatus::Active;
        descriptor.updated_at = now;
        write_model(&tx, &descriptor)?;

        tx.commit()?;
        Ok(descriptor)
    }

    pub fn update_model(
        &self,
        id: Uuid,
        update: impl FnOnce(&mut ModelDescriptor),
    ) -> AppResult<ModelDescriptor> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut descriptor = load_model(&tx, id)?;
        update(&mut descriptor);
        descriptor.updated_at = Utc::now();
        write_model(&tx, &descriptor)?;
        tx.commit()?;
        Ok(descriptor)
    }

    pub fn delete_model(&self, id: Uuid) -> AppResult<ModelDescriptor> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let descriptor = load_model(&tx, id)?;
        tx.execute("DELETE FROM models WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(descriptor)
    }

    /// Job counts by status, for health reporting.
    pub fn job_counts(&self) -> AppResult<BTreeMap<&'static str, usize>> {
        let mut counts = BTreeMap::new();
        for status in [JobStatus::Pending, JobStatus::Running, JobStatus::Finished, JobStatus::Failed] {
            counts.insert(status.as_str(), 0);
        }

        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, JobStatus>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.insert(status.as_str(), count.max(0) as usize);
        }
        Ok(counts)
    }
}

impl JobStore for Database {
    fn create_job(&self, job: Job) -> AppResult<Job> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM jobs WHERE id = ?1)",
            params![job.id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(AppError::Conflict(format!("Job '{}' already exists", job.id)));
        }
        tx.execute(
            &format!("INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)", JOB_COLUMNS),
            params![
                job.id,
                job.audio_id,
                job.model_name,
                Value::Object(job.model_params.clone()),
                job.status,
                job.progress as f64,
                job.submitted_at,
                job.started_at,
                job.finished_at,
                job.error,
            ],
        )?;
        tx.commit()?;
        Ok(job)
    }

    fn get_job(&self, id: Uuid) -> AppResult<Job> {
        load_job(&self.conn.lock(), id)
    }

    fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY submitted_at DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt.query_map([], job_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    fn mark_running(&self, id: Uuid) -> AppResult<Job> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut job = check_transition(&tx, id, JobStatus::Running)?;
        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        tx.execute(
            "UPDATE jobs SET status = ?2, started_at = ?3 WHERE id = ?1",
            params![id, job.status, job.started_at],
        )?;
        tx.commit()?;
        Ok(job)
    }

    fn mark_finished(&self, id: Uuid, text: String) -> AppResult<TranscriptResult> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        check_transition(&tx, id, JobStatus::Finished)?;
        tx.execute(
            "UPDATE jobs SET status = ?2, progress = 1.0, finished_at = ?3 WHERE id = ?1",
            params![id, JobStatus::Finished, Utc::now()],
        )?;

        let result = TranscriptResult::new(id, text);
        tx.execute(
            &format!("INSERT INTO results ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)", RESULT_COLUMNS),
            params![
                result.id,
                result.job_id,
                result.text,
                result.summary,
                result.summary_algo,
                result.created_at,
            ],
        )?;
        tx.commit()?;
        Ok(result)
    }

    fn mark_failed(&self, id: Uuid, error: String) -> AppResult<Job> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut job = check_transition(&tx, id, JobStatus::Failed)?;
        job.status = JobStatus::Failed;
        job.finished_at = Some(Utc::now());
        job.error = Some(error);
        tx.execute(
            "UPDATE jobs SET status = ?2, finished_at = ?3, error = ?4 WHERE id = ?1",
            params![id, job.status, job.finished_at, job.error],
        )?;
        tx.commit()?;
        Ok(job)
    }

    fn delete_job(&self, id: Uuid) -> AppResult<()> {
        // results go with it through ON DELETE CASCADE
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(job_not_found(id));
        }
        Ok(())
    }

    fn get_result(&self, job_id: Uuid) -> AppResult<TranscriptResult> {
        self.conn
            .lock()
            .query_row(
                &format!("SELECT {} FROM results WHERE job_id = ?1", RESULT_COLUMNS),
                params![job_id],
                result_from_row,
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("No result for job '{}'", job_id)))
    }

    fn list_results(&self) -> AppResult<Vec<TranscriptResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM results ORDER BY created_at DESC",
            RESULT_COLUMNS
        ))?;
        let results = stmt
            .query_map([], result_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    fn delete_result(&self, id: Uuid) -> AppResult<()> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM results WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(AppError::NotFound(format!("Result '{}' not found", id)));
        }
        Ok(())
    }

    fn set_summary(&self, job_id: Uuid, summary: String, algorithm: String) -> AppResult<TranscriptResult> {
        let updated = self.conn.lock().execute(
            "UPDATE results SET summary = ?2, summary_algo = ?3 WHERE job_id = ?1",
            params![job_id, summary, algorithm],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound(format!("No result for job '{}'", job_id)));
        }
        self.get_result(job_id)
    }
}
