// Transcription job and result records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    /// Allowed transitions: pending → running → {finished, failed}, pending → failed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Finished)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub audio_id: Uuid,
    pub model_name: String,
    pub model_params: Map<String, Value>,
    pub status: JobStatus,
    /// 0.0 until the job finishes, then 1.0
    pub progress: f32,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Job {
    pub fn new(audio_id: Uuid, model_name: String, model_params: Map<String, Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            audio_id,
            model_name,
            model_params,
            status: JobStatus::Pending,
            progress: 0.0,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

/// Normalized transcript owned by a finished job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub text: String,
    pub summary: Option<String>,
    pub summary_algo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TranscriptResult {
    pub fn new(job_id: Uuid, text: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            text,
            summary: None,
            summary_algo: None,
            created_at: Utc::now(),
        }
    }
}
