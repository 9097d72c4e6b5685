// Uploaded audio source records
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSource {
    pub id: Uuid,
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Only known for formats the service can probe (WAV)
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
    pub uploaded_at: DateTime<Utc>,
}
