// Transcript export in txt / json / srt form
use crate::error::{AppError, AppResult};
use crate::models::TranscriptResult;
use serde_json::json;
use std::str::FromStr;

/// Cue length used when the audio duration is unknown.
const DEFAULT_CUE_SECS: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Txt,
    Json,
    Srt,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" => Ok(ExportFormat::Txt),
            "json" => Ok(ExportFormat::Json),
            "srt" => Ok(ExportFormat::Srt),
            other => Err(AppError::BadRequest(format!(
                "Unsupported export format '{}'; expected txt, json or srt",
                other
            ))),
        }
    }
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Srt => "application/x-subrip; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Srt => "srt",
        }
    }
}

pub fn render(format: ExportFormat, result: &TranscriptResult, duration_secs: Option<f64>) -> AppResult<String> {
    match format {
        ExportFormat::Txt => Ok(result.text.clone()),
        ExportFormat::Json => {
            let body = json!({
                "job_id": result.job_id,
                "text": result.text,
                "summary": result.summary,
                "summary_algo": result.summary_algo,
            });
            Ok(serde_json::to_string_pretty(&body)?)
        }
        ExportFormat::Srt => {
            let end = duration_secs
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(DEFAULT_CUE_SECS);
            Ok(format!(
                "1\n{} --> {}\n{}\n",
                srt_timestamp(0.0),
                srt_timestamp(end),
                result.text
            ))
        }
    }
}

/// `HH:MM:SS,mmm`
fn srt_timestamp(secs: f64) -> String {
    let total_ms = (secs * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    let (seconds, millis) = (rest / 1000, rest % 1000);
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}
