use crate::export::{render, ExportFormat};
use crate::{error::AppError, state::AppState};
use actix_web::{http::header, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    /// `txt` (default), `json` or `srt`
    pub format: Option<String>,
}

/// Download a finished job's transcript.
///
/// ## Endpoint: `GET /api/v1/export/{job_id}?format=srt`
///
/// The SRT cue spans the recorded audio duration when it is known.
pub async fn export_result(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<ExportQuery>,
) -> Result<HttpResponse, AppError> {
    let job_id = path.into_inner();
    let format = query.format.as_deref().unwrap_or("txt").parse::<ExportFormat>()?;

    let job = state.store().get_job(job_id)?;
    let result = state.store().get_result(job_id)?;
    let duration_secs = state
        .db
        .get_audio(job.audio_id)
        .ok()
        .and_then(|audio| audio.duration_secs);

    let body = render(format, &result, duration_secs)?;
    Ok(HttpResponse::Ok()
        .content_type(format.content_type())
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.{}\"", job_id, format.extension()),
        ))
        .body(body))
}
