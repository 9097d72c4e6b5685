//! # Audio Upload REST API Handlers
//!
//! ## Available Endpoints:
//! - `POST /audio/upload` - Store uploaded recordings (multipart fields `file`)
//! - `GET /audio` - List stored recordings
//! - `GET /audio/{id}` - One recording's metadata
//! - `DELETE /audio/{id}` - Remove a recording and its file

use crate::audio::check_upload;
use crate::{error::AppError, state::AppState};
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use serde_json::json;
use uuid::Uuid;

/// Upload one or more audio files.
///
/// ## Endpoint: `POST /api/v1/audio/upload`
///
/// ## Request:
/// Multipart form data; every field named `file`, `files` or `audio` is one
/// recording. Accepted extensions: `.wav`, `.mp3`, `.flac`. Every file is
/// checked before any is stored, so a rejected upload stores nothing.
///
/// ## Response (201):
/// ```json
/// [{
///   "id": "6f1c...",
///   "filename": "meeting.wav",
///   "size_bytes": 320044,
///   "duration_secs": 10.0,
///   "sample_rate": 16000
/// }]
/// ```
pub async fn upload_audio(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut uploads: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let Some(content_disposition) = field.content_disposition() else {
            continue;
        };
        if !matches!(content_disposition.get_name(), Some("file" | "files" | "audio")) {
            continue;
        }
        let filename = content_disposition
            .get_filename()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::BadRequest("Uploaded file has no filename".to_string()))?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Upload interrupted: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::ValidationError(format!(
                    "File '{}' too large (max: {} bytes)",
                    filename, max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        uploads.push((filename, bytes));
    }

    if uploads.is_empty() {
        return Err(AppError::BadRequest("No audio file provided".to_string()));
    }
    for (filename, bytes) in &uploads {
        check_upload(filename, bytes)?;
    }

    let mut stored = Vec::with_capacity(uploads.len());
    for (filename, bytes) in uploads {
        stored.push(state.audio.save(&filename, bytes).await?);
    }

    Ok(HttpResponse::Created().json(stored))
}

/// `GET /api/v1/audio`
pub async fn list_audio(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let audio = state.audio.list()?;
    Ok(HttpResponse::Ok().json(json!({
        "total": audio.len(),
        "audio": audio
    })))
}

/// `GET /api/v1/audio/{id}`
pub async fn get_audio(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.audio.get(path.into_inner())?))
}

/// `DELETE /api/v1/audio/{id}`
pub async fn delete_audio(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let audio = state.audio.delete(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "deleted": audio.id,
        "filename": audio.filename
    })))
}
