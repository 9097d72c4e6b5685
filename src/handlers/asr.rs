//! # Transcription Job REST API Handlers
//!
//! Thin HTTP layer over the [`JobScheduler`](crate::jobs::JobScheduler).
//! Submission returns as soon as the job is queued; clients poll for status.
//!
//! ## Available Endpoints:
//! - `POST /asr/submit` - Queue a transcription job
//! - `GET /asr/jobs` - List jobs, newest first
//! - `GET /asr/jobs/{id}` - Job status and progress
//! - `GET /asr/jobs/{id}/result` - Normalized transcript of a finished job

use crate::models::JobStatus;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

/// Request body for `POST /asr/submit`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub audio_id: Uuid,
    pub model_name: String,
    /// Engine parameters (a JSON object); omitted means "use the loaded model as is".
    pub model_params: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
}

/// Queue a transcription job.
///
/// ## Endpoint: `POST /api/v1/asr/submit`
///
/// ## Response (202):
/// ```json
/// { "job_id": "0b6f...", "status": "pending" }
/// ```
///
/// Unknown models are rejected here with 400 `unsupported_model`; engine
/// failures after this point are recorded on the job instead.
pub async fn submit_job(
    state: web::Data<AppState>,
    body: web::Json<SubmitJobRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    let handle = state
        .scheduler
        .submit(request.audio_id, &request.model_name, request.model_params)?;
    Ok(HttpResponse::Accepted().json(handle))
}

/// `GET /api/v1/asr/jobs?status=running`
pub async fn list_jobs(
    state: web::Data<AppState>,
    query: web::Query<JobListQuery>,
) -> Result<HttpResponse, AppError> {
    let filter = match query.status.as_deref() {
        None => None,
        Some(status) => Some(serde_json::from_value::<JobStatus>(Value::String(status.to_string())).map_err(
            |_| AppError::BadRequest(format!("Unknown job status '{}'", status)),
        )?),
    };

    let jobs: Vec<_> = state
        .store()
        .list_jobs()?
        .into_iter()
        .filter(|job| filter.map_or(true, |status| job.status == status))
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "total": jobs.len(),
        "jobs": jobs
    })))
}

/// `GET /api/v1/asr/jobs/{id}`
pub async fn get_job(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let job = state.store().get_job(path.into_inner())?;
    Ok(HttpResponse::Ok().json(job))
}

/// `GET /api/v1/asr/jobs/{id}/result`
///
/// 409 while the job is still pending or running; 404 for failed jobs, which
/// never have a result.
pub async fn get_job_result(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let job = state.store().get_job(path.into_inner())?;
    match job.status {
        JobStatus::Pending | JobStatus::Running => Err(AppError::Conflict(format!(
            "Job '{}' is still {}",
            job.id,
            job.status.as_str()
        ))),
        JobStatus::Failed => Err(AppError::NotFound(format!(
            "Job '{}' failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        ))),
        JobStatus::Finished => Ok(HttpResponse::Ok().json(state.store().get_result(job.id)?)),
    }
}

#[cfg(test)]
mod tests {
    use crate::handlers::configure;
    use crate::models::AudioSource;
    use crate::state::test_support::test_state;
    use actix_web::{http::StatusCode, test, web, App};
    use chrono::Utc;
    use serde_json::{json, Value};
    use std::time::Duration;
    use uuid::Uuid;

    fn stored_audio(state: &crate::state::AppState, dir: &std::path::Path) -> Uuid {
        let path = dir.join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        state
            .db
            .insert_audio(AudioSource {
                id: Uuid::new_v4(),
                filename: "clip.wav".into(),
                path,
                size_bytes: 4,
                duration_secs: Some(2.0),
                sample_rate: Some(16_000),
                uploaded_at: Utc::now(),
            })
            .unwrap()
            .id
    }

    #[actix_web::test]
    async fn test_submit_and_poll_until_finished() {
        let (state, dir) = test_state();
        let audio_id = stored_audio(&state, dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/asr/submit")
            .set_json(json!({"audio_id": audio_id, "model_name": "stub"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let handle: Value = test::read_body_json(resp).await;
        assert_eq!(handle["status"], "pending");
        let job_id = handle["job_id"].as_str().unwrap().to_string();

        let mut status = String::new();
        for _ in 0..200 {
            let req = test::TestRequest::get()
                .uri(&format!("/api/v1/asr/jobs/{}", job_id))
                .to_request();
            let job: Value = test::call_and_read_body_json(&app, req).await;
            status = job["status"].as_str().unwrap().to_string();
            if status == "finished" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, "finished");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/asr/jobs/{}/result", job_id))
            .to_request();
        let result: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(result["text"], "你好吗？");

        let req = test::TestRequest::get()
            .uri("/api/v1/asr/jobs?status=finished")
            .to_request();
        let listing: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listing["total"], 1);
    }

    #[actix_web::test]
    async fn test_submit_rejects_unknown_model_and_audio() {
        let (state, dir) = test_state();
        let audio_id = stored_audio(&state, dir.path());
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/asr/submit")
            .set_json(json!({"audio_id": audio_id, "model_name": "paraformer"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"]["type"], "unsupported_model");

        let req = test::TestRequest::post()
            .uri("/api/v1/asr/submit")
            .set_json(json!({"audio_id": Uuid::new_v4(), "model_name": "stub"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        assert!(state.db.job_counts().unwrap().values().all(|count| *count == 0));
    }

    #[actix_web::test]
    async fn test_unknown_job_is_not_found() {
        let (state, _dir) = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/asr/jobs/{}", Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/v1/asr/jobs?status=exploded")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
