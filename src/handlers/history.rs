// Transcript history: finished results and deletion of jobs / results
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use uuid::Uuid;

/// `GET /api/v1/history/results`: every stored result with the job it came from.
pub async fn list_results(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let store = state.store();
    let entries: Vec<_> = store
        .list_results()?
        .into_iter()
        .map(|result| {
            let job = store.get_job(result.job_id).ok();
            let audio = job.as_ref().and_then(|job| state.db.get_audio(job.audio_id).ok());
            json!({
                "result": result,
                "model_name": job.as_ref().map(|job| job.model_name.clone()),
                "audio_filename": audio.map(|audio| audio.filename),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "total": entries.len(),
        "results": entries
    })))
}

/// `DELETE /api/v1/history/jobs/{id}`: removes the job and its result.
pub async fn delete_job(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    state.store().delete_job(id)?;
    tracing::info!(job_id = %id, "job deleted");
    Ok(HttpResponse::Ok().json(json!({ "deleted": id })))
}

/// `DELETE /api/v1/history/results/{id}`: removes only the result.
pub async fn delete_result(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    state.store().delete_result(id)?;
    Ok(HttpResponse::Ok().json(json!({ "deleted": id })))
}

#[cfg(test)]
mod tests {
    use crate::handlers::configure;
    use crate::jobs::JobStore;
    use crate::models::Job;
    use crate::state::test_support::test_state;
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{Map, Value};
    use uuid::Uuid;

    #[actix_web::test]
    async fn test_list_and_delete_history() {
        let (state, _dir) = test_state();
        let job = state
            .store()
            .create_job(Job::new(Uuid::new_v4(), "stub".into(), Map::new()))
            .unwrap();
        state.store().mark_running(job.id).unwrap();
        let result = state.store().mark_finished(job.id, "你好。".into()).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/history/results").to_request();
        let listing: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listing["total"], 1);
        assert_eq!(listing["results"][0]["model_name"], "stub");
        assert!(listing["results"][0]["audio_filename"].is_null());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/history/results/{}", result.id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert!(state.store().get_result(job.id).is_err());
        assert!(state.store().get_job(job.id).is_ok());

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/history/jobs/{}", job.id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/history/jobs/{}", job.id))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
