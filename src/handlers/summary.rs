use crate::summary::{summarize_job, SummaryRequest};
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};

/// Summarize a finished job's transcript and store the summary on its result.
///
/// ## Endpoint: `POST /api/v1/summary`
///
/// ## Request Body:
/// ```json
/// { "job_id": "0b6f...", "algorithm": "lead", "length": 120 }
/// ```
/// `algorithm` (`truncate`, `lead`, `textrank`, `llm`) and `length` fall back
/// to the `[summary]` configuration.
pub async fn create_summary(
    state: web::Data<AppState>,
    body: web::Json<SummaryRequest>,
) -> Result<HttpResponse, AppError> {
    let result = summarize_job(state.store(), &state.config.summary, &body).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[cfg(test)]
mod tests {
    use crate::handlers::configure;
    use crate::jobs::JobStore;
    use crate::models::Job;
    use crate::state::test_support::test_state;
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::{json, Map, Value};
    use uuid::Uuid;

    #[actix_web::test]
    async fn test_summary_is_stored_on_result() {
        let (state, _dir) = test_state();
        let job = state
            .store()
            .create_job(Job::new(Uuid::new_v4(), "stub".into(), Map::new()))
            .unwrap();
        state.store().mark_running(job.id).unwrap();
        state
            .store()
            .mark_finished(job.id, "今天开会。讨论预算。".into())
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/summary")
            .set_json(json!({"job_id": job.id, "algorithm": "lead", "length": 6}))
            .to_request();
        let result: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(result["summary"], "今天开会。");
        assert_eq!(result["summary_algo"], "lead");
        assert_eq!(
            state.store().get_result(job.id).unwrap().summary.as_deref(),
            Some("今天开会。")
        );

        let req = test::TestRequest::post()
            .uri("/api/v1/summary")
            .set_json(json!({"job_id": job.id, "algorithm": "abstractive"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_summary_without_result_is_not_found() {
        let (state, _dir) = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/v1/summary")
            .set_json(json!({"job_id": Uuid::new_v4()}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
