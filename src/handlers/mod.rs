pub mod asr;
pub mod audio;
pub mod config;
pub mod export;
pub mod history;
pub mod models;
pub mod summary;

use crate::{error::AppError, health};
use actix_web::web;

/// Register every route. Shared by the server and the handler tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Malformed JSON bodies get the same error shape as every other failure
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    );

    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(config::get_config))
            // Audio sources
            .route("/audio", web::get().to(audio::list_audio))
            .route("/audio/upload", web::post().to(audio::upload_audio))
            .route("/audio/{id}", web::get().to(audio::get_audio))
            .route("/audio/{id}", web::delete().to(audio::delete_audio))
            // Transcription jobs
            .route("/asr/submit", web::post().to(asr::submit_job))
            .route("/asr/jobs", web::get().to(asr::list_jobs))
            .route("/asr/jobs/{id}", web::get().to(asr::get_job))
            .route("/asr/jobs/{id}/result", web::get().to(asr::get_job_result))
            // History
            .route("/history/results", web::get().to(history::list_results))
            .route("/history/results/{id}", web::delete().to(history::delete_result))
            .route("/history/jobs/{id}", web::delete().to(history::delete_job))
            // Model management
            .route("/models", web::get().to(models::list_models))
            .route("/models", web::post().to(models::register_model))
            .route("/models/{id}", web::get().to(models::get_model))
            .route("/models/{id}", web::delete().to(models::delete_model))
            .route("/models/{id}/load", web::post().to(models::load_model))
            .route("/models/{id}/unload", web::post().to(models::unload_model))
            .route("/models/{id}/activate", web::post().to(models::activate_model))
            .route("/models/{id}/config", web::patch().to(models::update_model_config))
            // Post-processing
            .route("/summary", web::post().to(summary::create_summary))
            .route("/export/{job_id}", web::get().to(export::export_result)),
    )
    // Also at the root for load balancer probes
    .route("/health", web::get().to(health::health_check));
}

#[cfg(test)]
mod tests {
    use super::configure;
    use crate::state::test_support::test_state;
    use actix_web::{http::StatusCode, test, web, App};
    use serde_json::Value;

    #[actix_web::test]
    async fn test_health_routes() {
        let (state, _dir) = test_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let health: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["system"]["status"], "normal");

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let config: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(config["config"]["storage"]["persistent"], false);
        assert_eq!(config["config"]["summary"]["llm"]["configured"], false);
        assert!(config["config"]["summary"]["llm"].get("api_key").is_none());

        let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
