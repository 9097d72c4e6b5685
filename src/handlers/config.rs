use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/v1/config`: the effective configuration. Changes require a
/// restart, since the worker pool and engine registry are built from it.
pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = &state.config;

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "cors_origins": config.server.cors_origins
            },
            "storage": {
                "uploads_dir": config.storage.uploads_dir,
                "models_dir": config.storage.models_dir,
                "persistent": config.storage.database_file.is_some(),
                "max_upload_bytes": config.storage.max_upload_bytes
            },
            "scheduler": {
                "worker_count": config.scheduler.worker_count,
                "transcription_timeout_secs": config.scheduler.transcription_timeout_secs
            },
            "engines": {
                "available": state.engines.names(),
                "whisper": {
                    "binary": config.engines.whisper.binary,
                    "default_model_size": config.engines.whisper.default_model_size,
                    "default_language": config.engines.whisper.default_language
                },
                "funasr": {
                    "script": config.engines.funasr.script,
                    "default_model": config.engines.funasr.default_model
                },
                "kimi_audio": {
                    "script": config.engines.kimi_audio.script
                }
            },
            "normalizer": config.normalizer,
            "summary": {
                "default_algorithm": config.summary.default_algorithm,
                "default_length": config.summary.default_length,
                "llm": {
                    "api_base": config.summary.llm.api_base,
                    "model": config.summary.llm.model,
                    "configured": !config.summary.llm.api_key.is_empty()
                }
            }
        }
    })))
}
