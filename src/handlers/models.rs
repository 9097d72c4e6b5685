//! # Model Management REST API Handlers
//!
//! HTTP endpoints over the [`ModelCatalog`](crate::transcription::ModelCatalog):
//! registering descriptors, activating, editing configuration and moving
//! models in and out of the lifecycle registry.
//!
//! ## Available Endpoints:
//! - `GET /models` - Registered descriptors, engine names and loaded models
//! - `POST /models` - Register a descriptor (local path or HuggingFace repo)
//! - `GET /models/{id}` - One descriptor with its load state
//! - `DELETE /models/{id}?delete_file=true` - Remove a descriptor
//! - `POST /models/{id}/load` - Instantiate the engine
//! - `POST /models/{id}/unload` - Release the engine
//! - `POST /models/{id}/activate` - Make it the active model of its kind
//! - `PATCH /models/{id}/config` - Shallow-merge configuration keys

use crate::models::ModelKind;
use crate::transcription::RegisterModelRequest;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct DeleteModelQuery {
    /// Also remove the model files (only those under the models directory).
    pub delete_file: Option<bool>,
}

/// List every registered model.
///
/// ## Response:
/// ```json
/// {
///   "total": 1,
///   "models": [{ "name": "whisper-small", "status": "active", "loaded": true }],
///   "active": { "recognition": "whisper-small", "summarization": null },
///   "engines": ["funasr", "kimi-audio", "whisper"],
///   "loaded": [{ "name": "whisper-small", "engine": "whisper", "loaded_at": "..." }]
/// }
/// ```
pub async fn list_models(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let models = state.catalog.list()?;
    Ok(HttpResponse::Ok().json(json!({
        "total": models.len(),
        "models": models,
        "active": {
            "recognition": state.catalog.active(ModelKind::Recognition)?.map(|m| m.name),
            "summarization": state.catalog.active(ModelKind::Summarization)?.map(|m| m.name)
        },
        "engines": state.engines.names(),
        "loaded": state.lifecycle.loaded()
    })))
}

/// `POST /api/v1/models`
///
/// With `repo_id` + `filename` and no `local_path`, the file is fetched from
/// HuggingFace before the descriptor is stored, so this can take a while.
pub async fn register_model(
    state: web::Data<AppState>,
    body: web::Json<RegisterModelRequest>,
) -> Result<HttpResponse, AppError> {
    let descriptor = state.catalog.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(descriptor))
}

/// `GET /api/v1/models/{id}`
pub async fn get_model(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.catalog.get(path.into_inner())?))
}

/// `DELETE /api/v1/models/{id}`
pub async fn delete_model(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<DeleteModelQuery>,
) -> Result<HttpResponse, AppError> {
    let descriptor = state
        .catalog
        .delete(path.into_inner(), query.delete_file.unwrap_or(false))?;
    Ok(HttpResponse::Ok().json(json!({
        "deleted": descriptor.id,
        "name": descriptor.name
    })))
}

/// Load the model's engine.
///
/// ## Endpoint: `POST /api/v1/models/{id}/load`
///
/// Always 200 for a known model; `ok` tells whether the engine is now loaded
/// because of this call:
/// ```json
/// { "model": "whisper-small", "ok": false, "message": "already loaded" }
/// ```
pub async fn load_model(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let outcome = tokio::task::spawn_blocking({
        let catalog = state.catalog.clone();
        move || catalog.load(id)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Model load task failed: {}", e)))??;

    let model = state.catalog.get(id)?;
    Ok(HttpResponse::Ok().json(json!({
        "model": model.descriptor.name,
        "ok": outcome.ok,
        "message": outcome.message
    })))
}

/// `POST /api/v1/models/{id}/unload`
pub async fn unload_model(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let outcome = state.catalog.unload(id)?;
    let model = state.catalog.get(id)?;
    Ok(HttpResponse::Ok().json(json!({
        "model": model.descriptor.name,
        "ok": outcome.ok,
        "message": outcome.message
    })))
}

/// `POST /api/v1/models/{id}/activate`
pub async fn activate_model(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(state.catalog.activate(path.into_inner())?))
}

/// `PATCH /api/v1/models/{id}/config`
///
/// Takes effect the next time the model is loaded.
pub async fn update_model_config(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<Value>,
) -> Result<HttpResponse, AppError> {
    let descriptor = state
        .catalog
        .update_config(path.into_inner(), body.into_inner())?;
    Ok(HttpResponse::Ok().json(descriptor))
}
