//! # Model Catalog
//!
//! Administrative side of model management: registering descriptors (from a
//! local path or a HuggingFace repository), activating one model per kind,
//! editing configuration, deleting, and loading/unloading through the
//! [`ModelLifecycleRegistry`].
//!
//! Descriptors are persisted in the [`Database`]; whether a model is loaded is
//! only ever answered by the lifecycle registry.

use crate::error::{AppError, AppResult};
use crate::jobs::store::Database;
use crate::models::{DescriptorStatus, ModelDescriptor, ModelKind};
use crate::transcription::lifecycle::{LifecycleOutcome, ModelLifecycleRegistry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Body of `POST /models`.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterModelRequest {
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: ModelKind,
    /// Existing file or directory on this machine.
    pub local_path: Option<PathBuf>,
    /// HuggingFace repository to fetch `filename` from when no local path is given.
    pub repo_id: Option<String>,
    pub filename: Option<String>,
    pub revision: Option<String>,
    pub config: Option<Value>,
    pub version: Option<String>,
}

fn default_kind() -> ModelKind {
    ModelKind::Recognition
}

/// Descriptor plus its current load state.
#[derive(Debug, Clone, Serialize)]
pub struct ModelView {
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    pub loaded: bool,
}

pub struct ModelCatalog {
    db: Arc<Database>,
    lifecycle: Arc<ModelLifecycleRegistry>,
    models_dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(db: Arc<Database>, lifecycle: Arc<ModelLifecycleRegistry>, models_dir: PathBuf) -> Self {
        Self {
            db,
            lifecycle,
            models_dir,
        }
    }

    fn view(&self, descriptor: ModelDescriptor) -> ModelView {
        let loaded = self.lifecycle.is_loaded(&descriptor);
        ModelView { descriptor, loaded }
    }

    pub fn list(&self) -> AppResult<Vec<ModelView>> {
        Ok(self
            .db
            .list_models()?
            .into_iter()
            .map(|descriptor| self.view(descriptor))
            .collect())
    }

    pub fn get(&self, id: Uuid) -> AppResult<ModelView> {
        Ok(self.view(self.db.get_model(id)?))
    }

    /// Register a new descriptor.
    ///
    /// ## Errors:
    /// - `ValidationError` for an empty name or a non-object `config`
    /// - `Conflict` if the name is taken
    /// - `NotFound` if `local_path` does not exist
    /// - `Internal` if the HuggingFace download fails
    pub async fn register(&self, request: RegisterModelRequest) -> AppResult<ModelDescriptor> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::ValidationError("Model name cannot be empty".to_string()));
        }
        let config = match request.config {
            None | Some(Value::Null) => Value::Null,
            Some(config @ Value::Object(_)) => config,
            Some(_) => {
                return Err(AppError::ValidationError(
                    "Model config must be a JSON object".to_string(),
                ))
            }
        };
        if self.db.find_model_by_name(&name)?.is_some() {
            return Err(AppError::Conflict(format!("Model '{}' is already registered", name)));
        }

        let local_path = match (request.local_path, request.repo_id) {
            (Some(path), _) => {
                if !path.exists() {
                    return Err(AppError::NotFound(format!("Model path {:?} does not exist", path)));
                }
                Some(path)
            }
            (None, Some(repo_id)) => {
                let filename = request.filename.ok_or_else(|| {
                    AppError::ValidationError("filename is required with repo_id".to_string())
                })?;
                Some(self.download(&repo_id, &filename, request.revision).await?)
            }
            (None, None) => None,
        };

        let mut descriptor = ModelDescriptor::new(
            name.clone(),
            request.display_name.unwrap_or_else(|| name.clone()),
            request.kind,
        );
        descriptor.size_bytes = local_path.as_deref().map(path_size);
        descriptor.local_path = local_path;
        descriptor.config = config;
        if let Some(version) = request.version {
            descriptor.version = version;
        }

        let descriptor = self.db.insert_model(descriptor)?;
        info!(model = %descriptor.name, path = ?descriptor.local_path, "model registered");
        Ok(descriptor)
    }

    async fn download(&self, repo_id: &str, filename: &str, revision: Option<String>) -> AppResult<PathBuf> {
        use hf_hub::api::tokio::ApiBuilder;
        use hf_hub::{Repo, RepoType};

        info!(repo = %repo_id, file = %filename, "downloading model from HuggingFace");
        let api = ApiBuilder::new()
            .with_token(std::env::var("HF_TOKEN").ok())
            .with_cache_dir(self.models_dir.join("hf-cache"))
            .with_progress(false)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to initialize HuggingFace client: {}", e)))?;

        let repo = match revision {
            Some(revision) => Repo::with_revision(repo_id.to_string(), RepoType::Model, revision),
            None => Repo::model(repo_id.to_string()),
        };
        let path = api.repo(repo).get(filename).await.map_err(|e| {
            AppError::Internal(format!("Failed to download {} from {}: {}", filename, repo_id, e))
        })?;

        info!(repo = %repo_id, path = ?path, "model downloaded");
        Ok(path)
    }

    /// Mark `id` active; any other active model of the same kind becomes available.
    pub fn activate(&self, id: Uuid) -> AppResult<ModelDescriptor> {
        let descriptor = self.db.activate_model(id)?;
        info!(model = %descriptor.name, "model activated");
        Ok(descriptor)
    }

    /// The active model of `kind`, if one is set.
    pub fn active(&self, kind: ModelKind) -> AppResult<Option<ModelDescriptor>> {
        Ok(self
            .db
            .list_models()?
            .into_iter()
            .find(|m| m.kind == kind && m.status == DescriptorStatus::Active))
    }

    /// Shallow-merge `patch` into the descriptor config. A loaded engine keeps
    /// its old configuration until it is unloaded and loaded again.
    pub fn update_config(&self, id: Uuid, patch: Value) -> AppResult<ModelDescriptor> {
        let Value::Object(patch) = patch else {
            return Err(AppError::ValidationError(
                "Model config must be a JSON object".to_string(),
            ));
        };

        self.db.update_model(id, |descriptor| {
            let mut config = descriptor.config.as_object().cloned().unwrap_or_default();
            config.extend(patch);
            descriptor.config = Value::Object(config);
        })
    }

    /// Remove the descriptor, unloading it first. With `delete_file`, files
    /// under the models directory are removed too; paths elsewhere are kept.
    pub fn delete(&self, id: Uuid, delete_file: bool) -> AppResult<ModelDescriptor> {
        let descriptor = self.db.get_model(id)?;
        if self.lifecycle.is_loaded(&descriptor) {
            self.lifecycle.unload(&descriptor);
        }
        let descriptor = self.db.delete_model(id)?;

        if let (true, Some(path)) = (delete_file, &descriptor.local_path) {
            if let Some(path) = contained_path(&self.models_dir, path) {
                remove_path(&path)?;
                info!(model = %descriptor.name, path = ?path, "model files removed");
            } else {
                warn!(model = %descriptor.name, path = ?path, "model files outside the models directory were kept");
            }
        }

        info!(model = %descriptor.name, "model deleted");
        Ok(descriptor)
    }

    pub fn load(&self, id: Uuid) -> AppResult<LifecycleOutcome> {
        let descriptor = self.db.get_model(id)?;
        Ok(self.lifecycle.load(&descriptor))
    }

    pub fn unload(&self, id: Uuid) -> AppResult<LifecycleOutcome> {
        let descriptor = self.db.get_model(id)?;
        Ok(self.lifecycle.unload(&descriptor))
    }
}

/// Resolve `path` (symlinks and `..` included) and return it only if it lies
/// strictly below `root`.
fn contained_path(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = fs::canonicalize(root).ok()?;
    let resolved = fs::canonicalize(path).ok()?;
    (resolved != root && resolved.starts_with(&root)).then_some(resolved)
}

fn remove_path(path: &Path) -> AppResult<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)?;
    } else if path.exists() {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Size of a file, or the total size of the files below a directory.
fn path_size(path: &Path) -> u64 {
    let Ok(metadata) = fs::metadata(path) else {
        return 0;
    };
    if !metadata.is_dir() {
        return metadata.len();
    }
    fs::read_dir(path)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| path_size(&entry.path()))
                .sum()
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::registry::test_support::register_text;
    use crate::transcription::registry::EngineRegistry;
    use serde_json::json;

    struct Fixture {
        catalog: ModelCatalog,
        dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let mut engines = EngineRegistry::new();
        register_text(&mut engines, "stub", "hello");
        let lifecycle = Arc::new(ModelLifecycleRegistry::new(Arc::new(engines)));
        let catalog = ModelCatalog::new(
            Arc::new(Database::in_memory().unwrap()),
            lifecycle,
            dir.path().to_path_buf(),
        );
        Fixture { catalog, dir }
    }

    fn request(name: &str) -> RegisterModelRequest {
        RegisterModelRequest {
            name: name.to_string(),
            display_name: None,
            kind: ModelKind::Recognition,
            local_path: None,
            repo_id: None,
            filename: None,
            revision: None,
            config: None,
            version: None,
        }
    }

    #[tokio::test]
    async fn test_register_local_model() {
        let f = fixture();
        let weights = f.dir.path().join("ggml-base.bin");
        fs::write(&weights, vec![0u8; 128]).unwrap();

        let mut req = request("whisper-base");
        req.local_path = Some(weights.clone());
        req.config = Some(json!({"engine": "whisper"}));
        let descriptor = f.catalog.register(req).await.unwrap();

        assert_eq!(descriptor.display_name, "whisper-base");
        assert_eq!(descriptor.size_bytes, Some(128));
        assert_eq!(descriptor.local_path, Some(weights));
        assert_eq!(descriptor.status, DescriptorStatus::Available);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let f = fixture();
        f.catalog.register(request("stub")).await.unwrap();

        let duplicate = f.catalog.register(request("stub")).await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let mut missing = request("other");
        missing.local_path = Some(f.dir.path().join("nope.bin"));
        assert!(matches!(f.catalog.register(missing).await, Err(AppError::NotFound(_))));

        let mut bad_config = request("third");
        bad_config.config = Some(json!("whisper"));
        assert!(matches!(
            f.catalog.register(bad_config).await,
            Err(AppError::ValidationError(_))
        ));

        assert!(matches!(
            f.catalog.register(request("  ")).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_activate_switches_within_kind() {
        let f = fixture();
        let first = f.catalog.register(request("first")).await.unwrap();
        let second = f.catalog.register(request("second")).await.unwrap();
        let mut summarizer = request("summarizer");
        summarizer.kind = ModelKind::Summarization;
        let summarizer = f.catalog.register(summarizer).await.unwrap();

        f.catalog.activate(first.id).unwrap();
        f.catalog.activate(summarizer.id).unwrap();
        f.catalog.activate(second.id).unwrap();

        assert_eq!(f.catalog.get(first.id).unwrap().descriptor.status, DescriptorStatus::Available);
        assert_eq!(f.catalog.get(second.id).unwrap().descriptor.status, DescriptorStatus::Active);
        assert_eq!(f.catalog.active(ModelKind::Summarization).unwrap().unwrap().id, summarizer.id);
        assert!(matches!(f.catalog.activate(Uuid::new_v4()), Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_config_merges() {
        let f = fixture();
        let mut req = request("meeting");
        req.config = Some(json!({"engine": "stub", "language": "zh"}));
        let descriptor = f.catalog.register(req).await.unwrap();

        let updated = f.catalog.update_config(descriptor.id, json!({"language": "en"})).unwrap();
        assert_eq!(updated.config, json!({"engine": "stub", "language": "en"}));
        assert!(f.catalog.update_config(descriptor.id, json!([1])).is_err());
    }

    #[tokio::test]
    async fn test_load_and_unload_report_state() {
        let f = fixture();
        let descriptor = f.catalog.register(request("stub")).await.unwrap();

        assert!(f.catalog.load(descriptor.id).unwrap().ok);
        assert!(f.catalog.list().unwrap()[0].loaded);
        assert_eq!(f.catalog.load(descriptor.id).unwrap().message, "already loaded");
        assert!(f.catalog.unload(descriptor.id).unwrap().ok);
        assert_eq!(f.catalog.unload(descriptor.id).unwrap().message, "not loaded");
    }

    #[tokio::test]
    async fn test_delete_unloads_and_removes_files() {
        let f = fixture();
        let model_dir = f.dir.path().join("stub-model");
        fs::create_dir_all(&model_dir).unwrap();
        fs::write(model_dir.join("weights.bin"), b"1234").unwrap();

        let mut req = request("stub");
        req.local_path = Some(model_dir.clone());
        let descriptor = f.catalog.register(req).await.unwrap();
        assert_eq!(descriptor.size_bytes, Some(4));
        f.catalog.load(descriptor.id).unwrap();

        f.catalog.delete(descriptor.id, true).unwrap();
        assert!(!model_dir.exists());
        assert!(f.catalog.list().unwrap().is_empty());
        assert!(!f.catalog.lifecycle.contains("stub"));
    }

    #[tokio::test]
    async fn test_delete_keeps_files_by_default() {
        let f = fixture();
        let weights = f.dir.path().join("keep.bin");
        fs::write(&weights, b"1").unwrap();

        let mut req = request("keep");
        req.local_path = Some(weights.clone());
        let descriptor = f.catalog.register(req).await.unwrap();

        f.catalog.delete(descriptor.id, false).unwrap();
        assert!(weights.exists());
    }

    #[tokio::test]
    async fn test_delete_never_escapes_models_dir() {
        let dir = tempfile::tempdir().unwrap();
        let models_dir = dir.path().join("models");
        let precious = dir.path().join("precious");
        fs::create_dir_all(&models_dir).unwrap();
        fs::create_dir_all(&precious).unwrap();
        fs::write(precious.join("notes.txt"), b"keep me").unwrap();

        let mut engines = EngineRegistry::new();
        register_text(&mut engines, "stub", "hello");
        let lifecycle = Arc::new(ModelLifecycleRegistry::new(Arc::new(engines)));
        let catalog = ModelCatalog::new(Arc::new(Database::in_memory().unwrap()), lifecycle, models_dir.clone());

        let mut escaping = request("escaping");
        escaping.local_path = Some(models_dir.join("..").join("precious"));
        let descriptor = catalog.register(escaping).await.unwrap();
        catalog.delete(descriptor.id, true).unwrap();
        assert!(precious.join("notes.txt").exists());

        let mut root = request("root");
        root.local_path = Some(models_dir.clone());
        let descriptor = catalog.register(root).await.unwrap();
        catalog.delete(descriptor.id, true).unwrap();
        assert!(models_dir.exists());
    }
}
