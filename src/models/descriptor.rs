// Registered model descriptors
use crate::transcription::engine::EngineParams;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Recognition,
    Summarization,
}

/// Catalog status. Whether an engine is instantiated is tracked by the
/// lifecycle registry, not here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorStatus {
    Available,
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDescriptor {
    pub id: Uuid,
    /// Unique; also the model name jobs are submitted with once loaded
    pub name: String,
    pub display_name: String,
    pub kind: ModelKind,
    pub status: DescriptorStatus,
    pub local_path: Option<PathBuf>,
    pub config: Value,
    pub version: String,
    pub size_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelDescriptor {
    pub fn new(name: String, display_name: String, kind: ModelKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            display_name,
            kind,
            status: DescriptorStatus::Available,
            local_path: None,
            config: Value::Null,
            version: "1.0.0".to_string(),
            size_bytes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Engine registry key: `config.engine` when set, otherwise the name.
    pub fn engine_key(&self) -> &str {
        self.config
            .get("engine")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(self.name.as_str())
    }

    /// Construction parameters: the `config` object without `engine`, plus
    /// `model_path` taken from `local_path` unless the config sets one.
    pub fn engine_params(&self) -> EngineParams {
        let mut params = self.config.as_object().cloned().unwrap_or_default();
        params.remove("engine");
        if let Some(path) = &self.local_path {
            params
                .entry("model_path")
                .or_insert_with(|| Value::String(path.to_string_lossy().into_owned()));
        }
        params
    }
}
