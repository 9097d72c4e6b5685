//! # Model Lifecycle Registry
//!
//! Table of currently instantiated engines, keyed by model descriptor name.
//! One instance is created at startup and shared by handle with the HTTP
//! handlers and the job scheduler.
//!
//! ## Key Features:
//! - **load / unload bookkeeping** with "already loaded" / "not loaded" outcomes
//! - **real instantiation**: `load` builds the engine through the
//!   [`EngineRegistry`], so the scheduler can reuse what administrators loaded
//! - **single lock**: every lookup and mutation of the table happens under one mutex

use crate::models::ModelDescriptor;
use crate::transcription::engine::Engine;
use crate::transcription::registry::EngineRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// `(ok, message)` result of a load or unload request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleOutcome {
    pub ok: bool,
    pub message: String,
}

impl LifecycleOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { ok: true, message: message.into() }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

struct LoadedEngine {
    engine: Arc<dyn Engine>,
    engine_key: String,
    loaded_at: DateTime<Utc>,
}

/// Snapshot of a loaded entry for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedModelInfo {
    pub name: String,
    pub engine: String,
    pub loaded_at: DateTime<Utc>,
}

pub struct ModelLifecycleRegistry {
    engines: Arc<EngineRegistry>,
    loaded: Mutex<HashMap<String, LoadedEngine>>,
}

impl ModelLifecycleRegistry {
    pub fn new(engines: Arc<EngineRegistry>) -> Self {
        Self {
            engines,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Instantiate the descriptor's engine and record it.
    ///
    /// The lock is held across construction so two concurrent loads of the
    /// same descriptor cannot both succeed.
    pub fn load(&self, descriptor: &ModelDescriptor) -> LifecycleOutcome {
        let mut loaded = self.loaded.lock();
        if loaded.contains_key(&descriptor.name) {
            return LifecycleOutcome::rejected("already loaded");
        }

        let engine_key = descriptor.engine_key().to_string();
        match self.engines.resolve(&engine_key, &descriptor.engine_params()) {
            Ok(engine) => {
                loaded.insert(
                    descriptor.name.clone(),
                    LoadedEngine {
                        engine,
                        engine_key: engine_key.clone(),
                        loaded_at: Utc::now(),
                    },
                );
                info!(model = %descriptor.name, engine = %engine_key, "model loaded");
                LifecycleOutcome::ok("loaded")
            }
            Err(err) => {
                warn!(model = %descriptor.name, error = %err, "model load failed");
                LifecycleOutcome::rejected(err.to_string())
            }
        }
    }

    /// Drop the descriptor's engine from the table.
    ///
    /// A transcription already holding the engine finishes before the engine
    /// itself is released.
    pub fn unload(&self, descriptor: &ModelDescriptor) -> LifecycleOutcome {
        match self.loaded.lock().remove(&descriptor.name) {
            Some(_) => {
                info!(model = %descriptor.name, "model unloaded");
                LifecycleOutcome::ok("unloaded")
            }
            None => LifecycleOutcome::rejected("not loaded"),
        }
    }

    pub fn is_loaded(&self, descriptor: &ModelDescriptor) -> bool {
        self.loaded.lock().contains_key(&descriptor.name)
    }

    /// Engine loaded under `name`, if any.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.loaded.lock().get(name).map(|entry| Arc::clone(&entry.engine))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaded.lock().contains_key(name)
    }

    pub fn loaded_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.loaded.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn loaded(&self) -> Vec<LoadedModelInfo> {
        let mut models: Vec<_> = self
            .loaded
            .lock()
            .iter()
            .map(|(name, entry)| LoadedModelInfo {
                name: name.clone(),
                engine: entry.engine_key.clone(),
                loaded_at: entry.loaded_at,
            })
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelKind;
    use crate::transcription::registry::test_support::{register_broken, register_text};
    use serde_json::json;

    fn registry() -> ModelLifecycleRegistry {
        let mut engines = EngineRegistry::new();
        register_text(&mut engines, "stub", "hello");
        register_broken(&mut engines, "broken");
        ModelLifecycleRegistry::new(Arc::new(engines))
    }

    fn descriptor(name: &str) -> ModelDescriptor {
        ModelDescriptor::new(name.into(), name.into(), ModelKind::Recognition)
    }

    #[test]
    fn test_load_twice_reports_already_loaded() {
        let lifecycle = registry();
        let stub = descriptor("stub");

        assert_eq!(lifecycle.load(&stub), LifecycleOutcome::ok("loaded"));
        assert_eq!(lifecycle.load(&stub), LifecycleOutcome::rejected("already loaded"));
        assert!(lifecycle.is_loaded(&stub));
    }

    #[test]
    fn test_unload_twice_reports_not_loaded() {
        let lifecycle = registry();
        let stub = descriptor("stub");
        lifecycle.load(&stub);

        assert_eq!(lifecycle.unload(&stub), LifecycleOutcome::ok("unloaded"));
        assert_eq!(lifecycle.unload(&stub), LifecycleOutcome::rejected("not loaded"));
        assert!(!lifecycle.is_loaded(&stub));
    }

    #[test]
    fn test_is_loaded_tracks_history() {
        let lifecycle = registry();
        let stub = descriptor("stub");
        assert!(!lifecycle.is_loaded(&stub));
        lifecycle.load(&stub);
        assert!(lifecycle.is_loaded(&stub));
        lifecycle.unload(&stub);
        assert!(!lifecycle.is_loaded(&stub));
        lifecycle.load(&stub);
        assert!(lifecycle.is_loaded(&stub));
    }

    #[test]
    fn test_failed_construction_is_not_recorded() {
        let lifecycle = registry();
        let broken = descriptor("broken");

        let outcome = lifecycle.load(&broken);
        assert!(!outcome.ok);
        assert!(outcome.message.contains("weights missing"));
        assert!(!lifecycle.is_loaded(&broken));
    }

    #[test]
    fn test_descriptor_alias_uses_configured_engine() {
        let lifecycle = registry();
        let mut alias = descriptor("meeting-model");
        alias.config = json!({"engine": "stub"});

        assert!(lifecycle.load(&alias).ok);
        assert!(lifecycle.get("meeting-model").is_some());
        assert!(lifecycle.get("stub").is_none());
        assert_eq!(lifecycle.loaded()[0].engine, "stub");
    }

    #[test]
    fn test_get_returns_shared_instance() {
        let lifecycle = registry();
        lifecycle.load(&descriptor("stub"));
        let a = lifecycle.get("stub").unwrap();
        let b = lifecycle.get("stub").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
