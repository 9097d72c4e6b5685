//! # Engine Registry
//!
//! Maps a model name to a constructor for the matching recognition engine.
//! Every [`EngineRegistry::resolve`] call builds a fresh engine; reuse of
//! already-instantiated engines goes through the
//! [`ModelLifecycleRegistry`](super::lifecycle::ModelLifecycleRegistry).

use crate::config::EnginesConfig;
use crate::error::{AppError, AppResult};
use crate::transcription::engine::{Engine, EngineError, EngineParams};
use crate::transcription::engines::{WhisperCliEngine, WorkerScriptEngine};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds an engine from job or descriptor parameters.
pub type EngineConstructor =
    Arc<dyn Fn(&EngineParams) -> Result<Arc<dyn Engine>, EngineError> + Send + Sync>;

/// Name → constructor table for recognition engines.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    constructors: BTreeMap<String, EngineConstructor>,
}

impl EngineRegistry {
    /// Empty registry; engines are added with [`register`](Self::register).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in engines: `whisper`, `funasr`, `kimi-audio`.
    pub fn builtin(config: &EnginesConfig) -> Self {
        let mut registry = Self::new();

        let whisper = config.whisper.clone();
        registry.register("whisper", move |params| {
            Ok(Arc::new(WhisperCliEngine::new(&whisper, params)?) as Arc<dyn Engine>)
        });

        let (python, funasr) = (config.python.clone(), config.funasr.clone());
        registry.register("funasr", move |params| {
            Ok(Arc::new(WorkerScriptEngine::funasr(&python, &funasr, params)?) as Arc<dyn Engine>)
        });

        let (python, kimi) = (config.python.clone(), config.kimi_audio.clone());
        registry.register("kimi-audio", move |params| {
            Ok(Arc::new(WorkerScriptEngine::kimi_audio(&python, &kimi, params)?) as Arc<dyn Engine>)
        });

        registry
    }

    /// Add or replace the constructor for `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&EngineParams) -> Result<Arc<dyn Engine>, EngineError> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Arc::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered engine names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Construct a fresh engine for `name`.
    ///
    /// ## Errors:
    /// - `UnsupportedModel` if no constructor is registered under `name`
    /// - `EngineLoad` if the constructor fails
    pub fn resolve(&self, name: &str, params: &EngineParams) -> AppResult<Arc<dyn Engine>> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| AppError::UnsupportedModel(format!("Model '{}' is not supported", name)))?;

        info!(model = name, params = ?params, "constructing engine");
        constructor(params).map_err(|err| {
            warn!(model = name, error = %err, "engine construction failed");
            AppError::from(err)
        })
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Scriptable in-process engine used by registry, lifecycle and scheduler tests.

    use super::*;
    use crate::transcription::engine::TranscribeOptions;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Returns a canned transcript after an optional delay, tracking concurrency.
    #[derive(Debug, Default)]
    pub struct StubEngine {
        pub text: String,
        pub delay: Duration,
        pub fail_with: Option<String>,
        pub in_flight: Arc<AtomicUsize>,
        pub max_in_flight: Arc<AtomicUsize>,
        pub calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Engine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }

        async fn transcribe(
            &self,
            _audio_path: &Path,
            options: &TranscribeOptions,
        ) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                _ = tokio::time::sleep(self.delay) => match &self.fail_with {
                    Some(msg) => Err(EngineError::Transcription(msg.clone())),
                    None => Ok(self.text.clone()),
                },
                _ = options.cancellation.cancelled() => Err(EngineError::Cancelled),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    /// Register a stub engine under `name` that always returns `text`.
    pub fn register_text(registry: &mut EngineRegistry, name: &str, text: &str) {
        let text = text.to_string();
        registry.register(name, move |_| {
            Ok(Arc::new(StubEngine {
                text: text.clone(),
                ..Default::default()
            }) as Arc<dyn Engine>)
        });
    }

    /// Register a constructor that always fails to load.
    pub fn register_broken(registry: &mut EngineRegistry, name: &str) {
        registry.register(name, |_| Err(EngineError::Load("weights missing".to_string())));
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::transcription::engine::TranscribeOptions;
    use serde_json::Map;
    use std::path::Path;

    #[test]
    fn test_builtin_names() {
        let registry = EngineRegistry::builtin(&EnginesConfig::default());
        assert_eq!(registry.names(), vec!["funasr", "kimi-audio", "whisper"]);
        assert!(registry.contains("whisper"));
        assert!(!registry.contains("paraformer"));
    }

    #[test]
    fn test_unknown_model_is_unsupported() {
        let registry = EngineRegistry::builtin(&EnginesConfig::default());
        let err = registry.resolve("paraformer", &Map::new()).err().unwrap();
        assert!(matches!(err, AppError::UnsupportedModel(_)));
    }

    #[test]
    fn test_construction_failure_is_engine_load() {
        let mut registry = EngineRegistry::new();
        register_broken(&mut registry, "broken");
        let err = registry.resolve("broken", &Map::new()).err().unwrap();
        assert_eq!(err, AppError::EngineLoad("weights missing".into()));
    }

    #[tokio::test]
    async fn test_resolve_builds_fresh_instances() {
        let mut registry = EngineRegistry::new();
        register_text(&mut registry, "stub", "hello");

        let first = registry.resolve("stub", &Map::new()).unwrap();
        let second = registry.resolve("stub", &Map::new()).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let text = first
            .transcribe(Path::new("a.wav"), &TranscribeOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }
}
