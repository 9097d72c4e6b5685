//! # Application State Management
//!
//! Shared state handed to every HTTP handler through `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - Each worker thread of the HTTP server gets a clone of `AppState`; the
//!   clones point at the same database, registries and scheduler.
//!
//! ### Explicit service wiring
//! - The model lifecycle registry, engine registry and job store are built
//!   once in [`AppState::new`] and passed to whoever needs them. Nothing is a
//!   global, so tests can build a state around stub engines.
//!
//! ### parking_lot::RwLock
//! - Request metrics are updated by the middleware on every request. The
//!   parking_lot lock never poisons, so no `unwrap()` is needed on access.

use crate::audio::AudioLibrary;
use crate::config::AppConfig;
use crate::error::AppResult;
use crate::jobs::{Database, JobScheduler, JobStore, SchedulerOptions};
use crate::transcription::{EngineRegistry, ModelCatalog, ModelLifecycleRegistry, TextNormalizer};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Everything the handlers share.
#[derive(Clone)]
pub struct AppState {
    /// Effective configuration; fixed for the lifetime of the process.
    pub config: Arc<AppConfig>,

    /// Request metrics updated by [`MetricsMiddleware`](crate::middleware::MetricsMiddleware).
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started.
    pub start_time: Instant,

    pub db: Arc<Database>,
    pub engines: Arc<EngineRegistry>,
    pub lifecycle: Arc<ModelLifecycleRegistry>,
    pub scheduler: JobScheduler,
    pub audio: Arc<AudioLibrary>,
    pub catalog: Arc<ModelCatalog>,
}

/// Request metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    /// Keyed by route pattern, e.g. `GET /api/v1/asr/jobs/{id}`.
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Per-route request statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Wire the services together and start the job scheduler.
    ///
    /// Must be called from inside the tokio runtime, since the scheduler
    /// spawns its workers immediately.
    pub fn new(config: AppConfig, db: Arc<Database>, engines: EngineRegistry) -> Self {
        let engines = Arc::new(engines);
        let lifecycle = Arc::new(ModelLifecycleRegistry::new(Arc::clone(&engines)));
        let scheduler = JobScheduler::start(
            SchedulerOptions::from(&config.scheduler),
            Arc::clone(&db),
            Arc::clone(&engines),
            Arc::clone(&lifecycle),
            TextNormalizer::new(&config.normalizer),
        );
        let audio = Arc::new(AudioLibrary::new(
            Arc::clone(&db),
            config.storage.uploads_dir.clone(),
        ));
        let catalog = Arc::new(ModelCatalog::new(
            Arc::clone(&db),
            Arc::clone(&lifecycle),
            config.storage.models_dir.clone(),
        ));

        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            db,
            engines,
            lifecycle,
            scheduler,
            audio,
            catalog,
        }
    }

    /// Production wiring: the configured database file and the built-in engines.
    pub fn from_config(config: AppConfig) -> AppResult<Self> {
        let db = match &config.storage.database_file {
            Some(path) => Database::open(path)?,
            None => Database::in_memory()?,
        };
        let engines = EngineRegistry::builtin(&config.engines);
        Ok(Self::new(config, Arc::new(db), engines))
    }

    /// The job store as the trait the pipeline is written against.
    pub fn store(&self) -> &dyn JobStore {
        self.db.as_ref()
    }

    pub fn increment_request_count(&self) {
        self.metrics.write().request_count += 1;
    }

    pub fn increment_error_count(&self) {
        self.metrics.write().error_count += 1;
    }

    /// Record one request against `endpoint`.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write();
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Copy of the metrics, so the lock is not held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of failed requests, 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::transcription::registry::test_support::register_text;

    /// State backed by an in-memory database, temp storage and a `stub`
    /// engine that answers "你好吗".
    pub fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = AppConfig::default();
        config.storage.uploads_dir = dir.path().join("uploads");
        config.storage.models_dir = dir.path().join("models");
        config.storage.database_file = None;

        let mut engines = EngineRegistry::new();
        register_text(&mut engines, "stub", "你好吗");
        (AppState::new(config, Arc::new(Database::in_memory().unwrap()), engines), dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metric_rates() {
        let metric = EndpointMetric {
            request_count: 4,
            total_duration_ms: 100,
            error_count: 1,
        };
        assert_eq!(metric.average_duration_ms(), 25.0);
        assert_eq!(metric.error_rate(), 0.25);
        assert_eq!(EndpointMetric::default().error_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_record_endpoint_request() {
        let (state, _dir) = test_support::test_state();
        state.increment_request_count();
        state.record_endpoint_request("GET /api/v1/health", 12, false);
        state.record_endpoint_request("GET /api/v1/health", 8, true);

        let snapshot = state.get_metrics_snapshot();
        assert_eq!(snapshot.request_count, 1);
        let health = &snapshot.endpoint_metrics["GET /api/v1/health"];
        assert_eq!(health.request_count, 2);
        assert_eq!(health.total_duration_ms, 20);
        assert_eq!(health.error_count, 1);
    }
}
