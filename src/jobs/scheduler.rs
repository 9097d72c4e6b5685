//! # Job Scheduler
//!
//! Accepts transcription submissions and runs them on a fixed pool of tokio
//! workers.
//!
//! ## Pipeline:
//! 1. `submit` validates the audio source and model, stores a pending job and
//!    pushes one work item onto an unbounded FIFO queue, then returns.
//! 2. A pool worker takes the next item, reports `Started`, resolves an engine
//!    and runs the transcription under the configured deadline.
//! 3. The raw text is normalized and the worker reports exactly one terminal
//!    event: `Finished` or `Failed`.
//! 4. A single writer task applies every [`JobEvent`] to the store, so status
//!    changes are never written from two places at once.
//!
//! ## Key Rust Concepts:
//! - **mpsc channels**: work items flow to the pool, lifecycle events flow to the writer
//! - **Shared receiver**: workers take turns on `Arc<Mutex<UnboundedReceiver>>`
//! - **CancellationToken**: one token stops the pool and cancels in-flight engine calls

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::jobs::store::{Database, JobStore};
use crate::models::{Job, JobStatus};
use crate::transcription::engine::{param_str, Engine, EngineError, EngineParams, TranscribeOptions};
use crate::transcription::lifecycle::ModelLifecycleRegistry;
use crate::transcription::normalizer::TextNormalizer;
use crate::transcription::registry::EngineRegistry;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Returned to the caller of [`JobScheduler::submit`]; the job is polled by id.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Lifecycle events sent from pool workers to the writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started { job_id: Uuid },
    Finished { job_id: Uuid, text: String },
    Failed { job_id: Uuid, error: String },
}

impl JobEvent {
    fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Started { job_id }
            | JobEvent::Finished { job_id, .. }
            | JobEvent::Failed { job_id, .. } => *job_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub worker_count: usize,
    /// `None` lets engine calls run without a deadline.
    pub timeout: Option<Duration>,
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            timeout: (config.transcription_timeout_secs > 0)
                .then(|| Duration::from_secs(config.transcription_timeout_secs)),
        }
    }
}

#[derive(Debug)]
struct WorkItem {
    job_id: Uuid,
    audio_path: PathBuf,
    model_name: String,
    params: EngineParams,
}

/// Everything a worker needs to execute a work item.
struct WorkerContext {
    db: Arc<Database>,
    engines: Arc<EngineRegistry>,
    lifecycle: Arc<ModelLifecycleRegistry>,
    normalizer: TextNormalizer,
    timeout: Option<Duration>,
    shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct JobScheduler {
    context: Arc<WorkerContext>,
    queue: mpsc::UnboundedSender<WorkItem>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    worker_count: usize,
}

impl JobScheduler {
    /// Spawn the worker pool and the writer task. Must be called from within
    /// a tokio runtime.
    pub fn start(
        options: SchedulerOptions,
        db: Arc<Database>,
        engines: Arc<EngineRegistry>,
        lifecycle: Arc<ModelLifecycleRegistry>,
        normalizer: TextNormalizer,
    ) -> Self {
        let worker_count = options.worker_count.max(1);
        let context = Arc::new(WorkerContext {
            db: Arc::clone(&db),
            engines,
            lifecycle,
            normalizer,
            timeout: options.timeout,
            shutdown: CancellationToken::new(),
        });

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));

        let mut tasks = Vec::with_capacity(worker_count + 1);
        for worker_id in 0..worker_count {
            tasks.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&queue_rx),
                Arc::clone(&context),
                event_tx.clone(),
            )));
        }
        // The writer stops once every worker has dropped its sender.
        drop(event_tx);
        let store: Arc<dyn JobStore> = db;
        tasks.push(tokio::spawn(writer_loop(store, event_rx)));

        info!(
            workers = worker_count,
            timeout = ?options.timeout,
            "job scheduler started"
        );

        Self {
            context,
            queue: queue_tx,
            tasks: Arc::new(Mutex::new(tasks)),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Create a pending job and enqueue it. Never waits for the transcription.
    ///
    /// ## Errors:
    /// - `NotFound` if the audio source or its file does not exist
    /// - `UnsupportedModel` if no engine or loaded model answers to `model_name`
    /// - `ValidationError` if `params` is present but not a JSON object
    pub fn submit(&self, audio_id: Uuid, model_name: &str, params: Option<Value>) -> AppResult<JobHandle> {
        let params = match params {
            None | Some(Value::Null) => EngineParams::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(AppError::ValidationError(format!(
                    "model_params must be a JSON object, got {}",
                    other
                )))
            }
        };

        let audio = self.context.db.get_audio(audio_id)?;
        if !audio.path.exists() {
            return Err(AppError::NotFound(format!(
                "Audio file for '{}' is missing from storage",
                audio_id
            )));
        }

        if !self.context.is_known_model(model_name) {
            return Err(AppError::UnsupportedModel(format!(
                "Model '{}' is not supported",
                model_name
            )));
        }

        let job = self
            .context
            .db
            .create_job(Job::new(audio_id, model_name.to_string(), params.clone()))?;

        let item = WorkItem {
            job_id: job.id,
            audio_path: audio.path,
            model_name: job.model_name.clone(),
            params,
        };
        if self.queue.send(item).is_err() {
            // The pool is gone, so no writer will ever see this job either.
            let reason = "job scheduler is not running".to_string();
            if let Err(err) = self.context.db.mark_failed(job.id, reason.clone()) {
                error!(job_id = %job.id, error = %err, "failed to record unqueued job");
            }
            return Err(AppError::Internal(reason));
        }

        info!(job_id = %job.id, audio_id = %audio_id, model = %model_name, "job submitted");
        Ok(JobHandle {
            job_id: job.id,
            status: job.status,
        })
    }

    /// Stop accepting work, cancel in-flight transcriptions and wait for the
    /// writer to record their outcome.
    pub async fn shutdown(&self) {
        self.context.shutdown.cancel();
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                error!(error = %err, "scheduler task ended abnormally");
            }
        }
        info!("job scheduler stopped");
    }
}

impl WorkerContext {
    fn is_known_model(&self, model_name: &str) -> bool {
        self.engines.contains(model_name)
            || self.lifecycle.contains(model_name)
            || self
                .db
                .find_model_by_name(model_name)
                .ok()
                .flatten()
                .is_some_and(|descriptor| self.engines.contains(descriptor.engine_key()))
    }

    /// Reuse the engine loaded under `model_name` when the job brings no
    /// parameters of its own; otherwise build a fresh one. A registered
    /// descriptor supplies the engine key and base parameters.
    fn resolve_engine(&self, item: &WorkItem) -> AppResult<Arc<dyn Engine>> {
        if item.params.is_empty() {
            if let Some(engine) = self.lifecycle.get(&item.model_name) {
                debug!(job_id = %item.job_id, model = %item.model_name, "reusing loaded engine");
                return Ok(engine);
            }
        }

        if self.engines.contains(&item.model_name) {
            return self.engines.resolve(&item.model_name, &item.params);
        }

        match self.db.find_model_by_name(&item.model_name)? {
            Some(descriptor) => {
                let mut params = descriptor.engine_params();
                params.extend(item.params.clone());
                self.engines.resolve(descriptor.engine_key(), &params)
            }
            None => Err(AppError::UnsupportedModel(format!(
                "Model '{}' is not supported",
                item.model_name
            ))),
        }
    }

    async fn transcribe(&self, item: &WorkItem) -> AppResult<String> {
        let engine = self.resolve_engine(item)?;
        debug!(job_id = %item.job_id, engine = engine.name(), "engine resolved");

        let cancellation = self.shutdown.child_token();
        let options = TranscribeOptions {
            language: param_str(&item.params, "language").map(str::to_string),
            cancellation: cancellation.clone(),
        };

        let call = engine.transcribe(&item.audio_path, &options);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    cancellation.cancel();
                    Err(EngineError::TimedOut(limit))
                }
            },
            None => call.await,
        };
        Ok(outcome?)
    }

    async fn execute(&self, worker_id: usize, item: WorkItem, events: &mpsc::UnboundedSender<JobEvent>) {
        let job_id = item.job_id;
        send_event(events, JobEvent::Started { job_id });
        debug!(worker = worker_id, job_id = %job_id, model = %item.model_name, "job started");

        let started = Instant::now();
        let event = match self.transcribe(&item).await {
            Ok(raw) => {
                let text = self.normalizer.normalize(&raw);
                info!(
                    job_id = %job_id,
                    chars = text.chars().count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "job finished"
                );
                JobEvent::Finished { job_id, text }
            }
            Err(err) => {
                warn!(job_id = %job_id, error = %err, "job failed");
                JobEvent::Failed {
                    job_id,
                    error: err.to_string(),
                }
            }
        };
        send_event(events, event);
    }
}

fn send_event(events: &mpsc::UnboundedSender<JobEvent>, event: JobEvent) {
    let job_id = event.job_id();
    if events.send(event).is_err() {
        error!(job_id = %job_id, "job writer is gone; event dropped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<WorkItem>>>,
    context: Arc<WorkerContext>,
    events: mpsc::UnboundedSender<JobEvent>,
) {
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = context.shutdown.cancelled() => None,
                item = queue.recv() => item,
            }
        };
        let Some(item) = next else {
            break;
        };
        context.execute(worker_id, item, &events).await;
    }
    debug!(worker = worker_id, "scheduler worker stopped");
}

fn apply_event(store: &dyn JobStore, event: JobEvent) -> AppResult<()> {
    match event {
        JobEvent::Started { job_id } => store.mark_running(job_id).map(|_| ()),
        JobEvent::Finished { job_id, text } => store.mark_finished(job_id, text).map(|_| ()),
        JobEvent::Failed { job_id, error } => store.mark_failed(job_id, error).map(|_| ()),
    }
}

/// Sole writer of job lifecycle transitions. Store writes run on the blocking
/// pool, one event at a time, so they keep their order.
async fn writer_loop(store: Arc<dyn JobStore>, mut events: mpsc::UnboundedReceiver<JobEvent>) {
    while let Some(event) = events.recv().await {
        let job_id = event.job_id();
        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || apply_event(store.as_ref(), event)).await {
            Ok(Ok(())) => {}
            // The job stays in its previous state; nothing retries the write.
            Ok(Err(err)) => error!(job_id = %job_id, error = %err, "failed to record job event"),
            Err(err) => error!(job_id = %job_id, error = %err, "job writer task panicked"),
        }
    }
    debug!("job writer stopped");
}
