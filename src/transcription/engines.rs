//! # Built-in Recognition Engines
//!
//! All built-in engines run out of process so a crashing or hung model never
//! takes the service down with it:
//!
//! - **whisper**: a whisper.cpp style command line tool; the transcript is
//!   whatever the tool prints on stdout.
//! - **funasr** / **kimi-audio**: Python worker scripts. The request is written
//!   as one JSON object on stdin and the worker answers with line-delimited
//!   [`WorkerMessage`]s on stdout.

use crate::config::{WhisperEngineConfig, WorkerEngineConfig};
use crate::transcription::engine::{param_str, Engine, EngineError, EngineParams, TranscribeOptions};
use crate::transcription::process::{find_executable, run_process, ProcessSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// whisper.cpp command line engine.
#[derive(Debug)]
pub struct WhisperCliEngine {
    binary: PathBuf,
    model_path: PathBuf,
    language: String,
    args: Vec<String>,
}

impl WhisperCliEngine {
    /// Construct from config plus job parameters.
    ///
    /// ## Parameters:
    /// - `model_path`: explicit weight file (overrides `model_size`)
    /// - `model_size`: resolves to `<models_dir>/ggml-<size>.bin`
    /// - `language`: recognition language, defaults to the configured one
    pub fn new(config: &WhisperEngineConfig, params: &EngineParams) -> Result<Self, EngineError> {
        let binary = find_executable(&config.binary).ok_or_else(|| {
            EngineError::Load(format!("whisper binary '{}' not found", config.binary))
        })?;

        let model_path = match param_str(params, "model_path") {
            Some(path) => PathBuf::from(path),
            None => {
                let size = param_str(params, "model_size").unwrap_or(&config.default_model_size);
                config.models_dir.join(format!("ggml-{}.bin", size))
            }
        };
        if !model_path.exists() {
            return Err(EngineError::Load(format!(
                "whisper weights not found at {}",
                model_path.display()
            )));
        }

        let language = param_str(params, "language")
            .unwrap_or(&config.default_language)
            .to_string();

        info!(
            binary = %binary.display(),
            model = %model_path.display(),
            language = %language,
            "whisper engine ready"
        );

        Ok(Self {
            binary,
            model_path,
            language,
            args: config.args.clone(),
        })
    }

    fn render_args(&self, audio_path: &Path, language: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", &self.model_path.to_string_lossy())
                    .replace("{audio}", &audio_path.to_string_lossy())
                    .replace("{language}", language)
            })
            .collect()
    }
}

#[async_trait]
impl Engine for WhisperCliEngine {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<String, EngineError> {
        let language = options.language.as_deref().unwrap_or(&self.language);
        let spec = ProcessSpec {
            program: self.binary.clone(),
            args: self.render_args(audio_path, language),
            stdin: None,
        };

        let output = run_process(&spec, &options.cancellation).await?;
        if !output.success() {
            return Err(EngineError::Transcription(format!(
                "whisper exited with code {}: {}",
                output.exit_code,
                output.stderr_tail()
            )));
        }

        let text = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        debug!(chars = text.chars().count(), "whisper transcript received");
        Ok(text)
    }
}

/// Messages a Python worker writes to stdout, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Progress { percent: u8, stage: String },
    Result { data: serde_json::Value },
    Error { message: String },
    Log { level: String, message: String },
}

/// Engine delegating to a Python worker script.
#[derive(Debug)]
pub struct WorkerScriptEngine {
    name: &'static str,
    interpreter: PathBuf,
    script: PathBuf,
    model: String,
    params: EngineParams,
}

impl WorkerScriptEngine {
    /// FunASR worker. `model` selects the FunASR model id.
    pub fn funasr(
        python: &str,
        config: &WorkerEngineConfig,
        params: &EngineParams,
    ) -> Result<Self, EngineError> {
        let model = param_str(params, "model")
            .unwrap_or(&config.default_model)
            .to_string();
        Self::new("funasr", python, config, model, params)
    }

    /// Kimi-Audio worker. Requires `model_path` pointing at downloaded weights.
    pub fn kimi_audio(
        python: &str,
        config: &WorkerEngineConfig,
        params: &EngineParams,
    ) -> Result<Self, EngineError> {
        let model_path = param_str(params, "model_path").ok_or_else(|| {
            EngineError::Load("kimi-audio requires a 'model_path' parameter".to_string())
        })?;
        if !Path::new(model_path).exists() {
            return Err(EngineError::Load(format!(
                "kimi-audio weights not found at {}",
                model_path
            )));
        }
        Self::new("kimi-audio", python, config, model_path.to_string(), params)
    }

    fn new(
        name: &'static str,
        python: &str,
        config: &WorkerEngineConfig,
        model: String,
        params: &EngineParams,
    ) -> Result<Self, EngineError> {
        let interpreter = find_executable(python).ok_or_else(|| {
            EngineError::Load(format!("python interpreter '{}' not found", python))
        })?;
        if !config.script.is_file() {
            return Err(EngineError::Load(format!(
                "{} worker script not found at {}",
                name,
                config.script.display()
            )));
        }

        info!(engine = name, script = %config.script.display(), model = %model, "worker engine ready");

        Ok(Self {
            name,
            interpreter,
            script: config.script.clone(),
            model,
            params: params.clone(),
        })
    }
}

#[async_trait]
impl Engine for WorkerScriptEngine {
    fn name(&self) -> &str {
        self.name
    }

    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<String, EngineError> {
        let request = json!({
            "audio_path": audio_path,
            "model": self.model,
            "language": options.language,
            "params": self.params,
        });
        let spec = ProcessSpec {
            program: self.interpreter.clone(),
            args: vec![self.script.to_string_lossy().into_owned()],
            stdin: Some(request.to_string()),
        };

        let output = run_process(&spec, &options.cancellation).await?;

        let mut result = None;
        let mut worker_error = None;
        for line in output.stdout.lines() {
            match serde_json::from_str::<WorkerMessage>(line) {
                Ok(WorkerMessage::Result { data }) => result = Some(data),
                Ok(WorkerMessage::Error { message }) => worker_error = Some(message),
                Ok(WorkerMessage::Progress { percent, stage }) => {
                    debug!(engine = self.name, percent, stage = %stage, "worker progress");
                }
                Ok(WorkerMessage::Log { level, message }) => {
                    debug!(engine = self.name, level = %level, "{}", message);
                }
                Err(_) => debug!(engine = self.name, "[worker] {}", line),
            }
        }

        if let Some(message) = worker_error {
            return Err(EngineError::Transcription(message));
        }
        if !output.success() {
            return Err(EngineError::Transcription(format!(
                "{} worker exited with code {}: {}",
                self.name,
                output.exit_code,
                output.stderr_tail()
            )));
        }

        let data = result.ok_or_else(|| {
            EngineError::Transcription(format!("{} worker produced no result", self.name))
        })?;
        data.get("text")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| {
                EngineError::Transcription(format!("{} worker result has no text", self.name))
            })
    }
}
