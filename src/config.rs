//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (`config.toml`, optional)
//! - Environment variables with the `APP__` prefix
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platform conventions)
//! 2. Environment variables (`APP__SCHEDULER__WORKER_COUNT=4`, ...)
//! 3. Configuration file (`config.toml`)
//! 4. Default values (defined in the Default impls)
//!
//! Nested keys are separated by a double underscore because several field
//! names contain single underscores themselves.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub engines: EnginesConfig,
    pub normalizer: NormalizerConfig,
    pub summary: SummaryConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS. Empty means any origin.
    pub cors_origins: Vec<String>,
}

/// Where uploaded audio, downloaded models and the job database live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub models_dir: PathBuf,
    /// SQLite database holding jobs, results, audio sources and model descriptors.
    /// `None` keeps everything in memory only.
    pub database_file: Option<PathBuf>,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: usize,
}

/// Worker pool settings for the transcription job pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of transcriptions allowed to run at the same time.
    pub worker_count: usize,
    /// Deadline for a single engine call; 0 disables it.
    pub transcription_timeout_secs: u64,
}

/// Settings for the built-in recognition engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnginesConfig {
    /// Interpreter used for the Python worker engines.
    pub python: String,
    pub whisper: WhisperEngineConfig,
    pub funasr: WorkerEngineConfig,
    pub kimi_audio: WorkerEngineConfig,
}

/// whisper.cpp style command line engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperEngineConfig {
    /// Binary name (looked up on PATH) or absolute path.
    pub binary: String,
    /// Directory holding `ggml-<size>.bin` weight files.
    pub models_dir: PathBuf,
    pub default_model_size: String,
    pub default_language: String,
    /// Argument template; `{model}`, `{audio}` and `{language}` are substituted.
    pub args: Vec<String>,
}

/// Engine backed by a Python worker script speaking line-delimited JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEngineConfig {
    pub script: PathBuf,
    pub default_model: String,
}

/// Word lists and thresholds for the transcript normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    pub filler_words: Vec<String>,
    pub interrogative_particles: Vec<String>,
    pub exclamatory_particles: Vec<String>,
    /// Minimum length (in characters) of an unterminated span that receives a period.
    pub sentence_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    pub default_algorithm: String,
    pub default_length: usize,
    pub llm: LlmConfig,
}

/// OpenAI-compatible chat endpoint used by the `llm` summary algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL; `/chat/completions` is appended.
    pub api_base: String,
    /// Empty disables the `llm` algorithm.
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
            api_key: String::new(),
            model: "doubao-1.6-chat".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec![
                    "http://127.0.0.1:5173".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
            storage: StorageConfig {
                uploads_dir: PathBuf::from("data/uploads"),
                models_dir: PathBuf::from("data/asr-models"),
                database_file: Some(PathBuf::from("data/speech_jobs.db")),
                max_upload_bytes: 200 * 1024 * 1024,
            },
            scheduler: SchedulerConfig {
                worker_count: 2,
                transcription_timeout_secs: 30 * 60,
            },
            engines: EnginesConfig::default(),
            normalizer: NormalizerConfig::default(),
            summary: SummaryConfig {
                default_algorithm: "truncate".to_string(),
                default_length: 100,
                llm: LlmConfig::default(),
            },
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            whisper: WhisperEngineConfig {
                binary: "whisper-cli".to_string(),
                models_dir: PathBuf::from("data/asr-models/whisper"),
                default_model_size: "base".to_string(),
                default_language: "zh".to_string(),
                args: ["-m", "{model}", "-f", "{audio}", "-l", "{language}", "-nt", "-np"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            funasr: WorkerEngineConfig {
                script: PathBuf::from("python_workers/funasr_worker.py"),
                default_model: "paraformer-zh".to_string(),
            },
            kimi_audio: WorkerEngineConfig {
                script: PathBuf::from("python_workers/kimi_audio_worker.py"),
                default_model: "kimi-audio-7b-instruct".to_string(),
            },
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            filler_words: words(&[
                "的", "啊", "嗯", "吧", "呢", "嘛", "哦", "呃", "这个", "那个", "就是", "然后",
                "所以", "就是说",
            ]),
            interrogative_particles: words(&["吗", "吧", "呢"]),
            exclamatory_particles: words(&["啊", "呀", "哇"]),
            sentence_length: 20,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`
    /// - `APP__SCHEDULER__TRANSCRIPTION_TIMEOUT_SECS=600`
    /// - `APP__ENGINES__WHISPER__BINARY=/opt/whisper.cpp/whisper-cli`
    /// - `HOST=0.0.0.0` / `PORT=3000`
    /// - `DOUBAO_API_BASE` / `DOUBAO_API_KEY` / `DOUBAO_MODEL` for `[summary.llm]`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        for (var, key) in [
            ("DOUBAO_API_BASE", "summary.llm.api_base"),
            ("DOUBAO_API_KEY", "summary.llm.api_key"),
            ("DOUBAO_MODEL", "summary.llm.model"),
        ] {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.scheduler.worker_count == 0 {
            return Err(anyhow::anyhow!("Scheduler worker count must be greater than 0"));
        }

        if self.storage.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Maximum upload size must be greater than 0"));
        }

        if self.normalizer.sentence_length == 0 {
            return Err(anyhow::anyhow!("Normalizer sentence length must be greater than 0"));
        }

        if self.normalizer.filler_words.iter().any(|w| w.is_empty()) {
            return Err(anyhow::anyhow!("Normalizer filler words cannot be empty strings"));
        }

        if self.summary.default_length == 0 {
            return Err(anyhow::anyhow!("Summary length must be greater than 0"));
        }

        Ok(())
    }

    /// Render the effective configuration as TOML, for startup logging.
    /// Secrets are masked.
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if !shown.summary.llm.api_key.is_empty() {
            shown.summary.llm.api_key = "***".to_string();
        }
        Ok(toml::to_string_pretty(&shown)?)
    }
}
