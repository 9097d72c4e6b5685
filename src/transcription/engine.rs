//! # Recognition Engine Contract
//!
//! Every speech-recognition backend implements [`Engine`]: a single
//! `transcribe` operation from an audio file to raw text. Engines are
//! constructed by the [`EngineRegistry`](super::registry::EngineRegistry) and
//! report construction failures ([`EngineError::Load`]) separately from
//! failures while transcribing.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Engine-specific construction parameters (a JSON object).
pub type EngineParams = Map<String, Value>;

/// Errors raised by recognition engines.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The engine could not be initialized (missing weights, missing binary, ...)
    Load(String),
    /// The engine was constructed but failed to produce a transcript
    Transcription(String),
    /// The transcription exceeded its deadline
    TimedOut(Duration),
    /// The transcription was cancelled (service shutting down)
    Cancelled,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Load(msg) => write!(f, "engine failed to load: {}", msg),
            EngineError::Transcription(msg) => write!(f, "transcription failed: {}", msg),
            EngineError::TimedOut(limit) => {
                write!(f, "transcription timed out after {}s", limit.as_secs_f64())
            }
            EngineError::Cancelled => write!(f, "transcription cancelled"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Per-call options handed to [`Engine::transcribe`].
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Language override; engines fall back to their configured language.
    pub language: Option<String>,
    /// Fired when the scheduler gives up on the call (deadline or shutdown).
    /// Engines holding external resources must release them promptly.
    pub cancellation: CancellationToken,
}

/// A speech-recognition implementation.
///
/// The call is treated as blocking from the scheduler's point of view: a pool
/// worker is occupied for its full duration.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Registry key this engine was constructed under.
    fn name(&self) -> &str;

    /// Transcribe the audio file at `audio_path` into raw (un-normalized) text.
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<String, EngineError>;
}

/// Read an optional string parameter.
pub fn param_str<'a>(params: &'a EngineParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}
