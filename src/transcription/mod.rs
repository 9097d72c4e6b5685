//! # Transcription Module
//!
//! Everything between an audio file and a stored transcript, apart from job
//! bookkeeping (see [`crate::jobs`]).
//!
//! ## Key Components:
//! - **Engine contract** (`engine`): the `Engine` trait every recognizer implements
//! - **Built-in engines** (`engines`, `process`): whisper.cpp CLI and Python worker scripts
//! - **Engine registry** (`registry`): model name → engine constructor
//! - **Lifecycle registry** (`lifecycle`): engines loaded ahead of time by administrators
//! - **Model catalog** (`catalog`): registered model descriptors
//! - **Normalizer** (`normalizer`): cleanup applied to every raw transcript
//!
//! ## Engines run out of process
//! Recognition itself happens in external binaries or Python workers. The
//! service only spawns them, feeds them the audio path and collects the text,
//! which keeps model runtimes out of the server's address space.

pub mod catalog;
pub mod engine;
pub mod engines;
pub mod lifecycle;
pub mod normalizer;
pub mod process;
pub mod registry;

pub use catalog::{ModelCatalog, ModelView, RegisterModelRequest};
pub use engine::{Engine, EngineError, EngineParams, TranscribeOptions};
pub use lifecycle::{LifecycleOutcome, LoadedModelInfo, ModelLifecycleRegistry};
pub use normalizer::TextNormalizer;
pub use registry::EngineRegistry;
