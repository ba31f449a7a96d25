//! Codec engine abstraction.
//!
//! A [`CodecEngine`] is one isolated engine instance bound to a private
//! virtual filesystem namespace. Engines are created through an
//! [`EngineFactory`], which lets the pipeline run against ffmpeg in
//! production and against in-memory doubles in tests.

mod config;
mod error;
mod ffmpeg;
mod traits;

pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::{FfmpegEngine, FfmpegEngineFactory};
pub use traits::{validate_name, CodecEngine, EngineFactory, ExecOutcome};
