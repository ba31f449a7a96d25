//! Trait and types for duration probing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;

/// Source media handed to a prober.
#[derive(Debug, Clone, Copy)]
pub struct ProbeInput<'a> {
    /// Engine scope that owns any scratch data the prober writes.
    ///
    /// The caller releases it; a prober never does.
    pub scope: &'a str,
    /// Raw source bytes.
    pub bytes: &'a [u8],
    /// Declared MIME type.
    pub mime_type: &'a str,
    /// Original file name (used as a container hint).
    pub file_name: &'a str,
}

/// Metadata extracted from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Total duration in seconds.
    pub duration_secs: f64,
    /// Container format (e.g., "mov", "matroska").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    /// Audio codec (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
    /// Video codec (if present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
}

impl MediaMetadata {
    /// Metadata carrying only a duration.
    pub fn with_duration(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            container: None,
            audio_codec: None,
            video_codec: None,
        }
    }
}

/// Errors raised while probing.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The source has no container-level ("general") section.
    #[error("No general track found in source")]
    NoGeneralTrack,

    /// The general section carries no usable duration.
    #[error("No duration found in source: {reason}")]
    NoDuration { reason: String },

    /// The probing tool could not be run or reported failure.
    #[error("Probe tool failed: {reason}")]
    ToolFailed { reason: String },

    /// The tool output could not be parsed.
    #[error("Failed to parse probe output: {reason}")]
    ParseError { reason: String },

    /// Engine error while running a probe invocation.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// I/O error while staging the source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Creates a new no-duration error.
    pub fn no_duration(reason: impl Into<String>) -> Self {
        Self::NoDuration {
            reason: reason.into(),
        }
    }

    /// Creates a new tool failure error.
    pub fn tool_failed(reason: impl Into<String>) -> Self {
        Self::ToolFailed {
            reason: reason.into(),
        }
    }
}

/// Extracts the total duration of a source.
#[async_trait]
pub trait DurationProber: Send + Sync {
    /// Returns the name of this prober implementation.
    fn name(&self) -> &str;

    /// Probes the source.
    async fn probe(&self, input: ProbeInput<'_>) -> Result<MediaMetadata, ProbeError>;
}

/// Picks a scratch file extension from the file name, then the MIME type.
pub(crate) fn source_extension(input: &ProbeInput<'_>) -> String {
    crate::codec::format_from_file_name(input.file_name)
        .or_else(|| crate::codec::format_from_mime(input.mime_type).map(str::to_string))
        .unwrap_or_else(|| "bin".to_string())
}

/// Accepts only finite, positive durations.
pub(crate) fn check_duration(duration_secs: f64) -> Result<f64, ProbeError> {
    if duration_secs.is_finite() && duration_secs > 0.0 {
        Ok(duration_secs)
    } else {
        Err(ProbeError::no_duration(format!(
            "duration {} is not positive",
            duration_secs
        )))
    }
}
