//! Error types for the pipeline module.

use thiserror::Error;

use super::types::{SegmentError, SegmentFailureCause};
use crate::codec::CodecError;
use crate::engine::EngineError;
use crate::probe::ProbeError;
use crate::segment::SegmentationError;

/// Why a job failed. Every job rejects with exactly one of these.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No codec strategy is registered for the target format.
    #[error("Unsupported target format: {format}")]
    UnsupportedFormat { format: String },

    /// Duration or metadata unavailable for the source.
    #[error("Probe failed: {reason}")]
    ProbeFailure { reason: String },

    /// The source could not be cut into segments.
    #[error("Segmentation failed: {cause}")]
    SegmentationFailure { index: Option<usize>, cause: String },

    /// The engine failed while transcoding segment `index`.
    #[error("Segment {index} failed: {cause}")]
    SegmentFailure {
        index: usize,
        cause: SegmentFailureCause,
    },

    /// The final stream-copy join failed.
    #[error("Concatenation failed: {cause}")]
    ConcatFailure { cause: String },

    /// The job itself is malformed.
    #[error("Invalid job: {reason}")]
    InvalidJob { reason: String },

    /// Engine error outside of a specific segment.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// The job was cancelled before it settled.
    #[error("Job was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Creates a new probe failure error.
    pub fn probe_failure(reason: impl Into<String>) -> Self {
        Self::ProbeFailure {
            reason: reason.into(),
        }
    }

    /// Creates a new concat failure error.
    pub fn concat_failure(cause: impl Into<String>) -> Self {
        Self::ConcatFailure {
            cause: cause.into(),
        }
    }

    /// Creates a new invalid job error.
    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            reason: reason.into(),
        }
    }

    /// Stage name for logs and progress events.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } | Self::InvalidJob { .. } => "validate",
            Self::ProbeFailure { .. } => "probe",
            Self::SegmentationFailure { .. } => "segment",
            Self::SegmentFailure { .. } => "transcode",
            Self::ConcatFailure { .. } => "concat",
            Self::Engine(_) => "engine",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<CodecError> for PipelineError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::UnsupportedFormat { format } => Self::UnsupportedFormat { format },
        }
    }
}

impl From<ProbeError> for PipelineError {
    fn from(err: ProbeError) -> Self {
        Self::probe_failure(err.to_string())
    }
}

impl From<SegmentationError> for PipelineError {
    fn from(err: SegmentationError) -> Self {
        let index = match &err {
            SegmentationError::CutFailed { index, .. } => Some(*index),
            _ => None,
        };
        Self::SegmentationFailure {
            index,
            cause: err.to_string(),
        }
    }
}

impl From<SegmentError> for PipelineError {
    fn from(err: SegmentError) -> Self {
        Self::SegmentFailure {
            index: err.index,
            cause: err.cause,
        }
    }
}
