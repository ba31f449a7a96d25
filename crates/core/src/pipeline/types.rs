//! Types for the pipeline module.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{file_stem, format_from_file_name, format_from_mime, normalize_format, output_extension};
use crate::engine::EngineError;

/// A conversion request.
#[derive(Debug, Clone)]
pub struct MediaJob {
    /// Unique job ID; also the scope of every engine namespace the job creates.
    pub id: String,
    /// Raw source bytes.
    pub source_bytes: Vec<u8>,
    /// Original file name.
    pub file_name: String,
    /// Source format hint (file extension).
    pub source_format: String,
    /// Requested target format.
    pub target_format: String,
    /// Declared MIME type of the source.
    pub mime_type: String,
}

impl MediaJob {
    /// Creates a job with a fresh ID.
    ///
    /// The source format comes from the file extension, falling back to the
    /// MIME type.
    pub fn new(
        source_bytes: Vec<u8>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        target_format: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_type.into();
        let source_format = format_from_file_name(&file_name)
            .or_else(|| format_from_mime(&mime_type).map(str::to_string))
            .or_else(|| {
                mime_type
                    .split_once('/')
                    .map(|(_, subtype)| normalize_format(subtype))
                    .filter(|subtype| !subtype.is_empty())
            })
            .unwrap_or_default();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_bytes,
            file_name,
            source_format,
            target_format: normalize_format(&target_format.into()),
            mime_type,
        }
    }

    /// Overrides the detected source format.
    pub fn with_source_format(mut self, format: &str) -> Self {
        self.source_format = normalize_format(format);
        self
    }

    /// Name of the produced file: source stem plus the target extension.
    pub fn output_name(&self) -> String {
        format!(
            "{}.{}",
            file_stem(&self.file_name),
            output_extension(&self.target_format)
        )
    }
}

/// A finished conversion.
#[derive(Debug, Clone)]
pub struct JobResult {
    /// ID of the job that produced this result.
    pub job_id: String,
    /// Reassembled output.
    pub output_bytes: Vec<u8>,
    /// Suggested file name for the output.
    pub output_name: String,
    /// MIME type of the target format.
    pub mime_type: String,
    /// Number of segments the source was cut into.
    pub segment_count: usize,
    /// Probed source duration.
    pub duration_secs: f64,
    /// Wall-clock time spent on the job.
    pub elapsed_ms: u64,
}

/// Output of one segment task, read back from its slot.
#[derive(Debug, Clone)]
pub struct TranscodedSegment {
    /// Segment index.
    pub index: usize,
    /// Encoded bytes.
    pub output_bytes: Vec<u8>,
}

/// A transcoded segment written into the job's main namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSegment {
    /// Segment index.
    pub index: usize,
    /// Entry name in the main namespace.
    pub name: String,
}

/// Why a single segment failed.
#[derive(Debug, Error)]
pub enum SegmentFailureCause {
    /// The engine ran and reported failure.
    #[error("engine exited with code {code}: {log_tail}")]
    EngineExit { code: i32, log_tail: String },

    /// The engine could not be driven at all.
    #[error("{0}")]
    Engine(#[from] EngineError),

    /// The task body panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The pool was torn down before the segment settled.
    #[error("worker pool terminated")]
    Terminated,
}

/// Tagged failure for one segment.
#[derive(Debug, Error)]
#[error("segment {index}: {cause}")]
pub struct SegmentError {
    /// Index of the failing segment.
    pub index: usize,
    /// What went wrong.
    pub cause: SegmentFailureCause,
}

impl SegmentError {
    /// Creates a new segment error.
    pub fn new(index: usize, cause: SegmentFailureCause) -> Self {
        Self { index, cause }
    }
}

/// Progress update for a running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobProgress {
    /// Source duration known.
    Probed { job_id: String, duration_secs: f64 },
    /// Source cut into segments.
    Segmented {
        job_id: String,
        segment_count: usize,
        chunk_secs: f64,
    },
    /// One segment settled successfully.
    SegmentDone {
        job_id: String,
        index: usize,
        completed: usize,
        total: usize,
    },
    /// One segment failed.
    SegmentFailed {
        job_id: String,
        index: usize,
        error: String,
    },
    /// All segments done; joining.
    Concatenating { job_id: String },
    /// Completed.
    Completed {
        job_id: String,
        output_name: String,
        output_size: usize,
        elapsed_ms: u64,
    },
    /// Failed.
    Failed {
        job_id: String,
        error: String,
        failed_phase: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_job_detects_format_from_name() {
        let job = MediaJob::new(vec![1], "Holiday Clip.MOV", "video/quicktime", "WebM");
        assert_eq!(job.source_format, "mov");
        assert_eq!(job.target_format, "webm");
        assert_eq!(job.output_name(), "Holiday Clip.webm");
        assert!(uuid::Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_media_job_falls_back_to_mime() {
        let job = MediaJob::new(vec![1], "recording", "audio/mpeg", "wav");
        assert_eq!(job.source_format, "mp3");

        let job = MediaJob::new(vec![1], "blob", "video/x-custom", "mp4");
        assert_eq!(job.source_format, "x-custom");

        let job = MediaJob::new(vec![1], "blob", "", "mp4");
        assert_eq!(job.source_format, "");
    }

    #[test]
    fn test_output_name_uses_output_extension() {
        let job = MediaJob::new(vec![1], "movie.avi", "video/x-msvideo", "mp4v");
        assert_eq!(job.output_name(), "movie.mp4");
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = MediaJob::new(vec![1], "a.mp4", "video/mp4", "mkv");
        let b = MediaJob::new(vec![1], "a.mp4", "video/mp4", "mkv");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_progress_serialization() {
        let progress = JobProgress::SegmentDone {
            job_id: "j-1".to_string(),
            index: 2,
            completed: 3,
            total: 6,
        };

        let json = serde_json::to_string(&progress).unwrap();
        assert!(json.contains("\"status\":\"segment_done\""));
        assert!(json.contains("\"index\":2"));
    }
}
