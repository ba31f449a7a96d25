//! Chunked parallel transcoding pipeline.
//!
//! [`ChunkedTranscoder`] sequences a job: validate the target, probe the
//! duration, cut segments, transcode them on a [`WorkerPool`](crate::pool::WorkerPool),
//! wait for every segment, then join the parts in index order.
//!
//! # Example
//!
//! ```rust,ignore
//! use segcast_core::pipeline::{ChunkedTranscoder, MediaJob, PipelineConfig};
//!
//! let transcoder = ChunkedTranscoder::new(PipelineConfig::default(), factory, prober);
//! let job = MediaJob::new(bytes, "clip.mov", "video/quicktime", "webm");
//! let result = transcoder.run(job).await?;
//! std::fs::write(&result.output_name, &result.output_bytes)?;
//! ```

mod config;
mod error;
mod orchestrator;
mod reassembler;
mod transcoder;
mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use orchestrator::ChunkedTranscoder;
pub use reassembler::{Reassembler, MANIFEST_NAME};
pub use transcoder::SegmentTranscoder;
pub use types::{
    JobProgress, JobResult, MediaJob, SegmentError, SegmentFailureCause, StagedSegment,
    TranscodedSegment,
};
