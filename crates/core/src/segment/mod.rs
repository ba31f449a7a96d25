//! Segment planning and cutting.
//!
//! A job's source is split into `ceil(total / chunk)` time-bounded segments.
//! Indexes are contiguous from zero and define output order.

mod plan;
mod segmenter;
mod types;

pub use plan::{chunk_duration, plan_segments};
pub use segmenter::Segmenter;
pub use types::{
    Segment, SegmentBoard, SegmentSpan, SegmentStatus, SegmentationError, SlicingStrategy,
};
