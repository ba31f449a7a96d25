//! Types for the segment module.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineError;

/// Time bounds of one planned segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpan {
    /// Position in the output, `0..N`.
    pub index: usize,
    /// Offset into the source in seconds.
    pub start_secs: f64,
    /// Length in seconds.
    pub duration_secs: f64,
}

/// Lifecycle of a segment within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    Transcoding,
    Done,
    Failed,
}

/// A slice of the source media, processed independently.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Position in the output; reassembly orders by this, never by completion.
    pub index: usize,
    /// Offset into the source in seconds.
    pub start_secs: f64,
    /// Length in seconds.
    pub duration_secs: f64,
    /// Segment bytes in the source container.
    pub payload: Vec<u8>,
    /// Current status.
    pub status: SegmentStatus,
}

impl Segment {
    /// Creates a pending segment for `span`.
    pub fn new(span: &SegmentSpan, payload: Vec<u8>) -> Self {
        Self {
            index: span.index,
            start_secs: span.start_secs,
            duration_secs: span.duration_secs,
            payload,
            status: SegmentStatus::Pending,
        }
    }
}

/// Per-index status table for the segments of one job.
///
/// Pool tasks move their entry to `Transcoding`; the fan-in settles it to
/// `Done` or `Failed`. Out-of-range indices are ignored.
#[derive(Debug)]
pub struct SegmentBoard {
    statuses: Mutex<Vec<SegmentStatus>>,
}

impl SegmentBoard {
    /// Seeds the table from the segments' current statuses.
    pub fn new(segments: &[Segment]) -> Self {
        Self {
            statuses: Mutex::new(segments.iter().map(|s| s.status).collect()),
        }
    }

    /// Records a transition for segment `index`.
    pub fn set(&self, index: usize, status: SegmentStatus) {
        if let Some(entry) = self.statuses.lock().get_mut(index) {
            *entry = status;
        }
    }

    /// Status of segment `index`.
    pub fn status(&self, index: usize) -> Option<SegmentStatus> {
        self.statuses.lock().get(index).copied()
    }

    /// Statuses in index order.
    pub fn snapshot(&self) -> Vec<SegmentStatus> {
        self.statuses.lock().clone()
    }

    /// Number of segments currently in `status`.
    pub fn count(&self, status: SegmentStatus) -> usize {
        self.statuses.lock().iter().filter(|s| **s == status).count()
    }

    /// Whether every segment is `Done`.
    pub fn all_done(&self) -> bool {
        self.statuses
            .lock()
            .iter()
            .all(|s| *s == SegmentStatus::Done)
    }
}

/// How the source is cut into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlicingStrategy {
    /// Cut by timestamp with the engine's stream-copy demuxer.
    TimeBased,
    /// Cut raw bytes into near-equal pieces.
    ByteBased,
}

/// Errors raised while planning or cutting segments.
#[derive(Debug, Error)]
pub enum SegmentationError {
    /// Durations cannot produce a plan.
    #[error("Invalid segment plan: {reason}")]
    InvalidPlan { reason: String },

    /// The engine failed to cut a segment.
    #[error("Failed to cut segment {index}: {reason}")]
    CutFailed { index: usize, reason: String },

    /// Engine error outside of a specific segment.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

impl SegmentationError {
    /// Creates a new invalid plan error.
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }

    /// Creates a new cut failure error.
    pub fn cut_failed(index: usize, reason: impl Into<String>) -> Self {
        Self::CutFailed {
            index,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segments(count: usize) -> Vec<Segment> {
        (0..count)
            .map(|index| {
                let span = SegmentSpan {
                    index,
                    start_secs: index as f64 * 5.0,
                    duration_secs: 5.0,
                };
                Segment::new(&span, vec![index as u8])
            })
            .collect()
    }

    #[test]
    fn test_board_starts_pending() {
        let board = SegmentBoard::new(&segments(3));

        assert_eq!(board.snapshot(), vec![SegmentStatus::Pending; 3]);
        assert_eq!(board.count(SegmentStatus::Pending), 3);
        assert!(!board.all_done());
    }

    #[test]
    fn test_board_transitions() {
        let board = SegmentBoard::new(&segments(2));

        board.set(0, SegmentStatus::Transcoding);
        assert_eq!(board.status(0), Some(SegmentStatus::Transcoding));

        board.set(0, SegmentStatus::Done);
        board.set(1, SegmentStatus::Done);
        assert!(board.all_done());

        board.set(1, SegmentStatus::Failed);
        assert!(!board.all_done());
        assert_eq!(board.count(SegmentStatus::Failed), 1);

        board.set(7, SegmentStatus::Done);
        assert_eq!(board.status(7), None);
    }
}
