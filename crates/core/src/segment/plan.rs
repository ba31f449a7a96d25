//! Segment planning.

use super::types::{SegmentSpan, SegmentationError};

/// Remainders at or below this fraction of the total are float noise.
const NOISE_EPSILON: f64 = 1e-9;

/// Splits `total_secs` into `ceil(total / chunk)` spans.
///
/// Every span but the last lasts exactly `chunk_secs`; the last one covers
/// the remainder.
pub fn plan_segments(
    total_secs: f64,
    chunk_secs: f64,
) -> Result<Vec<SegmentSpan>, SegmentationError> {
    if !total_secs.is_finite() || total_secs <= 0.0 {
        return Err(SegmentationError::invalid_plan(format!(
            "total duration must be positive, got {}",
            total_secs
        )));
    }
    if !chunk_secs.is_finite() || chunk_secs <= 0.0 {
        return Err(SegmentationError::invalid_plan(format!(
            "chunk duration must be positive, got {}",
            chunk_secs
        )));
    }

    let mut count = (total_secs / chunk_secs).ceil().max(1.0) as usize;
    let noise = NOISE_EPSILON * total_secs.max(1.0);
    if count > 1 && total_secs - (count - 1) as f64 * chunk_secs <= noise {
        count -= 1;
    }

    let spans = (0..count)
        .map(|index| {
            let start_secs = index as f64 * chunk_secs;
            let duration_secs = if index + 1 == count {
                total_secs - start_secs
            } else {
                chunk_secs
            };
            SegmentSpan {
                index,
                start_secs,
                duration_secs,
            }
        })
        .collect();

    Ok(spans)
}

/// Chunk duration for a job: `total / target_chunks` when set, else `chunk_secs`.
pub fn chunk_duration(total_secs: f64, chunk_secs: f64, target_chunks: Option<u32>) -> f64 {
    match target_chunks {
        Some(k) if k > 0 => total_secs / k as f64,
        _ => chunk_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations(spans: &[SegmentSpan]) -> Vec<f64> {
        spans.iter().map(|s| s.duration_secs).collect()
    }

    #[test]
    fn test_even_split() {
        let spans = plan_segments(30.0, 5.0).unwrap();
        assert_eq!(spans.len(), 6);
        assert_eq!(durations(&spans), vec![5.0; 6]);
        assert_eq!(spans[5].start_secs, 25.0);
    }

    #[test]
    fn test_uneven_split() {
        let spans = plan_segments(32.0, 5.0).unwrap();
        assert_eq!(spans.len(), 7);
        assert!(spans[..6].iter().all(|s| s.duration_secs == 5.0));
        assert!((spans[6].duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(spans[6].start_secs, 30.0);
    }

    #[test]
    fn test_shorter_than_chunk() {
        let spans = plan_segments(3.2, 5.0).unwrap();
        assert_eq!(spans.len(), 1);
        assert!((spans[0].duration_secs - 3.2).abs() < 1e-9);
    }

    #[test]
    fn test_indexes_are_contiguous() {
        let spans = plan_segments(61.7, 4.0).unwrap();
        for (i, span) in spans.iter().enumerate() {
            assert_eq!(span.index, i);
        }
    }

    #[test]
    fn test_count_matches_ceil() {
        for &(total, chunk) in &[(1.0, 0.3), (10.0, 3.0), (59.9, 6.0), (7200.0, 5.0), (0.5, 0.5)] {
            let spans = plan_segments(total, chunk).unwrap();
            let expected = (total / chunk).ceil() as usize;
            assert_eq!(spans.len(), expected, "{} / {}", total, chunk);

            let last = spans.last().unwrap();
            let expected_last = total - (expected - 1) as f64 * chunk;
            assert!((last.duration_secs - expected_last).abs() < 1e-9);
        }
    }

    #[test]
    fn test_float_noise_does_not_add_segment() {
        // 0.1 * 3 is 0.30000000000000004
        let spans = plan_segments(0.1 * 3.0, 0.1).unwrap();
        assert_eq!(spans.len(), 3);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(plan_segments(0.0, 5.0).is_err());
        assert!(plan_segments(30.0, 0.0).is_err());
        assert!(plan_segments(f64::NAN, 5.0).is_err());
        assert!(plan_segments(30.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_chunk_duration() {
        assert_eq!(chunk_duration(30.0, 5.0, None), 5.0);
        assert_eq!(chunk_duration(30.0, 5.0, Some(4)), 7.5);
        assert_eq!(chunk_duration(30.0, 5.0, Some(0)), 5.0);
    }
}
