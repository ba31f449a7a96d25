//! Cuts source media into segment payloads.

use tracing::{debug, warn};

use super::types::{Segment, SegmentSpan, SegmentationError, SlicingStrategy};
use crate::codec::{output_extension, CodecGroup};
use crate::engine::CodecEngine;

/// Container used for chunks of sources with no known group.
const FALLBACK_CHUNK_CONTAINER: &str = "mkv";

/// Splits a source into [`Segment`]s following a plan.
#[derive(Debug, Clone, Copy, Default)]
pub struct Segmenter;

impl Segmenter {
    /// Slicing strategy for a source format.
    ///
    /// Raw elementary streams carry no container timestamps, so they are cut
    /// by bytes; everything else is cut by time.
    pub fn strategy_for(source_format: &str) -> SlicingStrategy {
        match CodecGroup::of(source_format) {
            Some(group) if group.is_elementary_stream() => SlicingStrategy::ByteBased,
            _ => SlicingStrategy::TimeBased,
        }
    }

    /// Container extension used for time-based chunks of `source_format`.
    pub fn chunk_extension(source_format: &str) -> String {
        match CodecGroup::of(source_format) {
            Some(_) => output_extension(source_format),
            None => FALLBACK_CHUNK_CONTAINER.to_string(),
        }
    }

    /// Cuts `source` into one segment per span.
    pub async fn split(
        &self,
        engine: &dyn CodecEngine,
        source: &[u8],
        source_format: &str,
        plan: &[SegmentSpan],
    ) -> Result<Vec<Segment>, SegmentationError> {
        if plan.is_empty() {
            return Err(SegmentationError::invalid_plan("plan has no segments"));
        }

        match Self::strategy_for(source_format) {
            SlicingStrategy::TimeBased => self.split_by_time(engine, source, source_format, plan).await,
            SlicingStrategy::ByteBased => Self::split_by_bytes(source, plan),
        }
    }

    /// Stream-copy cut arguments for one span.
    pub fn time_args(span: &SegmentSpan, input: &str, output: &str) -> Vec<String> {
        vec![
            "-ss".to_string(),
            format!("{:.3}", span.start_secs),
            "-t".to_string(),
            format!("{:.3}", span.duration_secs),
            "-i".to_string(),
            input.to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            output.to_string(),
        ]
    }

    async fn split_by_time(
        &self,
        engine: &dyn CodecEngine,
        source: &[u8],
        source_format: &str,
        plan: &[SegmentSpan],
    ) -> Result<Vec<Segment>, SegmentationError> {
        let ext = Self::chunk_extension(source_format);
        let source_name = format!("source.{}", ext);
        engine.write_file(&source_name, source).await?;

        let result = self.cut_all(engine, &source_name, &ext, plan).await;

        if let Err(e) = engine.delete_file(&source_name).await {
            warn!(
                "[{}] Failed to delete segmenter source {}: {}",
                engine.namespace(),
                source_name,
                e
            );
        }

        result
    }

    async fn cut_all(
        &self,
        engine: &dyn CodecEngine,
        source_name: &str,
        ext: &str,
        plan: &[SegmentSpan],
    ) -> Result<Vec<Segment>, SegmentationError> {
        let mut segments = Vec::with_capacity(plan.len());

        for span in plan {
            let chunk_name = format!("chunk_{}.{}", span.index, ext);
            let outcome = engine
                .exec(&Self::time_args(span, source_name, &chunk_name))
                .await
                .map_err(|e| SegmentationError::cut_failed(span.index, e.to_string()))?;

            if !outcome.success() {
                // A failed cut can still leave a partial entry behind.
                let _ = engine.delete_file(&chunk_name).await;
                return Err(SegmentationError::cut_failed(
                    span.index,
                    format!(
                        "engine exited with code {}: {}",
                        outcome.exit_code,
                        outcome.log_tail(5)
                    ),
                ));
            }

            let payload = engine
                .read_file(&chunk_name)
                .await
                .map_err(|e| SegmentationError::cut_failed(span.index, e.to_string()))?;
            if let Err(e) = engine.delete_file(&chunk_name).await {
                warn!("[{}] Failed to delete {}: {}", engine.namespace(), chunk_name, e);
            }

            debug!(
                "Cut segment {} ({:.3}s + {:.3}s, {} bytes)",
                span.index,
                span.start_secs,
                span.duration_secs,
                payload.len()
            );
            segments.push(Segment::new(span, payload));
        }

        Ok(segments)
    }

    /// Cuts `source` into `plan.len()` contiguous, near-equal byte ranges.
    ///
    /// Every range holds at least one byte.
    pub fn split_by_bytes(
        source: &[u8],
        plan: &[SegmentSpan],
    ) -> Result<Vec<Segment>, SegmentationError> {
        if source.len() < plan.len() {
            return Err(SegmentationError::invalid_plan(format!(
                "{} byte(s) cannot fill {} segments",
                source.len(),
                plan.len()
            )));
        }

        let count = plan.len() as u128;
        let len = source.len() as u128;

        Ok(plan
            .iter()
            .enumerate()
            .map(|(i, span)| {
                let start = (len * i as u128 / count) as usize;
                let end = (len * (i as u128 + 1) / count) as usize;
                Segment::new(span, source[start..end].to_vec())
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{plan_segments, SegmentStatus};
    use crate::testing::MockEngine;

    #[test]
    fn test_strategy_selection() {
        assert_eq!(Segmenter::strategy_for("mp4"), SlicingStrategy::TimeBased);
        assert_eq!(Segmenter::strategy_for("mp3"), SlicingStrategy::TimeBased);
        assert_eq!(Segmenter::strategy_for("h264"), SlicingStrategy::ByteBased);
        assert_eq!(Segmenter::strategy_for("hevc"), SlicingStrategy::ByteBased);
        assert_eq!(Segmenter::strategy_for("unknown"), SlicingStrategy::TimeBased);
    }

    #[test]
    fn test_chunk_extension() {
        assert_eq!(Segmenter::chunk_extension("MOV"), "mov");
        assert_eq!(Segmenter::chunk_extension("mp4v"), "mp4");
        assert_eq!(Segmenter::chunk_extension("bin"), "mkv");
    }

    #[test]
    fn test_time_args() {
        let span = SegmentSpan {
            index: 2,
            start_secs: 10.0,
            duration_secs: 5.0,
        };
        let args = Segmenter::time_args(&span, "source.mp4", "chunk_2.mp4");
        assert_eq!(&args[..4], &["-ss", "10.000", "-t", "5.000"]);
        assert!(args.windows(2).any(|w| w[0] == "-c" && w[1] == "copy"));
        assert_eq!(args.last().unwrap(), "chunk_2.mp4");
    }

    #[test]
    fn test_split_by_bytes_covers_source() {
        let source: Vec<u8> = (0..=99).collect();
        let plan = plan_segments(32.0, 5.0).unwrap();
        let segments = Segmenter::split_by_bytes(&source, &plan).unwrap();

        assert_eq!(segments.len(), 7);
        let joined: Vec<u8> = segments.iter().flat_map(|s| s.payload.clone()).collect();
        assert_eq!(joined, source);
        assert!(segments.iter().all(|s| s.status == SegmentStatus::Pending));
    }

    #[tokio::test]
    async fn test_split_by_bytes_rejects_short_source() {
        let engine = MockEngine::new("main");
        let plan = plan_segments(30.0, 5.0).unwrap();

        let result = Segmenter.split(&engine, b"tiny", "h264", &plan).await;

        assert!(matches!(result, Err(SegmentationError::InvalidPlan { .. })));
        assert!(engine.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_by_time_cleans_namespace() {
        let engine = MockEngine::new("main");
        let plan = plan_segments(12.0, 5.0).unwrap();

        let segments = Segmenter
            .split(&engine, b"movie", "mp4", &plan)
            .await
            .unwrap();

        assert_eq!(segments.len(), 3);
        for (i, segment) in segments.iter().enumerate() {
            assert_eq!(segment.index, i);
            assert_eq!(segment.payload, format!("cut@{:.3}", i as f64 * 5.0).into_bytes());
        }
        assert!(engine.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_split_by_time_failure() {
        let engine = MockEngine::new("main");
        engine.fail_exec_matching("chunk_1.");
        let plan = plan_segments(12.0, 5.0).unwrap();

        let result = Segmenter.split(&engine, b"movie", "mp4", &plan).await;

        assert!(matches!(
            result,
            Err(SegmentationError::CutFailed { index: 1, .. })
        ));
        assert!(engine.list_files().await.unwrap().is_empty());
    }
}
