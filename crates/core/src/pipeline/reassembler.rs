//! Joins staged segment outputs into the final file.

use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::types::{SegmentError, StagedSegment};
use crate::codec::output_extension;
use crate::engine::{CodecEngine, EngineError};

/// Manifest entry name in the main namespace.
pub const MANIFEST_NAME: &str = "concat_list.txt";

const LOG_TAIL_LINES: usize = 8;

/// Fail-fast reassembly over the settled results of one job.
#[derive(Debug, Clone)]
pub struct Reassembler {
    output_ext: String,
}

impl Reassembler {
    /// Creates a reassembler producing `target_format` output.
    pub fn new(target_format: &str) -> Self {
        Self {
            output_ext: output_extension(target_format),
        }
    }

    /// Main-namespace name of the staged output of segment `index`.
    pub fn part_name(&self, index: usize) -> String {
        format!("part_{}.{}", index, self.output_ext)
    }

    /// Main-namespace name of the joined output.
    pub fn output_name(&self) -> String {
        format!("joined.{}", self.output_ext)
    }

    /// Quotes an entry for the concat demuxer.
    pub fn escape_entry(name: &str) -> String {
        format!("'{}'", name.replace('\'', "'\\''"))
    }

    /// Manifest listing `names` in the given order.
    pub fn build_manifest<S: AsRef<str>>(names: &[S]) -> String {
        names
            .iter()
            .map(|name| format!("file {}\n", Self::escape_entry(name.as_ref())))
            .collect()
    }

    /// Stream-copy concat arguments.
    pub fn concat_args(manifest: &str, output: &str) -> Vec<String> {
        ["-f", "concat", "-safe", "0", "-i", manifest, "-c", "copy", output]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Produces the output bytes from every segment's settled result.
    ///
    /// Any failed segment voids the job: staged parts are deleted and no
    /// manifest is written. Otherwise parts are joined in index order,
    /// whatever order they settled in. Parts, manifest, and joined output
    /// are removed before returning.
    pub async fn reassemble(
        &self,
        engine: &dyn CodecEngine,
        settled: Vec<Result<StagedSegment, SegmentError>>,
    ) -> Result<Vec<u8>, PipelineError> {
        let mut staged = Vec::with_capacity(settled.len());
        let mut first_failure: Option<SegmentError> = None;

        for result in settled {
            match result {
                Ok(part) => staged.push(part),
                Err(e) => {
                    if first_failure.as_ref().map_or(true, |f| e.index < f.index) {
                        first_failure = Some(e);
                    }
                }
            }
        }

        if let Some(failure) = first_failure {
            info!(
                "[{}] Segment {} failed; discarding {} staged part(s)",
                engine.namespace(),
                failure.index,
                staged.len()
            );
            self.discard(engine, &staged).await;
            return Err(failure.into());
        }

        staged.sort_by_key(|part| part.index);
        let result = self.concat(engine, &staged).await;
        self.discard(engine, &staged).await;
        result
    }

    async fn concat(
        &self,
        engine: &dyn CodecEngine,
        staged: &[StagedSegment],
    ) -> Result<Vec<u8>, PipelineError> {
        if staged.is_empty() {
            return Err(PipelineError::concat_failure("no segments to join"));
        }
        if let Some((position, part)) = staged
            .iter()
            .enumerate()
            .find(|(position, part)| part.index != *position)
        {
            return Err(PipelineError::concat_failure(format!(
                "segment {} missing (found segment {} in its place)",
                position, part.index
            )));
        }

        let names: Vec<&str> = staged.iter().map(|part| part.name.as_str()).collect();
        let output = self.output_name();

        engine
            .write_file(MANIFEST_NAME, Self::build_manifest(&names).as_bytes())
            .await
            .map_err(|e| PipelineError::concat_failure(format!("writing manifest: {}", e)))?;

        let joined = self.run_concat(engine, &output).await;

        remove_entry(engine, MANIFEST_NAME).await;
        remove_entry(engine, &output).await;

        let bytes = joined?;
        debug!(
            "[{}] Joined {} part(s) into {} bytes",
            engine.namespace(),
            staged.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    async fn run_concat(
        &self,
        engine: &dyn CodecEngine,
        output: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let outcome = engine
            .exec(&Self::concat_args(MANIFEST_NAME, output))
            .await
            .map_err(|e| PipelineError::concat_failure(e.to_string()))?;

        if !outcome.success() {
            return Err(PipelineError::concat_failure(format!(
                "engine exited with code {}: {}",
                outcome.exit_code,
                outcome.log_tail(LOG_TAIL_LINES)
            )));
        }

        engine
            .read_file(output)
            .await
            .map_err(|e| PipelineError::concat_failure(e.to_string()))
    }

    async fn discard(&self, engine: &dyn CodecEngine, staged: &[StagedSegment]) {
        for part in staged {
            remove_entry(engine, &part.name).await;
        }
    }
}

async fn remove_entry(engine: &dyn CodecEngine, name: &str) {
    match engine.delete_file(name).await {
        Ok(()) | Err(EngineError::FileNotFound { .. }) => {}
        Err(e) => warn!("[{}] Failed to delete {}: {}", engine.namespace(), name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::SegmentFailureCause;
    use crate::testing::MockEngine;

    async fn stage(engine: &MockEngine, reassembler: &Reassembler, index: usize) -> StagedSegment {
        let name = reassembler.part_name(index);
        engine
            .write_file(&name, format!("[{}]", index).as_bytes())
            .await
            .unwrap();
        StagedSegment { index, name }
    }

    #[test]
    fn test_manifest_escapes_quotes() {
        let manifest = Reassembler::build_manifest(&["part_0.mp4", "it's.mp4"]);
        assert_eq!(manifest, "file 'part_0.mp4'\nfile 'it'\\''s.mp4'\n");
    }

    #[test]
    fn test_concat_args() {
        let args = Reassembler::concat_args(MANIFEST_NAME, "joined.mp4");
        assert_eq!(
            args,
            vec!["-f", "concat", "-safe", "0", "-i", "concat_list.txt", "-c", "copy", "joined.mp4"]
        );
    }

    #[tokio::test]
    async fn test_joins_in_index_order() {
        let engine = MockEngine::new("main");
        let reassembler = Reassembler::new("mp4");

        // Settled out of order.
        let mut settled = Vec::new();
        for index in [2, 0, 3, 1] {
            settled.push(Ok(stage(&engine, &reassembler, index).await));
        }

        let bytes = reassembler.reassemble(&engine, settled).await.unwrap();

        assert_eq!(bytes, b"[0][1][2][3]");
        assert!(engine.files().is_empty());
        assert_eq!(engine.exec_count_matching(MANIFEST_NAME), 1);
    }

    #[tokio::test]
    async fn test_failure_discards_parts_without_concat() {
        let engine = MockEngine::new("main");
        let reassembler = Reassembler::new("mp4");

        let mut settled = Vec::new();
        for index in 0..6 {
            if index == 3 || index == 5 {
                settled.push(Err(SegmentError::new(
                    index,
                    SegmentFailureCause::Panicked("boom".to_string()),
                )));
            } else {
                settled.push(Ok(stage(&engine, &reassembler, index).await));
            }
        }
        settled.reverse();

        let err = reassembler.reassemble(&engine, settled).await.unwrap_err();

        assert!(matches!(err, PipelineError::SegmentFailure { index: 3, .. }));
        assert!(engine.files().is_empty());
        assert!(engine.recorded_execs().iter().all(|e| !e.is_concat()));
    }

    #[tokio::test]
    async fn test_concat_failure_is_distinct() {
        let engine = MockEngine::new("main");
        engine.fail_exec_matching(MANIFEST_NAME);
        let reassembler = Reassembler::new("mkv");

        let settled = vec![
            Ok(stage(&engine, &reassembler, 0).await),
            Ok(stage(&engine, &reassembler, 1).await),
        ];

        let err = reassembler.reassemble(&engine, settled).await.unwrap_err();

        assert!(matches!(err, PipelineError::ConcatFailure { .. }));
        assert!(engine.files().is_empty());
    }

    #[tokio::test]
    async fn test_gap_in_indices_rejected() {
        let engine = MockEngine::new("main");
        let reassembler = Reassembler::new("mp4");

        let settled = vec![
            Ok(stage(&engine, &reassembler, 0).await),
            Ok(stage(&engine, &reassembler, 2).await),
        ];

        let err = reassembler.reassemble(&engine, settled).await.unwrap_err();

        assert!(matches!(err, PipelineError::ConcatFailure { .. }));
        assert!(engine.files().is_empty());
        assert_eq!(engine.recorded_execs().len(), 0);
    }
}
