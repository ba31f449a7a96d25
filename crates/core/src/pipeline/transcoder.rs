//! Segment task body, run inside a pool slot.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{SegmentError, SegmentFailureCause, TranscodedSegment};
use crate::codec::{output_extension, CodecCommand};
use crate::engine::{CodecEngine, EngineError};
use crate::pool::panic_message;
use crate::segment::{Segment, Segmenter};

/// Log lines kept in an [`SegmentFailureCause::EngineExit`].
const LOG_TAIL_LINES: usize = 8;

/// Transcodes single segments with a fixed command.
///
/// Input and output entries are task-scoped and removed on every exit path,
/// including a panic in the engine call. An aborted task leaves its entries
/// to the job scope release.
#[derive(Debug, Clone)]
pub struct SegmentTranscoder {
    command: Arc<CodecCommand>,
    input_ext: String,
    output_ext: String,
}

impl SegmentTranscoder {
    /// Creates a transcoder for segments cut from `source_format`.
    pub fn new(command: CodecCommand, source_format: &str, target_format: &str) -> Self {
        Self {
            command: Arc::new(command),
            input_ext: Segmenter::chunk_extension(source_format),
            output_ext: output_extension(target_format),
        }
    }

    /// The command applied to every segment.
    pub fn command(&self) -> &CodecCommand {
        &self.command
    }

    /// Input entry name for segment `index`.
    pub fn input_name(&self, index: usize) -> String {
        format!("seg_{}_in.{}", index, self.input_ext)
    }

    /// Output entry name for segment `index`.
    pub fn output_name(&self, index: usize) -> String {
        format!("seg_{}_out.{}", index, self.output_ext)
    }

    /// Runs one segment through `engine`.
    pub async fn run(
        &self,
        engine: &dyn CodecEngine,
        segment: Segment,
    ) -> Result<TranscodedSegment, SegmentError> {
        let index = segment.index;
        let input = self.input_name(index);
        let output = self.output_name(index);

        let attempt = AssertUnwindSafe(self.transcode(engine, &segment, &input, &output))
            .catch_unwind()
            .await;

        Self::remove_entry(engine, &input).await;
        Self::remove_entry(engine, &output).await;

        let result = attempt.unwrap_or_else(|payload| {
            Err(SegmentFailureCause::Panicked(panic_message(payload)))
        });

        match result {
            Ok(output_bytes) => {
                debug!(
                    "[{}] Segment {} transcoded ({} -> {} bytes)",
                    engine.namespace(),
                    index,
                    segment.payload.len(),
                    output_bytes.len()
                );
                Ok(TranscodedSegment {
                    index,
                    output_bytes,
                })
            }
            Err(cause) => {
                warn!("[{}] Segment {} failed: {}", engine.namespace(), index, cause);
                Err(SegmentError::new(index, cause))
            }
        }
    }

    async fn transcode(
        &self,
        engine: &dyn CodecEngine,
        segment: &Segment,
        input: &str,
        output: &str,
    ) -> Result<Vec<u8>, SegmentFailureCause> {
        engine.write_file(input, &segment.payload).await?;

        let outcome = engine.exec(&self.command.to_args(input, output)).await?;
        if !outcome.success() {
            return Err(SegmentFailureCause::EngineExit {
                code: outcome.exit_code,
                log_tail: outcome.log_tail(LOG_TAIL_LINES),
            });
        }

        Ok(engine.read_file(output).await?)
    }

    async fn remove_entry(engine: &dyn CodecEngine, name: &str) {
        match engine.delete_file(name).await {
            Ok(()) | Err(EngineError::FileNotFound { .. }) => {}
            Err(e) => warn!("[{}] Failed to delete {}: {}", engine.namespace(), name, e),
        }
    }
}
