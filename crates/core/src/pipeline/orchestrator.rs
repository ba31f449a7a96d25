//! Job orchestrator: probe, segment, fan out, join.

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::reassembler::Reassembler;
use super::transcoder::SegmentTranscoder;
use super::types::{
    JobProgress, JobResult, MediaJob, SegmentError, SegmentFailureCause, StagedSegment,
};
use crate::codec::{mime_type, CodecCommand, CommandBuilder};
use crate::engine::{CodecEngine, EngineFactory};
use crate::pool::{PoolDrain, PoolError, PoolSlot, WorkerPool};
use crate::probe::{DurationProber, ProbeInput};
use crate::segment::{
    chunk_duration, plan_segments, Segment, SegmentBoard, SegmentStatus, Segmenter,
};

/// Namespace holding the source, the staged parts, and the manifest.
const MAIN_NAMESPACE: &str = "main";

/// Runs conversion jobs through the chunked pipeline.
///
/// Every job gets its own engine scope: one main namespace plus one
/// namespace per pool slot. The scope is released when the job settles,
/// whatever the outcome.
pub struct ChunkedTranscoder {
    config: PipelineConfig,
    builder: CommandBuilder,
    factory: Arc<dyn EngineFactory>,
    prober: Arc<dyn DurationProber>,
    progress_tx: Option<mpsc::Sender<JobProgress>>,
}

impl ChunkedTranscoder {
    /// Creates a new transcoder.
    pub fn new(
        config: PipelineConfig,
        factory: Arc<dyn EngineFactory>,
        prober: Arc<dyn DurationProber>,
    ) -> Self {
        Self {
            builder: CommandBuilder::new(config.mkv_audio),
            config,
            factory,
            prober,
            progress_tx: None,
        }
    }

    /// Sends progress updates for every job to `tx`.
    pub fn with_progress(mut self, tx: mpsc::Sender<JobProgress>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Returns the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs a job to completion.
    pub async fn run(&self, job: MediaJob) -> Result<JobResult, PipelineError> {
        let (_cancel_tx, cancel_rx) = broadcast::channel(1);
        self.run_until(job, cancel_rx).await
    }

    /// Runs a job until it settles or a message arrives on `cancel`.
    ///
    /// Cancellation is immediate: in-flight segment tasks are aborted, and
    /// once they have unwound the job's namespaces are released before
    /// [`PipelineError::Cancelled`] is returned.
    pub async fn run_until(
        &self,
        job: MediaJob,
        mut cancel: broadcast::Receiver<()>,
    ) -> Result<JobResult, PipelineError> {
        let started = Instant::now();
        info!(
            "[{}] Starting job: {} ({}) -> {} ({} bytes)",
            job.id,
            job.file_name,
            job.source_format,
            job.target_format,
            job.source_bytes.len()
        );

        let drain = Mutex::new(None);
        let result = tokio::select! {
            biased;
            _ = wait_for_cancel(&mut cancel) => {
                warn!("[{}] Job cancelled", job.id);
                Err(PipelineError::Cancelled)
            }
            result = self.execute(&job, started, &drain) => result,
        };

        // Aborted segment tasks may still hold engine entries until dropped.
        let pending = drain.lock().take();
        if let Some(drain) = pending {
            drain.wait().await;
        }

        if let Err(e) = self.factory.release_scope(&job.id).await {
            warn!("[{}] Failed to release job namespaces: {}", job.id, e);
        }

        match &result {
            Ok(output) => {
                info!(
                    "[{}] Job completed: {} ({} bytes, {} segments, {}ms)",
                    job.id,
                    output.output_name,
                    output.output_bytes.len(),
                    output.segment_count,
                    output.elapsed_ms
                );
                self.emit(JobProgress::Completed {
                    job_id: job.id.clone(),
                    output_name: output.output_name.clone(),
                    output_size: output.output_bytes.len(),
                    elapsed_ms: output.elapsed_ms,
                })
                .await;
            }
            Err(e) => {
                warn!("[{}] Job failed during {}: {}", job.id, e.phase(), e);
                self.emit(JobProgress::Failed {
                    job_id: job.id.clone(),
                    error: e.to_string(),
                    failed_phase: e.phase().to_string(),
                })
                .await;
            }
        }

        result
    }

    async fn execute(
        &self,
        job: &MediaJob,
        started: Instant,
        drain: &Mutex<Option<PoolDrain>>,
    ) -> Result<JobResult, PipelineError> {
        if job.source_bytes.is_empty() {
            return Err(PipelineError::invalid_job("source is empty"));
        }

        // Target validation happens before any engine work.
        let command = self.builder.build(&job.source_format, &job.target_format)?;
        debug!(
            "[{}] Strategy {:?} (stream copy: {})",
            job.id,
            command.strategy,
            command.is_stream_copy()
        );

        let metadata = self
            .prober
            .probe(ProbeInput {
                scope: &job.id,
                bytes: &job.source_bytes,
                mime_type: &job.mime_type,
                file_name: &job.file_name,
            })
            .await?;
        let duration_secs = metadata.duration_secs;
        info!(
            "[{}] Probed with {}: {:.3}s",
            job.id,
            self.prober.name(),
            duration_secs
        );
        self.emit(JobProgress::Probed {
            job_id: job.id.clone(),
            duration_secs,
        })
        .await;

        let chunk_secs = chunk_duration(
            duration_secs,
            self.config.chunk_secs,
            self.config.target_chunks,
        );
        let plan = plan_segments(duration_secs, chunk_secs)?;

        let main = self.factory.create(&job.id, MAIN_NAMESPACE).await?;
        let segments = Segmenter
            .split(main.as_ref(), &job.source_bytes, &job.source_format, &plan)
            .await?;
        let segment_count = segments.len();
        info!(
            "[{}] Cut into {} segment(s) of {:.3}s",
            job.id, segment_count, chunk_secs
        );
        self.emit(JobProgress::Segmented {
            job_id: job.id.clone(),
            segment_count,
            chunk_secs,
        })
        .await;

        let reassembler = Reassembler::new(&job.target_format);
        let board = Arc::new(SegmentBoard::new(&segments));
        let settled = self
            .transcode_all(job, &main, &reassembler, command, segments, &board, drain)
            .await?;

        // Any segment short of Done voids the job; the reassembler reports it.
        if board.all_done() {
            self.emit(JobProgress::Concatenating {
                job_id: job.id.clone(),
            })
            .await;
        }
        let output_bytes = reassembler.reassemble(main.as_ref(), settled).await?;

        Ok(JobResult {
            job_id: job.id.clone(),
            output_bytes,
            output_name: job.output_name(),
            mime_type: mime_type(&job.target_format).to_string(),
            segment_count,
            duration_secs,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Fans the segments out over a fresh pool and waits for every one.
    ///
    /// `board` ends with every entry settled to `Done` or `Failed`.
    #[allow(clippy::too_many_arguments)]
    async fn transcode_all(
        &self,
        job: &MediaJob,
        main: &Arc<dyn CodecEngine>,
        reassembler: &Reassembler,
        command: CodecCommand,
        segments: Vec<Segment>,
        board: &Arc<SegmentBoard>,
        drain: &Mutex<Option<PoolDrain>>,
    ) -> Result<Vec<Result<StagedSegment, SegmentError>>, PipelineError> {
        let workers = self.config.worker_count.clamp(1, segments.len().max(1));
        let mut engines = Vec::with_capacity(workers);
        for slot in 0..workers {
            engines.push(self.factory.create(&job.id, &format!("slot-{}", slot)).await?);
        }
        let pool = WorkerPool::new(engines).map_err(|e| PipelineError::invalid_job(e.to_string()))?;
        *drain.lock() = Some(pool.drain());

        let transcoder = SegmentTranscoder::new(command, &job.source_format, &job.target_format);
        let total = segments.len();
        let completed = Arc::new(AtomicUsize::new(0));

        let waits: Vec<_> = segments
            .into_iter()
            .map(|segment| {
                let index = segment.index;
                let transcoder = transcoder.clone();
                let main = Arc::clone(main);
                let part_name = reassembler.part_name(index);
                let task_board = Arc::clone(board);
                let handle = pool.submit(move |slot| {
                    task_board.set(index, SegmentStatus::Transcoding);
                    transcode_and_stage(transcoder, slot, main, segment, part_name)
                });

                let board = Arc::clone(board);
                let progress_tx = self.progress_tx.clone();
                let job_id = job.id.clone();
                let completed = Arc::clone(&completed);
                async move {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(PoolError::TaskPanicked(msg)) => {
                            Err(SegmentError::new(index, SegmentFailureCause::Panicked(msg)))
                        }
                        Err(_) => Err(SegmentError::new(index, SegmentFailureCause::Terminated)),
                    };
                    board.set(
                        index,
                        if result.is_ok() {
                            SegmentStatus::Done
                        } else {
                            SegmentStatus::Failed
                        },
                    );

                    if let Some(tx) = progress_tx {
                        let event = match &result {
                            Ok(_) => JobProgress::SegmentDone {
                                job_id,
                                index,
                                completed: completed.fetch_add(1, Ordering::Relaxed) + 1,
                                total,
                            },
                            Err(e) => JobProgress::SegmentFailed {
                                job_id,
                                index,
                                error: e.cause.to_string(),
                            },
                        };
                        let _ = tx.send(event).await;
                    }
                    result
                }
            })
            .collect();

        let status = pool.status();
        debug!(
            "[{}] Submitted {} segment(s) to {} slot(s), {} queued",
            job.id, total, status.slots, status.queued
        );

        let settled = join_all(waits).await;

        let status = pool.status();
        info!(
            "[{}] All segments settled: {} ok, {} failed (peak concurrency {})",
            job.id,
            board.count(SegmentStatus::Done),
            board.count(SegmentStatus::Failed),
            status.peak_active
        );

        Ok(settled)
    }

    async fn emit(&self, event: JobProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Pool task body: transcode on the slot, then stage the output in `main`.
async fn transcode_and_stage(
    transcoder: SegmentTranscoder,
    slot: PoolSlot,
    main: Arc<dyn CodecEngine>,
    segment: Segment,
    part_name: String,
) -> Result<StagedSegment, SegmentError> {
    let transcoded = transcoder.run(slot.engine.as_ref(), segment).await?;
    main.write_file(&part_name, &transcoded.output_bytes)
        .await
        .map_err(|e| SegmentError::new(transcoded.index, e.into()))?;

    Ok(StagedSegment {
        index: transcoded.index,
        name: part_name,
    })
}

/// Resolves on a cancel message; never resolves once every sender is gone.
async fn wait_for_cancel(rx: &mut broadcast::Receiver<()>) {
    match rx.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => {}
        Err(RecvError::Closed) => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockEngineFactory, MockProber};

    fn transcoder(factory: &Arc<MockEngineFactory>, duration: f64) -> ChunkedTranscoder {
        ChunkedTranscoder::new(
            PipelineConfig::default(),
            factory.clone(),
            Arc::new(MockProber::new(duration)),
        )
    }

    #[tokio::test]
    async fn test_run_produces_ordered_output() {
        let factory = Arc::new(MockEngineFactory::new());
        let job = MediaJob::new(b"source".to_vec(), "clip.mp4", "video/mp4", "webm");
        let job_id = job.id.clone();

        let result = transcoder(&factory, 12.0).run(job).await.unwrap();

        assert_eq!(result.job_id, job_id);
        assert_eq!(result.segment_count, 3);
        assert_eq!(result.output_name, "clip.webm");
        assert_eq!(result.mime_type, "video/webm");
        assert_eq!(result.output_bytes, b"<cut@0.000><cut@5.000><cut@10.000>");
        assert!(factory.live_scopes().is_empty());
        assert_eq!(
            factory.namespaces(&job_id),
            vec!["main", "slot-0", "slot-1", "slot-2"]
        );
    }

    #[tokio::test]
    async fn test_slots_capped_by_segment_count() {
        let factory = Arc::new(MockEngineFactory::new());
        let job = MediaJob::new(b"source".to_vec(), "song.mp3", "audio/mpeg", "wav");
        let job_id = job.id.clone();

        let result = transcoder(&factory, 4.0).run(job).await.unwrap();

        assert_eq!(result.segment_count, 1);
        assert_eq!(factory.namespaces(&job_id), vec!["main", "slot-0"]);
    }

    #[tokio::test]
    async fn test_empty_source_rejected() {
        let factory = Arc::new(MockEngineFactory::new());
        let job = MediaJob::new(Vec::new(), "clip.mp4", "video/mp4", "webm");

        let err = transcoder(&factory, 12.0).run(job).await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidJob { .. }));
        assert!(factory.recorded_execs().is_empty());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let factory = Arc::new(MockEngineFactory::new());
        let (tx, mut rx) = mpsc::channel(64);
        let transcoder = transcoder(&factory, 10.0).with_progress(tx);
        let job = MediaJob::new(b"source".to_vec(), "clip.mkv", "video/x-matroska", "mp4");

        transcoder.run(job).await.unwrap();
        drop(transcoder);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(JobProgress::Probed { .. })));
        assert!(matches!(events.last(), Some(JobProgress::Completed { .. })));
        let done = events
            .iter()
            .filter(|e| matches!(e, JobProgress::SegmentDone { .. }))
            .count();
        assert_eq!(done, 2);
    }

    #[tokio::test]
    async fn test_board_settles_mixed_outcomes() {
        let factory = Arc::new(MockEngineFactory::new());
        factory.fail_exec_matching("seg_1_");
        let transcoder = transcoder(&factory, 15.0);
        let job = MediaJob::new(b"source".to_vec(), "clip.mp4", "video/mp4", "webm");

        let main = factory.create(&job.id, MAIN_NAMESPACE).await.unwrap();
        let plan = plan_segments(15.0, 5.0).unwrap();
        let segments = Segmenter
            .split(main.as_ref(), &job.source_bytes, &job.source_format, &plan)
            .await
            .unwrap();
        let board = Arc::new(SegmentBoard::new(&segments));
        assert_eq!(board.snapshot(), vec![SegmentStatus::Pending; 3]);

        let command = transcoder.builder.build("mp4", "webm").unwrap();
        let reassembler = Reassembler::new("webm");
        let drain = Mutex::new(None);
        let settled = transcoder
            .transcode_all(&job, &main, &reassembler, command, segments, &board, &drain)
            .await
            .unwrap();

        assert_eq!(
            board.snapshot(),
            vec![SegmentStatus::Done, SegmentStatus::Failed, SegmentStatus::Done]
        );
        assert!(!board.all_done());
        assert!(settled[0].is_ok());
        assert_eq!(settled[1].as_ref().unwrap_err().index, 1);
        assert!(drain.lock().is_some());
    }

    #[tokio::test]
    async fn test_failed_job_skips_concatenating_event() {
        let factory = Arc::new(MockEngineFactory::new());
        factory.fail_exec_matching("seg_0_");
        let (tx, mut rx) = mpsc::channel(64);
        let transcoder = transcoder(&factory, 10.0).with_progress(tx);
        let job = MediaJob::new(b"source".to_vec(), "clip.mp4", "video/mp4", "webm");

        transcoder.run(job).await.unwrap_err();
        drop(transcoder);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(events
            .iter()
            .any(|e| matches!(e, JobProgress::SegmentFailed { index: 0, .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e, JobProgress::Concatenating { .. })));
        assert!(matches!(events.last(), Some(JobProgress::Failed { .. })));
    }
}
