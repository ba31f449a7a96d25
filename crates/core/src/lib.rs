pub mod codec;
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod pool;
pub mod probe;
pub mod segment;
pub mod testing;

pub use codec::{CodecCommand, CodecError, CodecGroup, CommandBuilder, MkvAudio};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError,
};
pub use engine::{
    CodecEngine, EngineConfig, EngineError, EngineFactory, ExecOutcome, FfmpegEngine,
    FfmpegEngineFactory,
};
pub use pipeline::{
    ChunkedTranscoder, JobProgress, JobResult, MediaJob, PipelineConfig, PipelineError,
    SegmentError, SegmentFailureCause,
};
pub use pool::{PoolDrain, PoolError, PoolSlot, PoolStatus, TaskHandle, WorkerPool};
pub use probe::{
    create_prober, DurationProber, EngineLogProber, FfprobeProber, MediaMetadata, ProbeConfig,
    ProbeError, ProbeInput, ProbeStrategy,
};
pub use segment::{plan_segments, Segment, SegmentBoard, SegmentSpan, SegmentStatus, Segmenter};
