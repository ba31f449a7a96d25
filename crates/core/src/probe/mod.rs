//! Duration probing.
//!
//! The canonical prober reads the container-level duration with ffprobe.
//! [`EngineLogProber`] is kept as an alternative for setups without ffprobe.

mod config;
mod engine_log;
mod ffprobe;
mod traits;

use std::sync::Arc;

pub use config::{ProbeConfig, ProbeStrategy};
pub use engine_log::EngineLogProber;
pub use ffprobe::FfprobeProber;
pub use traits::{DurationProber, MediaMetadata, ProbeError, ProbeInput};

use crate::engine::{EngineConfig, EngineFactory};

/// Creates the prober selected by `config`.
pub fn create_prober(
    config: &ProbeConfig,
    engine_config: &EngineConfig,
    factory: Arc<dyn EngineFactory>,
) -> Arc<dyn DurationProber> {
    match config.strategy {
        ProbeStrategy::Metadata => Arc::new(FfprobeProber::new(engine_config)),
        ProbeStrategy::EngineLog => Arc::new(EngineLogProber::new(factory)),
    }
}
