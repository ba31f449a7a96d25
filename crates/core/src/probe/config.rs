//! Configuration for duration probing.

use serde::{Deserialize, Serialize};

/// Which prober a job uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStrategy {
    /// Inspect container metadata with ffprobe
    #[default]
    Metadata,
    /// Scrape the engine's log after a null-output run
    EngineLog,
}

/// Probe configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probing strategy.
    #[serde(default)]
    pub strategy: ProbeStrategy,
}
