use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::pipeline::PipelineConfig;
use crate::probe::ProbeConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStrategy;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.pipeline.worker_count, 3);
        assert_eq!(config.pipeline.chunk_secs, 5.0);
        assert_eq!(config.probe.strategy, ProbeStrategy::Metadata);
        assert_eq!(config.engine.timeout_secs, 600);
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let mut config = Config::default();
        config.pipeline.target_chunks = Some(6);
        config.probe.strategy = ProbeStrategy::EngineLog;

        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();

        assert_eq!(parsed.pipeline.target_chunks, Some(6));
        assert_eq!(parsed.probe.strategy, ProbeStrategy::EngineLog);
        assert_eq!(parsed.engine.work_dir, config.engine.work_dir);
    }
}
