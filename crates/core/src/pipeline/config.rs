//! Configuration for the pipeline module.

use serde::{Deserialize, Serialize};

use crate::codec::MkvAudio;

/// Configuration for chunked transcoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of pool slots (engine instances) per job.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Segment length in seconds.
    #[serde(default = "default_chunk_secs")]
    pub chunk_secs: f64,

    /// When set, the segment length is the duration divided by this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_chunks: Option<u32>,

    /// Audio codec used when re-encoding into Matroska.
    #[serde(default)]
    pub mkv_audio: MkvAudio,
}

fn default_worker_count() -> usize {
    3
}

fn default_chunk_secs() -> f64 {
    5.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            chunk_secs: default_chunk_secs(),
            target_chunks: None,
            mkv_audio: MkvAudio::default(),
        }
    }
}

impl PipelineConfig {
    /// Sets the number of pool slots.
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Sets a fixed segment length.
    pub fn with_chunk_secs(mut self, chunk_secs: f64) -> Self {
        self.chunk_secs = chunk_secs;
        self.target_chunks = None;
        self
    }

    /// Derives the segment length from a target segment count.
    pub fn with_target_chunks(mut self, target_chunks: u32) -> Self {
        self.target_chunks = Some(target_chunks);
        self
    }

    /// Sets the Matroska audio codec.
    pub fn with_mkv_audio(mut self, mkv_audio: MkvAudio) -> Self {
        self.mkv_audio = mkv_audio;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.chunk_secs, 5.0);
        assert!(config.target_chunks.is_none());
        assert_eq!(config.mkv_audio, MkvAudio::Aac);
    }

    #[test]
    fn test_builder_pattern() {
        let config = PipelineConfig::default()
            .with_target_chunks(8)
            .with_workers(5)
            .with_mkv_audio(MkvAudio::Mp3);

        assert_eq!(config.worker_count, 5);
        assert_eq!(config.target_chunks, Some(8));
        assert_eq!(config.mkv_audio, MkvAudio::Mp3);

        let config = config.with_chunk_secs(2.5);
        assert_eq!(config.chunk_secs, 2.5);
        assert!(config.target_chunks.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PipelineConfig = toml::from_str("worker_count = 4\nmkv_audio = \"mp3\"").unwrap();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.chunk_secs, 5.0);
        assert_eq!(config.mkv_audio, MkvAudio::Mp3);
    }
}
