use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Environment prefix; nested keys are split on `__` (`SEGCAST_PIPELINE__WORKER_COUNT`).
const ENV_PREFIX: &str = "SEGCAST_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from file if it exists, defaults otherwise.
/// Environment overrides apply either way.
pub fn load_config_or_default(path: &Path) -> Result<Config, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MkvAudio;
    use crate::probe::ProbeStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
timeout_secs = 120

[pipeline]
worker_count = 4
chunk_secs = 2.5
mkv_audio = "mp3"

[probe]
strategy = "engine_log"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.engine.timeout_secs, 120);
        assert_eq!(config.engine.ffmpeg_path.to_str(), Some("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.pipeline.worker_count, 4);
        assert_eq!(config.pipeline.chunk_secs, 2.5);
        assert_eq!(config.pipeline.mkv_audio, MkvAudio::Mp3);
        assert_eq!(config.probe.strategy, ProbeStrategy::EngineLog);
    }

    #[test]
    fn test_load_config_from_str_bad_strategy() {
        let toml = r#"
[probe]
strategy = "guess"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/segcast.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_or_default_missing_file() {
        let config = load_config_or_default(Path::new("/nonexistent/segcast.toml")).unwrap();
        assert_eq!(config.pipeline.chunk_secs, 5.0);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[pipeline]
worker_count = 2
target_chunks = 8
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.worker_count, 2);
        assert_eq!(config.pipeline.target_chunks, Some(8));
        assert_eq!(config.engine.log_level, "info");
    }
}
