use super::{types::Config, ConfigError};

/// Upper bound on pool slots per job.
pub const MAX_WORKERS: usize = 64;

/// Validate configuration
/// Currently validates:
/// - pipeline.worker_count is in 1..=MAX_WORKERS
/// - pipeline.chunk_secs is finite and positive
/// - pipeline.target_chunks, when set, is not 0
/// - engine.timeout_secs is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;

    if pipeline.worker_count == 0 || pipeline.worker_count > MAX_WORKERS {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.worker_count must be between 1 and {}, got {}",
            MAX_WORKERS, pipeline.worker_count
        )));
    }

    if !pipeline.chunk_secs.is_finite() || pipeline.chunk_secs <= 0.0 {
        return Err(ConfigError::ValidationError(format!(
            "pipeline.chunk_secs must be a positive number, got {}",
            pipeline.chunk_secs
        )));
    }

    if pipeline.target_chunks == Some(0) {
        return Err(ConfigError::ValidationError(
            "pipeline.target_chunks cannot be 0".to_string(),
        ));
    }

    if config.engine.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_worker_bounds() {
        let mut config = Config::default();
        config.pipeline.worker_count = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        config.pipeline.worker_count = MAX_WORKERS + 1;
        assert!(validate_config(&config).is_err());

        config.pipeline.worker_count = MAX_WORKERS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_chunk_secs() {
        let mut config = Config::default();
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            config.pipeline.chunk_secs = bad;
            assert!(validate_config(&config).is_err(), "accepted {}", bad);
        }
    }

    #[test]
    fn test_validate_target_chunks_zero_fails() {
        let mut config = Config::default();
        config.pipeline.target_chunks = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_timeout_zero_fails() {
        let mut config = Config::default();
        config.engine.timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
