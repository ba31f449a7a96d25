//! Prober that scrapes the engine's diagnostic log.
//!
//! Runs a throwaway null-output invocation and reads the
//! `Duration: HH:MM:SS.fraction` line the engine prints for its input.

use async_trait::async_trait;
use regex_lite::Regex;
use std::sync::{Arc, LazyLock};
use tracing::warn;

use super::traits::{
    check_duration, source_extension, DurationProber, MediaMetadata, ProbeError, ProbeInput,
};
use crate::engine::{CodecEngine, EngineError, EngineFactory};

/// Namespace the prober stages its input in, inside the caller's scope.
const PROBE_NAMESPACE: &str = "probe";

static DURATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duration: (\d{2,}):(\d{2}):(\d{2})(?:\.(\d+))?")
        .expect("duration pattern is valid")
});

/// Prober that parses the duration from an engine log.
pub struct EngineLogProber {
    factory: Arc<dyn EngineFactory>,
}

impl EngineLogProber {
    /// Creates a prober that runs its invocations through `factory`.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self { factory }
    }

    /// Extracts the first `Duration:` value from an engine log, in seconds.
    pub fn parse_duration(log: &str) -> Option<f64> {
        let caps = DURATION_LINE.captures(log)?;

        let hours = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let minutes = caps.get(2)?.as_str().parse::<f64>().ok()?;
        let seconds = caps.get(3)?.as_str().parse::<f64>().ok()?;
        let fraction = caps
            .get(4)
            .and_then(|m| format!("0.{}", m.as_str()).parse::<f64>().ok())
            .unwrap_or(0.0);

        Some(hours * 3600.0 + minutes * 60.0 + seconds + fraction)
    }

    async fn run_null_output(
        engine: &dyn CodecEngine,
        name: &str,
        input: &ProbeInput<'_>,
    ) -> Result<MediaMetadata, ProbeError> {
        engine.write_file(name, input.bytes).await?;

        let args: Vec<String> = ["-loglevel", "info", "-i", name, "-f", "null", "-"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcome = engine.exec(&args).await?;

        if !outcome.success() {
            return Err(ProbeError::tool_failed(format!(
                "null-output probe exited with code {}: {}",
                outcome.exit_code,
                outcome.log_tail(5)
            )));
        }

        let duration = Self::parse_duration(&outcome.log)
            .ok_or_else(|| ProbeError::no_duration("no Duration line in engine log"))?;
        Ok(MediaMetadata::with_duration(check_duration(duration)?))
    }
}

#[async_trait]
impl DurationProber for EngineLogProber {
    fn name(&self) -> &str {
        "engine_log"
    }

    /// Stages the source in the `probe` namespace of `input.scope`.
    ///
    /// The staged entry is deleted when the call returns. If the call is
    /// dropped first, the entry goes away with the caller's scope.
    async fn probe(&self, input: ProbeInput<'_>) -> Result<MediaMetadata, ProbeError> {
        let engine = self.factory.create(input.scope, PROBE_NAMESPACE).await?;
        let name = format!("probe_input_{}.{}", uuid::Uuid::new_v4(), source_extension(&input));
        let result = Self::run_null_output(engine.as_ref(), &name, &input).await;

        match engine.delete_file(&name).await {
            Ok(()) | Err(EngineError::FileNotFound { .. }) => {}
            Err(e) => warn!("[{}] Failed to delete {}: {}", engine.namespace(), name, e),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngineFactory;

    #[test]
    fn test_parse_duration_with_fraction() {
        let log = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'probe_input.mp4':\n  Duration: 00:01:02.50, start: 0.000000, bitrate: 1205 kb/s";
        let duration = EngineLogProber::parse_duration(log).unwrap();
        assert!((duration - 62.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_duration_hours() {
        let duration = EngineLogProber::parse_duration("Duration: 01:00:00.04,").unwrap();
        assert!((duration - 3600.04).abs() < 1e-9);
    }

    #[test]
    fn test_parse_duration_missing() {
        assert!(EngineLogProber::parse_duration("Duration: N/A, bitrate: N/A").is_none());
        assert!(EngineLogProber::parse_duration("").is_none());
    }

    fn input(scope: &str) -> ProbeInput<'_> {
        ProbeInput {
            scope,
            bytes: b"fake media",
            mime_type: "video/mp4",
            file_name: "clip.mp4",
        }
    }

    #[tokio::test]
    async fn test_probe_through_engine() {
        let factory = Arc::new(MockEngineFactory::new());
        factory.set_probe_duration(32.0);
        let prober = EngineLogProber::new(factory.clone());

        let metadata = prober.probe(input("job-1")).await.unwrap();

        assert!((metadata.duration_secs - 32.0).abs() < 1e-9);
        assert_eq!(factory.namespaces("job-1"), vec!["probe"]);
        let engine = factory.engine("job-1", "probe").unwrap();
        assert!(engine.files().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_removes_staged_input() {
        let factory = Arc::new(MockEngineFactory::new());
        factory.fail_exec_matching("probe_input");
        let prober = EngineLogProber::new(factory.clone());

        let result = prober.probe(input("job-2")).await;

        assert!(matches!(result, Err(ProbeError::ToolFailed { .. })));
        let engine = factory.engine("job-2", "probe").unwrap();
        assert!(engine.files().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_probe_stays_inside_scope() {
        let factory = Arc::new(MockEngineFactory::new());
        factory.delay_exec_matching("probe_input", std::time::Duration::from_secs(3600));
        let prober = EngineLogProber::new(factory.clone());

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            prober.probe(input("job-3")),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(factory.live_scopes(), vec!["job-3"]);
        factory.release_scope("job-3").await.unwrap();
        assert!(factory.live_scopes().is_empty());
    }
}
