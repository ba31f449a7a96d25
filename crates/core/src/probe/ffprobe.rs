//! Metadata prober backed by ffprobe.
//!
//! The container-level `format` section plays the role of the "general"
//! track: its `duration` is the total duration of the source.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::traits::{
    check_duration, source_extension, DurationProber, MediaMetadata, ProbeError, ProbeInput,
};
use crate::engine::{validate_name, EngineConfig};

/// Directory under the scope root holding scratch copies of the source.
const PROBE_DIR: &str = "probe";

/// Prober that inspects container structures with ffprobe.
///
/// The source is copied to `<work_dir>/<scope>/probe/`, the same tree an
/// [`FfmpegEngineFactory`](crate::engine::FfmpegEngineFactory) releases for
/// that scope.
pub struct FfprobeProber {
    ffprobe_path: PathBuf,
    work_dir: PathBuf,
    timeout_secs: u64,
}

impl FfprobeProber {
    /// Creates a prober from engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ffprobe_path: config.ffprobe_path.clone(),
            work_dir: config.work_dir.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    /// Directory holding scratch copies for `scope`.
    pub fn scratch_dir(&self, scope: &str) -> Result<PathBuf, ProbeError> {
        validate_name(scope)?;
        Ok(self.work_dir.join(scope).join(PROBE_DIR))
    }

    /// Parses ffprobe JSON output.
    pub(crate) fn parse_probe_output(output: &str) -> Result<MediaMetadata, ProbeError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: Option<ProbeFormat>,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: Option<String>,
            duration: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: Option<String>,
            codec_name: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| ProbeError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let format = probe.format.ok_or(ProbeError::NoGeneralTrack)?;
        let raw_duration = format
            .duration
            .ok_or_else(|| ProbeError::no_duration("general track has no duration field"))?;
        let duration_secs = raw_duration
            .trim()
            .parse::<f64>()
            .map_err(|_| ProbeError::no_duration(format!("unparsable duration {:?}", raw_duration)))?;

        let codec_of = |kind: &str| {
            probe
                .streams
                .iter()
                .find(|s| s.codec_type.as_deref() == Some(kind))
                .and_then(|s| s.codec_name.clone())
        };

        Ok(MediaMetadata {
            duration_secs: check_duration(duration_secs)?,
            container: format
                .format_name
                .as_deref()
                .and_then(|name| name.split(',').next())
                .map(str::to_string),
            audio_codec: codec_of("audio"),
            video_codec: codec_of("video"),
        })
    }
}

#[async_trait]
impl DurationProber for FfprobeProber {
    fn name(&self) -> &str {
        "ffprobe"
    }

    async fn probe(&self, input: ProbeInput<'_>) -> Result<MediaMetadata, ProbeError> {
        let scratch_dir = self.scratch_dir(input.scope)?;
        tokio::fs::create_dir_all(&scratch_dir).await?;
        let scratch = scratch_dir.join(format!(
            "probe-{}.{}",
            uuid::Uuid::new_v4(),
            source_extension(&input)
        ));
        tokio::fs::write(&scratch, input.bytes).await?;

        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.ffprobe_path)
                .args([
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                ])
                .arg(&scratch)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            warn!("Failed to remove probe scratch file {:?}: {}", scratch, e);
        }

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProbeError::tool_failed(format!(
                    "ffprobe not found at path: {}",
                    self.ffprobe_path.display()
                )))
            }
            Ok(Err(e)) => return Err(ProbeError::Io(e)),
            Err(_) => {
                return Err(ProbeError::tool_failed(format!(
                    "ffprobe timed out after {} seconds",
                    self.timeout_secs
                )))
            }
        };

        if !output.status.success() {
            return Err(ProbeError::tool_failed(format!(
                "ffprobe exited with code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let metadata = Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            "Probed {} ({}): {:.3}s",
            input.file_name, input.mime_type, metadata.duration_secs
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "probe.mkv",
                "format_name": "matroska,webm",
                "duration": "32.480000",
                "size": "5000000"
            },
            "streams": [
                { "codec_type": "video", "codec_name": "h264" },
                { "codec_type": "audio", "codec_name": "aac" }
            ]
        }"#;

        let info = FfprobeProber::parse_probe_output(json).unwrap();
        assert!((info.duration_secs - 32.48).abs() < 1e-9);
        assert_eq!(info.container, Some("matroska".to_string()));
        assert_eq!(info.video_codec, Some("h264".to_string()));
        assert_eq!(info.audio_codec, Some("aac".to_string()));
    }

    #[test]
    fn test_parse_probe_output_no_general_track() {
        let result = FfprobeProber::parse_probe_output(r#"{ "streams": [] }"#);
        assert!(matches!(result, Err(ProbeError::NoGeneralTrack)));
    }

    #[test]
    fn test_parse_probe_output_no_duration() {
        let json = r#"{ "format": { "format_name": "h264" }, "streams": [] }"#;
        let result = FfprobeProber::parse_probe_output(json);
        assert!(matches!(result, Err(ProbeError::NoDuration { .. })));

        let json = r#"{ "format": { "format_name": "h264", "duration": "N/A" } }"#;
        let result = FfprobeProber::parse_probe_output(json);
        assert!(matches!(result, Err(ProbeError::NoDuration { .. })));
    }

    #[test]
    fn test_parse_probe_output_zero_duration() {
        let json = r#"{ "format": { "format_name": "mp3", "duration": "0.000000" } }"#;
        let result = FfprobeProber::parse_probe_output(json);
        assert!(matches!(result, Err(ProbeError::NoDuration { .. })));
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        let result = FfprobeProber::parse_probe_output("not json");
        assert!(matches!(result, Err(ProbeError::ParseError { .. })));
    }

    #[test]
    fn test_scratch_dir_is_inside_scope() {
        let config = EngineConfig::default().with_work_dir(PathBuf::from("/tmp/segcast"));
        let prober = FfprobeProber::new(&config);

        assert_eq!(
            prober.scratch_dir("job-1").unwrap(),
            PathBuf::from("/tmp/segcast/job-1/probe")
        );
        assert!(matches!(
            prober.scratch_dir("../escape"),
            Err(ProbeError::Engine(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_probe_scratch_released_with_scope() {
        use crate::engine::{EngineFactory, FfmpegEngineFactory};
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let tool = dir.path().join("slow-ffprobe");
        {
            let mut file = std::fs::File::create(&tool).unwrap();
            file.write_all(b"#!/bin/sh\nsleep 30\n").unwrap();
            file.sync_all().unwrap();
        }
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let work_dir = dir.path().join("work");
        let mut config = EngineConfig::default().with_work_dir(work_dir.clone());
        config.ffprobe_path = tool;
        let prober = FfprobeProber::new(&config);

        let probe = prober.probe(ProbeInput {
            scope: "job-1",
            bytes: b"fake media",
            mime_type: "video/mp4",
            file_name: "clip.mp4",
        });
        let result = tokio::time::timeout(Duration::from_millis(300), probe).await;
        assert!(result.is_err());

        let scratch = std::fs::read_dir(work_dir.join("job-1").join(PROBE_DIR))
            .unwrap()
            .count();
        assert_eq!(scratch, 1);

        FfmpegEngineFactory::new(config)
            .release_scope("job-1")
            .await
            .unwrap();
        assert!(!work_dir.join("job-1").exists());
    }
}
