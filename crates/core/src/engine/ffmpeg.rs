//! FFmpeg-backed engine implementation.
//!
//! Each instance owns a private directory; virtual file names map to flat
//! entries inside it and every invocation runs with that directory as its
//! working directory.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::{validate_name, CodecEngine, EngineFactory, ExecOutcome};

/// Scope removal attempts before the error is reported.
const RELEASE_ATTEMPTS: u32 = 3;
const RELEASE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// A codec engine instance backed by the ffmpeg binary.
pub struct FfmpegEngine {
    config: Arc<EngineConfig>,
    namespace: String,
    root: PathBuf,
}

impl FfmpegEngine {
    /// Creates an engine rooted at `root`, creating the directory.
    pub async fn open(
        config: Arc<EngineConfig>,
        namespace: impl Into<String>,
        root: PathBuf,
    ) -> Result<Self, EngineError> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            config,
            namespace: namespace.into(),
            root,
        })
    }

    /// Directory backing this namespace.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    fn build_args(&self, args: &[String]) -> Vec<String> {
        let mut full = vec![
            "-nostdin".to_string(),
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ];
        full.extend(self.config.extra_args.iter().cloned());
        full.extend(args.iter().cloned());
        full
    }
}

fn map_not_found(e: std::io::Error, name: &str) -> EngineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EngineError::file_not_found(name)
    } else {
        EngineError::Io(e)
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::read(path)
            .await
            .map_err(|e| map_not_found(e, name))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.entry_path(name)?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| map_not_found(e, name))
    }

    async fn list_files(&self) -> Result<Vec<String>, EngineError> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn exec(&self, args: &[String]) -> Result<ExecOutcome, EngineError> {
        let args = self.build_args(args);
        debug!("[{}] ffmpeg {}", self.namespace, args.join(" "));

        let child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::BinaryNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let output = match timeout(timeout_duration, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        };

        Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            log: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Creates [`FfmpegEngine`] instances under `<work_dir>/<scope>/<namespace>`.
pub struct FfmpegEngineFactory {
    config: Arc<EngineConfig>,
}

impl FfmpegEngineFactory {
    /// Creates a new factory with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a factory with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    fn scope_dir(&self, scope: &str) -> Result<PathBuf, EngineError> {
        validate_name(scope)?;
        Ok(self.config.work_dir.join(scope))
    }

    /// Checks that the ffmpeg binary can be launched.
    pub async fn validate(&self) -> Result<(), EngineError> {
        let result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::BinaryNotFound {
                    path: self.config.ffmpeg_path.clone(),
                })
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

#[async_trait]
impl EngineFactory for FfmpegEngineFactory {
    async fn create(
        &self,
        scope: &str,
        namespace: &str,
    ) -> Result<Arc<dyn CodecEngine>, EngineError> {
        validate_name(namespace)?;
        let root = self.scope_dir(scope)?.join(namespace);
        let engine = FfmpegEngine::open(
            Arc::clone(&self.config),
            format!("{}/{}", scope, namespace),
            root,
        )
        .await?;
        Ok(Arc::new(engine))
    }

    async fn release_scope(&self, scope: &str) -> Result<(), EngineError> {
        let dir = self.scope_dir(scope)?;
        let mut attempt = 1;
        loop {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                // A killed child or a blocking write can still add entries.
                Err(e) if attempt < RELEASE_ATTEMPTS => {
                    debug!("Retrying release of {:?} after: {}", dir, e);
                    attempt += 1;
                    tokio::time::sleep(RELEASE_RETRY_DELAY).await;
                }
                Err(e) => return Err(EngineError::Io(e)),
            }
        }
    }
}
