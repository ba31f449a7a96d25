use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use segcast_core::{
    codec::{format_from_file_name, mime_type},
    create_prober, load_config_or_default, validate_config, ChunkedTranscoder, CommandBuilder,
    Config, EngineFactory, FfmpegEngineFactory, JobProgress, MediaJob,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the progress channel
const PROGRESS_BUFFER_SIZE: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "segcast", version = VERSION)]
#[command(about = "Chunked parallel media transcoder", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $SEGCAST_CONFIG or segcast.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a media file
    Convert {
        /// Source media file
        input: PathBuf,

        /// Target format (file extension, e.g. webm)
        #[arg(short, long)]
        to: String,

        /// Directory for the output file (defaults to the input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of parallel engine instances
        #[arg(short, long)]
        workers: Option<usize>,

        /// Segment length in seconds
        #[arg(long)]
        chunk_secs: Option<f64>,
    },

    /// List supported target formats
    Formats,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Formats => {
            for format in CommandBuilder::supported_targets() {
                println!("{:<6} {}", format, mime_type(format));
            }
            Ok(())
        }
        Command::Convert {
            input,
            to,
            output_dir,
            workers,
            chunk_secs,
        } => {
            let mut config = load(cli.config)?;
            if let Some(workers) = workers {
                config.pipeline.worker_count = workers;
            }
            if let Some(chunk_secs) = chunk_secs {
                config.pipeline = config.pipeline.with_chunk_secs(chunk_secs);
            }
            validate_config(&config).context("Configuration validation failed")?;

            convert(config, &input, &to, output_dir).await
        }
    }
}

fn load(path: Option<PathBuf>) -> Result<Config> {
    // Determine config path
    let config_path = path
        .or_else(|| std::env::var("SEGCAST_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("segcast.toml"));

    info!("Loading configuration from {:?}", config_path);
    load_config_or_default(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))
}

async fn convert(
    config: Config,
    input: &Path,
    target: &str,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid input path {:?}", input))?
        .to_string();
    let source_mime = format_from_file_name(&file_name)
        .map(|format| mime_type(&format))
        .unwrap_or("application/octet-stream");

    let bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {:?}", input))?;
    if bytes.is_empty() {
        bail!("{:?} is empty", input);
    }

    let factory = Arc::new(FfmpegEngineFactory::new(config.engine.clone()));
    factory
        .validate()
        .await
        .context("FFmpeg is not available")?;
    let factory: Arc<dyn EngineFactory> = factory;
    let prober = create_prober(&config.probe, &config.engine, Arc::clone(&factory));

    info!(
        "Using {} worker(s), prober: {}",
        config.pipeline.worker_count,
        prober.name()
    );

    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_BUFFER_SIZE);
    let progress_task = tokio::spawn(log_progress(progress_rx));

    let transcoder =
        ChunkedTranscoder::new(config.pipeline.clone(), factory, prober).with_progress(progress_tx);

    // Ctrl-C cancels the running job
    let (cancel_tx, cancel_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            let _ = cancel_tx.send(());
        }
    });

    let job = MediaJob::new(bytes, file_name, source_mime, target);
    let result = transcoder.run_until(job, cancel_rx).await;
    drop(transcoder);
    let _ = progress_task.await;
    let result = result?;

    let dir = output_dir
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("Failed to create {:?}", dir))?;
    let output_path = dir.join(&result.output_name);
    tokio::fs::write(&output_path, &result.output_bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", output_path))?;

    info!(
        "Wrote {:?} ({} bytes, {}, {} segments in {}ms)",
        output_path,
        result.output_bytes.len(),
        result.mime_type,
        result.segment_count,
        result.elapsed_ms
    );
    Ok(())
}

async fn log_progress(mut rx: mpsc::Receiver<JobProgress>) {
    while let Some(event) = rx.recv().await {
        match event {
            JobProgress::Probed { duration_secs, .. } => {
                info!("Source duration: {:.3}s", duration_secs);
            }
            JobProgress::Segmented {
                segment_count,
                chunk_secs,
                ..
            } => {
                info!("Split into {} segment(s) of {:.3}s", segment_count, chunk_secs);
            }
            JobProgress::SegmentDone {
                index,
                completed,
                total,
                ..
            } => {
                info!("Segment {} done ({}/{})", index, completed, total);
            }
            JobProgress::SegmentFailed { index, error, .. } => {
                warn!("Segment {} failed: {}", index, error);
            }
            JobProgress::Concatenating { .. } => info!("Joining segments"),
            JobProgress::Completed { .. } | JobProgress::Failed { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "segcast",
            "convert",
            "clip.mov",
            "--to",
            "webm",
            "--workers",
            "4",
            "--chunk-secs",
            "2.5",
        ])
        .unwrap();

        match cli.command {
            Command::Convert {
                input,
                to,
                workers,
                chunk_secs,
                output_dir,
            } => {
                assert_eq!(input, PathBuf::from("clip.mov"));
                assert_eq!(to, "webm");
                assert_eq!(workers, Some(4));
                assert_eq!(chunk_secs, Some(2.5));
                assert!(output_dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_convert_requires_target() {
        assert!(Cli::try_parse_from(["segcast", "convert", "clip.mov"]).is_err());
    }

    #[test]
    fn test_load_missing_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(Some(dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.pipeline.worker_count, 3);
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segcast.toml");
        std::fs::write(&path, "[pipeline]\nchunk_secs = 7.5\n").unwrap();

        let config = load(Some(path)).unwrap();
        assert_eq!(config.pipeline.chunk_secs, 7.5);
    }
}
