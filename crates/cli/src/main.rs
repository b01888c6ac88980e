mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upscaler_core::{
    is_supported_image, is_supported_video, load_config_or_default, models, validate_config,
    Config, ImageFormat, ImageJob, ImagePipeline, PipelineError, TokioProcessRunner, ToolPaths,
    VideoJob, VideoPipeline, VideoSettings, IMAGE_INPUT_EXTENSIONS, VIDEO_INPUT_EXTENSIONS,
};

/// Buffer size for the pipeline event channel
const EVENT_BUFFER_SIZE: usize = 256;

/// Exit code used when a run is interrupted
const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Parser)]
#[command(name = "upscale", version, about = "Upscale images and videos with Real-ESRGAN")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, env = "UPSCALER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upscale one or more images, in order
    Image {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Enhancer model
        #[arg(long, short)]
        model: Option<String>,

        /// Output format: png, jpg, jpeg or webp
        #[arg(long, short)]
        format: Option<ImageFormat>,

        /// Open the output folder when done
        #[arg(long)]
        open: bool,
    },

    /// Upscale a video frame by frame
    Video {
        input: PathBuf,

        /// Enhancer model
        #[arg(long, short)]
        model: Option<String>,

        /// Scale factor (2-4)
        #[arg(long, short, value_parser = clap::value_parser!(u32).range(2..=4))]
        scale: Option<u32>,

        /// Format of the enhanced frames
        #[arg(long)]
        frame_format: Option<ImageFormat>,

        /// Open the output folder when done
        #[arg(long)]
        open: bool,
    },

    /// Locate the external tools
    Check,

    /// List the bundled enhancer models
    Models,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let cancelled = e
            .downcast_ref::<PipelineError>()
            .map(PipelineError::is_cancelled)
            .unwrap_or(false);
        if cancelled {
            warn!("Interrupted");
            std::process::exit(EXIT_CANCELLED);
        }
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config_or_default(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load config from {:?}", path),
        None => "Failed to load config".to_string(),
    })?;
    validate_config(&config).context("Configuration validation failed")?;

    match cli.command {
        Command::Image {
            inputs,
            model,
            format,
            open,
        } => {
            for path in &inputs {
                ensure_supported(path, is_supported_image(path), IMAGE_INPUT_EXTENSIONS)?;
            }
            let job = ImageJob::new(
                inputs,
                model.unwrap_or_else(|| config.image.default_model.clone()),
            )
            .with_format(format.unwrap_or(config.image.default_format))
            .with_open_output_dir(open);
            run_images(&config, job, cli.json).await
        }
        Command::Video {
            input,
            model,
            scale,
            frame_format,
            open,
        } => {
            ensure_supported(&input, is_supported_video(&input), VIDEO_INPUT_EXTENSIONS)?;
            let job = VideoJob::new(
                input,
                model.unwrap_or_else(|| config.video.default_model.clone()),
            )
            .with_scale(scale.unwrap_or(config.video.default_scale))
            .with_frame_format(frame_format.unwrap_or(config.video.frame_format))
            .with_open_output_dir(open);
            run_video(&config, job, cli.json).await
        }
        Command::Check => check_tools(&config),
        Command::Models => {
            print_models();
            Ok(())
        }
        Command::Config => {
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{rendered}");
            Ok(())
        }
    }
}

fn ensure_supported(path: &Path, supported: bool, allowed: &[&str]) -> Result<()> {
    if !supported {
        bail!(
            "Unsupported input {}: expected one of {}",
            path.display(),
            allowed.join(", ")
        );
    }
    Ok(())
}

fn resolve_tools(config: &Config) -> Result<ToolPaths> {
    let tools = ToolPaths::resolve(&config.tools).context("Required tool is missing")?;
    info!(
        enhancer = %tools.enhancer.display(),
        ffmpeg = %tools.ffmpeg.display(),
        ffprobe = %tools.ffprobe.display(),
        "Tools located"
    );
    Ok(tools)
}

async fn run_images(config: &Config, job: ImageJob, json: bool) -> Result<()> {
    let tools = resolve_tools(config)?;
    let pipeline = ImagePipeline::new(Arc::new(TokioProcessRunner::new()), tools)
        .with_terminate_grace(config.image.terminate_grace());

    let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let printer = tokio::spawn(output::print_events(rx, json));
    let token = pipeline.cancel_token();
    let interrupt = tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cancelling");
        token.cancel();
    });

    let result = pipeline.run(job, tx).await;
    interrupt.abort();
    let _ = printer.await;

    let manifest = result?;
    info!(outputs = manifest.len(), "Images upscaled");
    Ok(())
}

async fn run_video(config: &Config, job: VideoJob, json: bool) -> Result<()> {
    let tools = resolve_tools(config)?;
    let pipeline = VideoPipeline::new(
        Arc::new(TokioProcessRunner::new()),
        tools,
        VideoSettings::from(&config.video),
    );

    let (tx, rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let printer = tokio::spawn(output::print_events(rx, json));
    let token = pipeline.cancel_token();
    let interrupt = tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cancelling");
        token.cancel();
    });

    let result = pipeline.run(job, tx).await;
    interrupt.abort();
    let _ = printer.await;

    let result = result?;
    info!(
        output = %result.output_path.display(),
        frames = result.total_frames,
        frame_rate = %result.frame_rate,
        encoder = %result.encoder,
        duration_ms = result.duration_ms,
        "Video upscaled"
    );
    Ok(())
}

fn check_tools(config: &Config) -> Result<()> {
    let tools = resolve_tools(config)?;
    println!("enhancer: {}", tools.enhancer.display());
    println!("ffmpeg:   {}", tools.ffmpeg.display());
    println!("ffprobe:  {}", tools.ffprobe.display());
    Ok(())
}

fn print_models() {
    println!("Image models:");
    for name in models::IMAGE_MODELS {
        let marker = if *name == models::DEFAULT_IMAGE_MODEL { " (default)" } else { "" };
        println!("  {name}{marker}");
    }
    println!("Video models:");
    for name in models::VIDEO_MODELS {
        let marker = if *name == models::DEFAULT_VIDEO_MODEL { " (default)" } else { "" };
        println!("  {name}{marker}");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
