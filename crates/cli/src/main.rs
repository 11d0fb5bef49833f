//! Karaoke TTS entry point

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use karaoke_tts_config::{load_settings, Settings};
use karaoke_tts_pipeline::{ChunkedSpeechOrchestrator, MfaAligner, SpeechRequest};

#[derive(Debug, Parser)]
#[command(
    name = "karaoke-tts",
    version,
    about = "Mandarin speech synthesis with word-level karaoke timings"
)]
struct Cli {
    /// Settings environment, layered from config/<env>.yaml
    #[arg(long, global = true)]
    env: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synthesize text and write audio plus timings
    Synthesize(SynthesizeArgs),
    /// Time existing audio against its transcript
    Align(AlignArgs),
    /// Report whether the forced aligner and its models are installed
    AlignerStatus {
        /// Download missing models first
        #[arg(long)]
        download: bool,
    },
}

#[derive(Debug, Args)]
struct SynthesizeArgs {
    #[arg(long, conflicts_with = "text_file", required_unless_present = "text_file")]
    text: Option<String>,

    #[arg(long)]
    text_file: Option<PathBuf>,

    #[arg(long)]
    voice: Option<String>,

    #[arg(long)]
    speed: Option<f32>,

    #[arg(long)]
    volume: Option<f32>,

    #[arg(long, default_value = "output")]
    out_dir: PathBuf,
}

#[derive(Debug, Args)]
struct AlignArgs {
    #[arg(long)]
    audio: PathBuf,

    #[arg(long)]
    text_file: PathBuf,

    #[arg(long, default_value = "output")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = load_settings(cli.env.as_deref())?;

    init_tracing(&settings);
    tracing::info!("Karaoke TTS v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Synthesize(args) => synthesize(&settings, args).await,
        Command::Align(args) => align(&settings, args).await,
        Command::AlignerStatus { download } => aligner_status(&settings, download).await,
    }
}

async fn synthesize(
    settings: &Settings,
    args: SynthesizeArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = match (args.text, args.text_file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path).await?,
        (None, None) => return Err("either --text or --text-file is required".into()),
    };

    let orchestrator = ChunkedSpeechOrchestrator::from_settings(settings)?;
    let cleanup = orchestrator.progress().start_cleanup_task();

    let mut events = orchestrator.progress().subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    chunk = event.current_chunk,
                    total_chunks = event.total_chunks,
                    percentage = event.percentage,
                    status = ?event.status,
                    "{}",
                    event.message
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress reporter lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let request = SpeechRequest {
        text,
        voice: args.voice,
        speed: args.speed,
        volume: args.volume,
    };
    let result = orchestrator.generate(request).await;

    let _ = cleanup.send(true);
    reporter.abort();

    let output = result?;
    let (audio_path, timings_path) = output.write_to_dir(&args.out_dir).await?;
    let aligned = output.timings.iter().filter(|t| t.is_forced_alignment).count();

    println!("audio:   {}", audio_path.display());
    println!("timings: {}", timings_path.display());
    println!(
        "{} chunks, {:.0} ms, {} words ({} aligned)",
        output.chunk_count,
        output.duration_ms,
        output.timings.len(),
        aligned
    );
    Ok(())
}

async fn align(settings: &Settings, args: AlignArgs) -> Result<(), Box<dyn std::error::Error>> {
    let audio = tokio::fs::read(&args.audio).await?;
    let text = tokio::fs::read_to_string(&args.text_file).await?;

    let orchestrator = ChunkedSpeechOrchestrator::from_settings(settings)?;
    let timings = orchestrator.align_audio(&audio, &text).await;

    let path = write_timings(&args.out_dir, &serde_json::to_vec_pretty(&timings)?).await?;
    println!("timings: {} ({} words)", path.display(), timings.len());
    Ok(())
}

async fn write_timings(dir: &Path, json: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join("timings.json");
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

async fn aligner_status(
    settings: &Settings,
    download: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let aligner = MfaAligner::new(settings.alignment.clone());
    let status = if download {
        aligner.download_models().await
    } else {
        aligner.installation_status().await
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    if !status.ready {
        tracing::warn!(
            command = %settings.alignment.command,
            "Forced aligner not ready, timings will be estimated"
        );
    }
    Ok(())
}

/// Initialize tracing from observability settings
///
/// `RUST_LOG` wins over `observability.log_level` when set.
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &settings.observability.log_level;
        format!("karaoke_tts={}", level).into()
    });

    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
