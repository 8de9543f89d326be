use anyhow::Result;
use clap::{Arg, Command};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

mod audio;
mod config;
mod duplicates;
mod error;
mod processing;
mod transcription;

use crate::audio::{ffmpeg_available, FfmpegTrimmer};
use crate::config::Config;
use crate::processing::{format_elapsed, summarize, BatchProcessor, BatchSource};
use crate::transcription::{TranscriptionEngine, WhisperEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("whisper-batch")
        .version("0.1.0")
        .about("Batch audio transcription with timestamped and plain transcripts")
        .arg(
            Arg::new("input")
                .value_name("PATH")
                .help("Audio file(s) to transcribe, or a single directory to scan")
                .num_args(1..)
                .required(true)
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Output directory for transcripts")
        )
        .arg(
            Arg::new("model")
                .short('m')
                .long("model")
                .value_name("SIZE")
                .help("Whisper model size")
                .value_parser(["tiny", "base", "small", "medium", "large-v3"])
        )
        .arg(
            Arg::new("language")
                .short('l')
                .long("language")
                .value_name("CODE")
                .help("Language hint (e.g. th); omit for auto-detection")
        )
        .arg(
            Arg::new("device")
                .long("device")
                .value_name("DEVICE")
                .help("Compute device preference")
                .value_parser(["auto", "gpu", "cpu"])
        )
        .arg(
            Arg::new("trim")
                .short('t')
                .long("trim")
                .value_name("SECONDS")
                .help("Trim each input to the first SECONDS before transcribing")
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a TOML configuration file")
        )
        .arg(
            Arg::new("no-vad")
                .long("no-vad")
                .help("Disable voice activity filtering")
                .action(clap::ArgAction::SetTrue)
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
        )
        .get_matches();

    // Initialize logging
    if matches.get_flag("verbose") {
        tracing_subscriber::fmt()
            .with_env_filter("whisper_batch=debug,info")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("whisper_batch=info,warn")
            .init();
    }

    // Load configuration
    let mut config = if let Some(config_path) = matches.get_one::<String>("config") {
        Config::load_from(Path::new(config_path))?
    } else {
        Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        })
    };

    // CLI overrides
    if let Some(model) = matches.get_one::<String>("model") {
        config.transcription.model = model.parse()?;
    }
    if let Some(device) = matches.get_one::<String>("device") {
        config.transcription.device = device.parse()?;
    }
    if let Some(language) = matches.get_one::<String>("language") {
        config.transcription.language = Some(language.clone());
    }
    if let Some(output_dir) = matches.get_one::<String>("output-dir") {
        config.output.base_dir = PathBuf::from(output_dir);
    }
    if let Some(trim) = matches.get_one::<String>("trim") {
        config.trim.enabled = true;
        config.trim.max_duration_seconds = trim.parse()?;
    }
    if matches.get_flag("no-vad") {
        config.transcription.vad_filter = false;
    }

    config.validate()?;

    // Resolve input mode: one directory, or a verbatim file list
    let inputs: Vec<String> = matches
        .get_many::<String>("input")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let source = if inputs.len() == 1 && Path::new(&inputs[0]).is_dir() {
        BatchSource::Directory(PathBuf::from(&inputs[0]))
    } else {
        BatchSource::Files(inputs.iter().map(PathBuf::from).collect())
    };

    info!("🚀 Batch transcription starting...");
    info!("📂 Output directory: {}", config.output.base_dir.display());
    info!("⚙️  Model: {}, device: {}", config.transcription.model, config.transcription.device);

    if !ffmpeg_available().await {
        warn!("⚠️ FFmpeg not found in PATH; trimming and format conversion will fail");
        warn!("   Download from: https://ffmpeg.org/download.html");
    }

    // Load the model once; failure here aborts before any file is touched
    let engine = WhisperEngine::load(
        config.transcription.clone(),
        config.output.cache_dir.clone(),
    )
    .await
    .map_err(|e| {
        error!("❌ Error loading model: {}", e);
        e
    })?;

    info!("🎤 Loaded {} model on {}", engine.model_name(), engine.device());

    let trimmer = FfmpegTrimmer::new(config.trim.output_dir.clone());
    let processor = BatchProcessor::new(config.clone(), engine).with_trimmer(Box::new(trimmer));

    let start_time = Instant::now();
    let outcomes = processor.run_batch(&source).await?;
    let summary = summarize(&outcomes, start_time.elapsed());

    info!("🎉 Batch processing complete!");
    info!("{}", summary);

    // Repeated long lines in a transcript point at decoder hallucination loops
    match duplicates::check_output_dir(&config.output.base_dir) {
        Ok(report) => info!("🔍 {}", report),
        Err(e) => warn!("Duplicate check failed: {}", e),
    }

    info!("⏱️  Total elapsed time: {}", format_elapsed(start_time.elapsed()));

    if summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
