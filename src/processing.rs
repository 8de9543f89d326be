use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::audio::MediaTrimmer;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::transcription::engine::TranscriptionEngine;
use crate::transcription::format::{write_outputs, OutputPaths};

/// Inputs for one batch: an explicit file list or a directory to scan
#[derive(Debug, Clone)]
pub enum BatchSource {
    Files(Vec<PathBuf>),
    Directory(PathBuf),
}

/// Terminal status of one file in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Pending,
    Completed,
    Failed,
}

/// Pipeline milestones completed for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStage {
    Trimmed,
    Transcribed,
    Written,
}

/// Per-file record of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Original input path
    pub input: PathBuf,

    /// Terminal status
    pub status: FileStatus,

    /// Milestones reached before finishing or failing
    pub stages_completed: Vec<FileStage>,

    /// Written transcript paths, when the file completed
    pub outputs: Option<OutputPaths>,

    /// Failure reason, when the file failed
    pub error: Option<String>,

    /// Detected language, when transcription ran
    pub language: Option<String>,

    /// Wall-clock time spent on this file
    pub processing_time: Duration,
}

impl BatchOutcome {
    fn pending(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            status: FileStatus::Pending,
            stages_completed: Vec::new(),
            outputs: None,
            error: None,
            language: None,
            processing_time: Duration::ZERO,
        }
    }

    fn fail(&mut self, reason: String) {
        self.status = FileStatus::Failed;
        self.error = Some(reason);
    }

    pub fn succeeded(&self) -> bool {
        self.status == FileStatus::Completed
    }
}

/// Aggregate counts for a finished batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<(PathBuf, String)>,
    pub elapsed: Duration,
}

/// Derive a summary from finished outcomes.
pub fn summarize(outcomes: &[BatchOutcome], elapsed: Duration) -> BatchSummary {
    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    let failures = outcomes
        .iter()
        .filter(|o| !o.succeeded())
        .map(|o| {
            (
                o.input.clone(),
                o.error.clone().unwrap_or_else(|| "unknown error".to_string()),
            )
        })
        .collect::<Vec<_>>();

    BatchSummary {
        total: outcomes.len(),
        succeeded,
        failed: failures.len(),
        failures,
        elapsed,
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Successfully processed: {}/{} files in {}",
            self.succeeded,
            self.total,
            format_elapsed(self.elapsed)
        )?;
        if !self.failures.is_empty() {
            write!(f, "\nFailed files ({}):", self.failures.len())?;
            for (path, reason) in &self.failures {
                write!(f, "\n   - {}: {}", path.display(), reason)?;
            }
        }
        Ok(())
    }
}

/// Humanize a duration as `Hh Mm Ss` / `Mm Ss` / `Ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Machine-readable record persisted after a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BatchReport {
    total: usize,
    succeeded: usize,
    failed: usize,
    total_time: Duration,
    outcomes: Vec<BatchOutcome>,
}

/// Sequential batch orchestrator.
///
/// Owns one loaded engine for the whole batch and an optional trimmer.
/// Files are processed to completion one at a time; a file's failure is
/// recorded and never aborts the rest of the batch.
pub struct BatchProcessor<E: TranscriptionEngine> {
    config: Config,
    engine: E,
    trimmer: Option<Box<dyn MediaTrimmer>>,
}

impl<E: TranscriptionEngine> BatchProcessor<E> {
    pub fn new(config: Config, engine: E) -> Self {
        Self {
            config,
            engine,
            trimmer: None,
        }
    }

    pub fn with_trimmer(mut self, trimmer: Box<dyn MediaTrimmer>) -> Self {
        self.trimmer = Some(trimmer);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Resolve a batch source into the concrete input list.
    ///
    /// A directory is walked recursively and filtered to the supported
    /// extensions (case-insensitive), sorted for stable ordering. An explicit
    /// list is used verbatim; existence errors surface per file.
    pub fn resolve_inputs(&self, source: &BatchSource) -> Result<Vec<PathBuf>> {
        match source {
            BatchSource::Files(files) => Ok(files.clone()),
            BatchSource::Directory(dir) => {
                if !dir.is_dir() {
                    return Err(PipelineError::InputNotFound(dir.clone()));
                }

                let extensions = &self.config.processing.supported_extensions;
                let mut files: Vec<PathBuf> = WalkDir::new(dir)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .filter(|path| {
                        path.extension()
                            .and_then(|ext| ext.to_str())
                            .map(|ext| {
                                extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
                            })
                            .unwrap_or(false)
                    })
                    .collect();
                files.sort();
                Ok(files)
            }
        }
    }

    /// Process every resolved input and return outcomes in input order.
    pub async fn run_batch(&self, source: &BatchSource) -> Result<Vec<BatchOutcome>> {
        let start_time = Instant::now();
        let inputs = self.resolve_inputs(source)?;

        if inputs.is_empty() {
            warn!("No audio files found to process");
            return Ok(Vec::new());
        }

        info!("🔄 Batch processing: {} file(s)", inputs.len());

        let input_root = match source {
            BatchSource::Directory(dir) => Some(dir.as_path()),
            BatchSource::Files(_) => None,
        };

        let mut outcomes = Vec::with_capacity(inputs.len());
        for (index, input) in inputs.iter().enumerate() {
            info!(
                "[{}/{}] Processing: {}",
                index + 1,
                inputs.len(),
                input.display()
            );

            let outcome = self.process_file(input, input_root).await;
            match outcome.status {
                FileStatus::Completed => {
                    info!(
                        "✅ Completed: {} in {:.2}s",
                        input.display(),
                        outcome.processing_time.as_secs_f64()
                    );
                }
                _ => {
                    warn!(
                        "❌ Failed: {} - {}",
                        input.display(),
                        outcome.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            outcomes.push(outcome);
        }

        if self.config.output.save_results {
            if let Err(e) = self.save_results(&outcomes, start_time.elapsed()).await {
                warn!("Could not save batch results: {}", e);
            }
        }

        Ok(outcomes)
    }

    /// Drive one file through trim, transcribe and write; failures are
    /// captured in the outcome instead of propagating.
    async fn process_file(&self, input: &Path, input_root: Option<&Path>) -> BatchOutcome {
        let start_time = Instant::now();
        let mut outcome = BatchOutcome::pending(input);

        if !input.exists() {
            outcome.fail(PipelineError::InputNotFound(input.to_path_buf()).to_string());
            outcome.processing_time = start_time.elapsed();
            return outcome;
        }

        // optional trim; failure is non-fatal, the original file is used
        let mut decode_input = input.to_path_buf();
        if self.config.trim.enabled {
            if let Some(trimmer) = &self.trimmer {
                let bound = Duration::from_secs(self.config.trim.max_duration_seconds);
                match trimmer.trim(input, bound).await {
                    Ok(trimmed) => {
                        decode_input = trimmed;
                        outcome.stages_completed.push(FileStage::Trimmed);
                    }
                    Err(e) => {
                        warn!(
                            "Trimming failed for {}, using original: {}",
                            input.display(),
                            e
                        );
                    }
                }
            }
        }

        let result = match self.engine.transcribe(&decode_input).await {
            Ok(result) => {
                outcome.stages_completed.push(FileStage::Transcribed);
                result
            }
            Err(e) => {
                outcome.fail(e.to_string());
                outcome.processing_time = start_time.elapsed();
                return outcome;
            }
        };

        info!(
            "   Language: {} ({:.0}% confidence), duration {:.1}s, {} segments",
            result.language,
            result.language_probability * 100.0,
            result.duration,
            result.segments.len()
        );
        outcome.language = Some(result.language.clone());

        let base_name = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let output_dir = self.output_dir_for(input, input_root);

        match write_outputs(&result, &base_name, &output_dir).await {
            Ok(paths) => {
                outcome.stages_completed.push(FileStage::Written);
                outcome.outputs = Some(paths);
                outcome.status = FileStatus::Completed;
            }
            Err(e) => {
                outcome.fail(e.to_string());
            }
        }

        outcome.processing_time = start_time.elapsed();
        outcome
    }

    /// Directory mode mirrors the input's subfolder structure under the
    /// output base; list mode writes directly into the base.
    fn output_dir_for(&self, input: &Path, input_root: Option<&Path>) -> PathBuf {
        let base = &self.config.output.base_dir;
        let relative = input_root
            .and_then(|root| input.parent().and_then(|parent| parent.strip_prefix(root).ok()));
        match relative {
            Some(rel) if !rel.as_os_str().is_empty() => base.join(rel),
            _ => base.clone(),
        }
    }

    async fn save_results(&self, outcomes: &[BatchOutcome], elapsed: Duration) -> Result<()> {
        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        let report = BatchReport {
            total: outcomes.len(),
            succeeded,
            failed: outcomes.len() - succeeded,
            total_time: elapsed,
            outcomes: outcomes.to_vec(),
        };

        tokio::fs::create_dir_all(&self.config.output.base_dir).await?;
        let path = self.config.output.base_dir.join("processing_results.json");
        let json_data = serde_json::to_string_pretty(&report)
            .map_err(|e| PipelineError::OutputWrite(e.to_string()))?;
        tokio::fs::write(&path, json_data).await?;

        info!("💾 Results saved to: {}", path.display());
        Ok(())
    }
}
