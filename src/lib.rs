/// Batch Audio Transcription Pipeline
///
/// Feeds audio files through a Whisper backend one at a time, reusing a
/// single loaded model across the batch, and writes two transcript
/// renderings (timestamped and plain) per input.

pub mod audio;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod processing;
pub mod transcription;

// Re-export main types for easy access
pub use crate::audio::{FfmpegTrimmer, MediaTrimmer};
pub use crate::config::{
    Config, ConfigBuilder, DevicePreference, ModelSize, TranscriptionConfig,
};
pub use crate::duplicates::DuplicateReport;
pub use crate::error::{PipelineError, Result};
pub use crate::processing::{
    summarize, BatchOutcome, BatchProcessor, BatchSource, BatchSummary, FileStage, FileStatus,
};
pub use crate::transcription::{
    Device, OutputPaths, Segment, TranscriptionEngine, TranscriptionResult, WhisperEngine,
};
