use std::path::PathBuf;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for the transcription pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Audio input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Trimming failed: {0}")]
    Trim(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Output write failed: {0}")]
    OutputWrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Errors that abort the whole batch rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::ModelLoad(_) | PipelineError::Config(_))
    }
}
