use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// One timed span of recognized speech
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Recognized text
    pub text: String,
}

impl Segment {
    /// Create a new segment with whitespace-trimmed text
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into().trim().to_string(),
        }
    }

    /// Duration of this segment in seconds
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Complete result of transcribing one audio file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// Detected (or hinted) language code
    pub language: String,

    /// Language detection confidence, 0.0 to 1.0
    pub language_probability: f64,

    /// Total audio duration in seconds
    pub duration: f64,

    /// Segments in start-time order
    pub segments: Vec<Segment>,
}

impl TranscriptionResult {
    pub fn new(
        language: String,
        language_probability: f64,
        duration: f64,
        segments: Vec<Segment>,
    ) -> Self {
        Self {
            language,
            language_probability,
            duration,
            segments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Compute device actually selected for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Gpu,
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Gpu => f.write_str("gpu"),
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Trait for speech-transcription engines.
///
/// An engine is loaded once (model resolution, device selection) and then
/// shared across a whole batch; implementations must not reload per call.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe an audio file with the engine's configured options.
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult>;

    /// Transcribe with a per-call language hint overriding the configured one.
    async fn transcribe_with_language(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionResult>;

    /// Name of the loaded model
    fn model_name(&self) -> &str;

    /// Device the engine decodes on
    fn device(&self) -> Device;
}
