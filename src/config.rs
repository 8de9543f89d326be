use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Configuration for the batch transcription pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Input discovery settings
    pub processing: ProcessingConfig,

    /// Transcription decoding settings
    pub transcription: TranscriptionConfig,

    /// Audio trimming settings
    pub trim: TrimConfig,

    /// Output and storage settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Supported audio file extensions (case-insensitive match)
    pub supported_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Whisper model size
    pub model: ModelSize,

    /// Compute device preference
    pub device: DevicePreference,

    /// Language hint (None = auto-detect)
    pub language: Option<String>,

    /// Beam width for decoding search
    pub beam_size: u32,

    /// Number of decoding candidates
    pub best_of: u32,

    /// Sampling temperature (0.0 = near-deterministic)
    pub temperature: f32,

    /// Condition decoding on previously decoded text
    pub condition_on_previous_text: bool,

    /// Filter silence with voice activity detection before decoding
    pub vad_filter: bool,

    /// Minimum silence span treated as a VAD boundary (milliseconds)
    pub vad_min_silence_ms: u32,

    /// Skip segments whose compression ratio exceeds this (repetition guard)
    pub compression_ratio_threshold: f32,

    /// Skip segments whose average log probability falls below this
    pub log_prob_threshold: f32,

    /// Probability above which a span is treated as non-speech
    pub no_speech_threshold: f32,

    /// Timeout for one decoding subprocess (seconds)
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimConfig {
    /// Trim each input before transcription
    pub enabled: bool,

    /// Seconds kept from the start of each input
    pub max_duration_seconds: u64,

    /// Directory for trimmed copies
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Base output directory for transcripts
    pub base_dir: PathBuf,

    /// Scratch directory for format conversions and decoder output
    pub cache_dir: PathBuf,

    /// Write a machine-readable batch results file next to the transcripts
    pub save_results: bool,

    /// Log level
    pub log_level: String,
}

/// Whisper model size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    #[default]
    LargeV3,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::LargeV3 => "large-v3",
        }
    }
}

impl fmt::Display for ModelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSize {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large-v3" => Ok(ModelSize::LargeV3),
            other => Err(PipelineError::Config(format!(
                "unknown model size '{}' (expected tiny, base, small, medium, large-v3)",
                other
            ))),
        }
    }
}

/// Compute device preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Auto,
    Gpu,
    Cpu,
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Gpu => "gpu",
            DevicePreference::Cpu => "cpu",
        };
        f.write_str(s)
    }
}

impl FromStr for DevicePreference {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "gpu" | "cuda" => Ok(DevicePreference::Gpu),
            "cpu" => Ok(DevicePreference::Cpu),
            other => Err(PipelineError::Config(format!(
                "unknown device '{}' (expected auto, gpu, cpu)",
                other
            ))),
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to environment variables
    pub fn load() -> Result<Self> {
        let config_paths = [
            "whisper-batch.toml",
            "config/whisper-batch.toml",
            "~/.config/whisper-batch/config.toml",
        ];

        for path in &config_paths {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Load a specific configuration file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Build configuration from environment variables over defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(model) = std::env::var("WHISPER_BATCH_MODEL") {
            config.transcription.model = model.parse()?;
        }

        if let Ok(device) = std::env::var("WHISPER_BATCH_DEVICE") {
            config.transcription.device = device.parse()?;
        }

        if let Ok(language) = std::env::var("WHISPER_BATCH_LANGUAGE") {
            config.transcription.language = Some(language);
        }

        if let Ok(output_dir) = std::env::var("WHISPER_BATCH_OUTPUT_DIR") {
            config.output.base_dir = PathBuf::from(output_dir);
        }

        if let Ok(log_level) = std::env::var("WHISPER_BATCH_LOG_LEVEL") {
            config.output.log_level = log_level;
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.transcription.beam_size == 0 {
            return Err(PipelineError::Config(
                "beam_size must be at least 1".to_string(),
            ));
        }

        if self.transcription.best_of == 0 {
            return Err(PipelineError::Config(
                "best_of must be at least 1".to_string(),
            ));
        }

        if self.transcription.temperature < 0.0 {
            return Err(PipelineError::Config(
                "temperature must not be negative".to_string(),
            ));
        }

        if self.trim.enabled && self.trim.max_duration_seconds == 0 {
            return Err(PipelineError::Config(
                "trim duration must be greater than 0".to_string(),
            ));
        }

        if self.processing.supported_extensions.is_empty() {
            return Err(PipelineError::Config(
                "supported_extensions must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Batch Transcription Configuration:\n\
            - Model: {}\n\
            - Device: {}\n\
            - Language: {}\n\
            - Beam Size: {}, Best Of: {}, Temperature: {}\n\
            - VAD Filter: {}\n\
            - Trim: {}\n\
            - Output Directory: {}\n\
            - Supported Extensions: {}",
            self.transcription.model,
            self.transcription.device,
            self.transcription.language.as_deref().unwrap_or("auto-detect"),
            self.transcription.beam_size,
            self.transcription.best_of,
            self.transcription.temperature,
            self.transcription.vad_filter,
            if self.trim.enabled {
                format!("first {}s", self.trim.max_duration_seconds)
            } else {
                "disabled".to_string()
            },
            self.output.base_dir.display(),
            self.processing.supported_extensions.join(", ")
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processing: ProcessingConfig {
                supported_extensions: vec![
                    "mp3".to_string(),
                    "wav".to_string(),
                    "m4a".to_string(),
                    "flac".to_string(),
                    "ogg".to_string(),
                    "wma".to_string(),
                ],
            },
            transcription: TranscriptionConfig::default(),
            trim: TrimConfig {
                enabled: false,
                max_duration_seconds: 180,
                output_dir: PathBuf::from("./trimmed"),
            },
            output: OutputConfig {
                base_dir: PathBuf::from("./output"),
                cache_dir: PathBuf::from("./cache"),
                save_results: true,
                log_level: "info".to_string(),
            },
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: ModelSize::LargeV3,
            device: DevicePreference::Auto,
            language: None,
            beam_size: 5,
            best_of: 3,
            temperature: 0.2,
            condition_on_previous_text: false,
            vad_filter: true,
            vad_min_silence_ms: 800,
            compression_ratio_threshold: 2.4,
            log_prob_threshold: -1.0,
            no_speech_threshold: 0.7,
            timeout_seconds: 3600,
        }
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_model(mut self, model: ModelSize) -> Self {
        self.config.transcription.model = model;
        self
    }

    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.config.transcription.device = device;
        self
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.config.transcription.language = language;
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.config.output.base_dir = dir;
        self
    }

    pub fn with_trim(mut self, max_duration_seconds: u64) -> Self {
        self.config.trim.enabled = true;
        self.config.trim.max_duration_seconds = max_duration_seconds;
        self
    }

    pub fn with_beam_size(mut self, beam_size: u32) -> Self {
        self.config.transcription.beam_size = beam_size;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.transcription.temperature = temperature;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
