use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::audio::{convert_to_wav, probe_duration};
use crate::config::{DevicePreference, ModelSize, TranscriptionConfig};
use crate::error::{PipelineError, Result};
use crate::transcription::engine::{Device, Segment, TranscriptionEngine, TranscriptionResult};

/// Resolved whisper backend
#[derive(Debug, Clone)]
enum WhisperBackend {
    /// whisper.cpp family (whisper-cli / whisper-cpp), decodes WAV only
    Cpp {
        command: String,
        model_path: PathBuf,
    },
    /// Python OpenAI whisper CLI (fallback, slower)
    Python,
}

/// Transcription engine backed by a whisper command-line backend.
///
/// Backend, model file and device are resolved once in [`WhisperEngine::load`];
/// each call to [`TranscriptionEngine::transcribe`] then runs one decoding
/// subprocess. The loaded engine is meant to be shared across a whole batch.
#[derive(Debug, Clone)]
pub struct WhisperEngine {
    config: TranscriptionConfig,
    backend: WhisperBackend,
    device: Device,
    cache_dir: PathBuf,
    model_name: String,
}

impl WhisperEngine {
    /// Resolve a backend, model file and device. Failure here is fatal for a
    /// batch: without a loaded model nothing can be transcribed.
    pub async fn load(config: TranscriptionConfig, cache_dir: PathBuf) -> Result<Self> {
        info!("Loading Whisper {} model...", config.model);

        let backend = Self::resolve_backend(config.model).await?;
        let device = Self::resolve_device(config.device);

        match device {
            Device::Gpu => info!("✅ Using GPU acceleration"),
            Device::Cpu => info!("✅ Using CPU (no GPU detected)"),
        }

        let model_name = config.model.to_string();
        Ok(Self {
            config,
            backend,
            device,
            cache_dir,
            model_name,
        })
    }

    /// Probe for an available whisper backend, preferring whisper.cpp.
    async fn resolve_backend(model: ModelSize) -> Result<WhisperBackend> {
        for cmd_name in ["whisper-cli", "whisper-cpp"] {
            if Self::check_command_available(cmd_name).await {
                info!("✅ Found {} backend", cmd_name);
                let model_path = Self::find_model_file(model).ok_or_else(|| {
                    PipelineError::ModelLoad(format!(
                        "no ggml model file found for '{}' (expected models/ggml-{}.bin)",
                        model, model
                    ))
                })?;
                info!("🎯 Using model file: {}", model_path.display());
                return Ok(WhisperBackend::Cpp {
                    command: cmd_name.to_string(),
                    model_path,
                });
            }
        }

        if Self::check_command_available("whisper").await {
            info!("✅ Found Python whisper backend");
            return Ok(WhisperBackend::Python);
        }

        Err(PipelineError::ModelLoad(
            "no whisper backend found; install whisper.cpp or openai-whisper".to_string(),
        ))
    }

    /// Search the conventional install locations for a ggml model file.
    fn find_model_file(model: ModelSize) -> Option<PathBuf> {
        let name = format!("ggml-{}.bin", model);
        let candidates = [
            PathBuf::from("models").join(&name),
            PathBuf::from("/usr/local/share/whisper-cpp").join(&name),
            PathBuf::from("/opt/homebrew/share/whisper-cpp").join(&name),
        ];
        candidates.into_iter().find(|p| p.exists())
    }

    /// Try the preferred accelerator, fall back to CPU.
    fn resolve_device(preference: DevicePreference) -> Device {
        match preference {
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Gpu | DevicePreference::Auto => {
                if Self::gpu_available() {
                    Device::Gpu
                } else {
                    Device::Cpu
                }
            }
        }
    }

    fn gpu_available() -> bool {
        std::env::var("CUDA_VISIBLE_DEVICES").map_or(false, |v| !v.is_empty())
            || std::env::var("WHISPER_USE_GPU")
                .map_or(false, |v| v == "1" || v.to_lowercase() == "true")
    }

    async fn check_command_available(cmd_name: &str) -> bool {
        Command::new(cmd_name)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    async fn transcribe_inner(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        if !audio_path.exists() {
            return Err(PipelineError::InputNotFound(audio_path.to_path_buf()));
        }

        let stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        // whisper.cpp only decodes WAV; convert other containers first
        let mut temp_wav = None;
        let decode_path = match &self.backend {
            WhisperBackend::Cpp { .. } if !is_wav(audio_path) => {
                match convert_to_wav(audio_path, &self.cache_dir).await {
                    Ok(path) => {
                        temp_wav = Some(path.clone());
                        path
                    }
                    Err(e) => {
                        warn!(
                            "Could not convert {} to WAV ({}), trying original file",
                            audio_path.display(),
                            e
                        );
                        audio_path.to_path_buf()
                    }
                }
            }
            _ => audio_path.to_path_buf(),
        };

        let work_dir = self.cache_dir.join(format!("decode_{}", stem));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = self
            .run_backend(audio_path, &decode_path, &work_dir, &stem, language)
            .await;

        // scratch cleanup, best effort
        if let Some(wav) = temp_wav {
            let _ = tokio::fs::remove_file(&wav).await;
        }
        let _ = tokio::fs::remove_dir_all(&work_dir).await;

        result
    }

    async fn run_backend(
        &self,
        audio_path: &Path,
        decode_path: &Path,
        work_dir: &Path,
        stem: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let hint = language.or(self.config.language.as_deref());

        let mut cmd = match &self.backend {
            WhisperBackend::Cpp {
                command,
                model_path,
            } => {
                let mut cmd = Command::new(command);
                cmd.arg("-f")
                    .arg(decode_path)
                    .arg("-m")
                    .arg(model_path)
                    .arg("-oj")
                    .arg("-of")
                    .arg(work_dir.join(stem))
                    .arg("-tp")
                    .arg(self.config.temperature.to_string())
                    .arg("-bs")
                    .arg(self.config.beam_size.to_string())
                    .arg("-bo")
                    .arg(self.config.best_of.to_string())
                    .arg("-nth")
                    .arg(self.config.no_speech_threshold.to_string());
                if let Some(lang) = hint {
                    cmd.arg("-l").arg(lang);
                }
                if !self.config.condition_on_previous_text {
                    cmd.arg("-nc");
                }
                if self.config.vad_filter {
                    cmd.arg("--vad")
                        .arg("--vad-min-silence-duration-ms")
                        .arg(self.config.vad_min_silence_ms.to_string());
                }
                if self.device == Device::Cpu {
                    cmd.arg("-ng");
                }
                cmd
            }
            WhisperBackend::Python => {
                let mut cmd = Command::new("whisper");
                cmd.arg(decode_path)
                    .arg("--model")
                    .arg(self.config.model.as_str())
                    .arg("--output_dir")
                    .arg(work_dir)
                    .arg("--output_format")
                    .arg("json")
                    .arg("--verbose")
                    .arg("False")
                    .arg("--fp16")
                    .arg("False")
                    .arg("--temperature")
                    .arg(self.config.temperature.to_string())
                    .arg("--best_of")
                    .arg(self.config.best_of.to_string())
                    .arg("--beam_size")
                    .arg(self.config.beam_size.to_string())
                    .arg("--compression_ratio_threshold")
                    .arg(self.config.compression_ratio_threshold.to_string())
                    .arg("--logprob_threshold")
                    .arg(self.config.log_prob_threshold.to_string())
                    .arg("--no_speech_threshold")
                    .arg(self.config.no_speech_threshold.to_string())
                    .arg("--condition_on_previous_text")
                    .arg(if self.config.condition_on_previous_text {
                        "True"
                    } else {
                        "False"
                    });
                if let Some(lang) = hint {
                    cmd.arg("--language").arg(lang);
                }
                if self.device == Device::Cpu {
                    cmd.arg("--device").arg("cpu");
                }
                cmd
            }
        };

        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        debug!("Executing whisper command: {:?}", cmd);

        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| {
                PipelineError::Transcription(format!(
                    "whisper timed out after {}s for {}",
                    self.config.timeout_seconds,
                    audio_path.display()
                ))
            })?
            .map_err(|e| PipelineError::Transcription(format!("failed to run whisper: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::Transcription(format!(
                "whisper exited with {} for {}",
                output.status,
                audio_path.display()
            )));
        }

        let json_path = find_json_output(work_dir).await?.ok_or_else(|| {
            PipelineError::Transcription(format!(
                "no whisper JSON output found in {}",
                work_dir.display()
            ))
        })?;

        let json_content = tokio::fs::read_to_string(&json_path).await?;
        let whisper_output: WhisperOutput = serde_json::from_str(&json_content)
            .map_err(|e| PipelineError::Transcription(format!("malformed whisper JSON: {}", e)))?;

        let (segments, detected_language, probability) = collect_segments(whisper_output);

        let language = detected_language
            .or_else(|| hint.map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        // Confidence is 1.0 when detection was skipped via a hint and the
        // backend reported nothing of its own.
        let language_probability = probability.unwrap_or(1.0);

        let duration = match probe_duration(decode_path).await {
            Ok(d) => d.as_secs_f64(),
            Err(_) => segments.last().map(|s| s.end).unwrap_or(0.0),
        };

        Ok(TranscriptionResult::new(
            language,
            language_probability,
            duration,
            segments,
        ))
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperEngine {
    async fn transcribe(&self, audio_path: &Path) -> Result<TranscriptionResult> {
        self.transcribe_inner(audio_path, None).await
    }

    async fn transcribe_with_language(
        &self,
        audio_path: &Path,
        language: &str,
    ) -> Result<TranscriptionResult> {
        self.transcribe_inner(audio_path, Some(language)).await
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn device(&self) -> Device {
        self.device
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

async fn find_json_output(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Normalize the known whisper JSON shapes into ordered segments plus
/// language metadata.
fn collect_segments(output: WhisperOutput) -> (Vec<Segment>, Option<String>, Option<f64>) {
    let mut probability = output.language_probability;

    let language = output
        .result
        .as_ref()
        .map(|r| r.language.clone())
        .or_else(|| output.language.clone())
        .filter(|l| !l.is_empty());

    let mut segments: Vec<Segment> = if !output.transcription.is_empty() {
        // whisper.cpp format: string timestamps "HH:MM:SS,mmm"
        output
            .transcription
            .into_iter()
            .map(|seg| {
                let start = parse_timestamp(&seg.timestamps.from).unwrap_or(0.0);
                let end = parse_timestamp(&seg.timestamps.to).unwrap_or(0.0);
                Segment::new(start, end, seg.text)
            })
            .collect()
    } else {
        // Python whisper format (top-level segments) or result-nested
        // segments; both carry numeric offsets and per-segment log probs
        let raw = if !output.segments.is_empty() {
            output.segments
        } else {
            output.result.map(|r| r.segments).unwrap_or_default()
        };

        if probability.is_none() {
            let logprobs: Vec<f64> = raw.iter().filter_map(|s| s.avg_logprob).collect();
            if !logprobs.is_empty() {
                let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
                probability = Some(((mean + 1.0) / 2.0).clamp(0.0, 1.0));
            }
        }

        raw.into_iter()
            .map(|seg| Segment::new(seg.start, seg.end, seg.text))
            .collect()
    };

    segments.retain(|s| !s.text.is_empty());
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    (segments, language, probability)
}

/// Parse a "HH:MM:SS,mmm" timestamp into seconds.
fn parse_timestamp(timestamp: &str) -> Option<f64> {
    let (time_part, millis_part) = timestamp.split_once(',')?;
    let milliseconds: f64 = millis_part.trim().parse::<f64>().ok()? / 1000.0;

    let mut components = time_part.split(':');
    let hours: f64 = components.next()?.trim().parse().ok()?;
    let minutes: f64 = components.next()?.trim().parse().ok()?;
    let seconds: f64 = components.next()?.trim().parse().ok()?;
    if components.next().is_some() {
        return None;
    }

    Some(hours * 3600.0 + minutes * 60.0 + seconds + milliseconds)
}

/// Whisper JSON output, covering the whisper.cpp and Python shapes
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    language_probability: Option<f64>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
    #[serde(default)]
    transcription: Vec<WhisperTranscriptionSegment>,
    #[serde(default)]
    result: Option<WhisperResult>,
}

#[derive(Debug, Deserialize)]
struct WhisperResult {
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperTranscriptionSegment {
    timestamps: WhisperTimestamps,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperTimestamps {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    avg_logprob: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        assert!((parse_timestamp("00:01:23,456").unwrap() - 83.456).abs() < 1e-9);
        assert_eq!(parse_timestamp("01:00:00,000"), Some(3600.0));
        assert_eq!(parse_timestamp("garbage"), None);
        assert_eq!(parse_timestamp("00:01,000"), None);
    }

    #[test]
    fn test_collect_segments_cpp_format() {
        let json = r#"{
            "result": { "language": "th" },
            "transcription": [
                { "timestamps": { "from": "00:00:00,000", "to": "00:00:02,500" }, "text": " สวัสดี" },
                { "timestamps": { "from": "00:00:02,500", "to": "00:00:04,000" }, "text": " ครับ" }
            ]
        }"#;
        let output: WhisperOutput = serde_json::from_str(json).unwrap();
        let (segments, language, _) = collect_segments(output);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "สวัสดี");
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[1].end, 4.0);
        assert_eq!(language.as_deref(), Some("th"));
    }

    #[test]
    fn test_collect_segments_python_format() {
        let json = r#"{
            "language": "en",
            "segments": [
                { "start": 0.0, "end": 1.5, "text": " hello", "avg_logprob": -0.2 },
                { "start": 1.5, "end": 3.0, "text": " world", "avg_logprob": -0.4 }
            ]
        }"#;
        let output: WhisperOutput = serde_json::from_str(json).unwrap();
        let (segments, language, probability) = collect_segments(output);

        assert_eq!(segments.len(), 2);
        assert_eq!(language.as_deref(), Some("en"));
        // mean avg_logprob -0.3 normalized to 0.35
        let p = probability.unwrap();
        assert!((p - 0.35).abs() < 1e-9);
    }

    #[test]
    fn test_collect_segments_result_nested_format() {
        let json = r#"{
            "result": {
                "language": "en",
                "segments": [
                    { "start": 0.0, "end": 1.0, "text": " hi there" }
                ]
            }
        }"#;
        let output: WhisperOutput = serde_json::from_str(json).unwrap();
        let (segments, language, _) = collect_segments(output);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hi there");
        assert_eq!(language.as_deref(), Some("en"));
    }

    #[test]
    fn test_collect_segments_sorts_and_drops_empty() {
        let json = r#"{
            "segments": [
                { "start": 5.0, "end": 6.0, "text": "later" },
                { "start": 1.0, "end": 2.0, "text": "   " },
                { "start": 0.0, "end": 1.0, "text": "first" }
            ]
        }"#;
        let output: WhisperOutput = serde_json::from_str(json).unwrap();
        let (segments, _, _) = collect_segments(output);

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "first");
        assert_eq!(segments[1].text, "later");
    }

    #[test]
    fn test_device_resolution_honors_cpu() {
        assert_eq!(
            WhisperEngine::resolve_device(DevicePreference::Cpu),
            Device::Cpu
        );
    }

    #[tokio::test]
    async fn test_load_fails_without_backend() {
        // The probe only ever finds real whisper binaries; in a bare test
        // environment load must fail with a ModelLoad error.
        if WhisperEngine::check_command_available("whisper-cli").await
            || WhisperEngine::check_command_available("whisper-cpp").await
            || WhisperEngine::check_command_available("whisper").await
        {
            return;
        }
        let result = WhisperEngine::load(
            TranscriptionConfig::default(),
            PathBuf::from("./cache"),
        )
        .await;
        assert!(matches!(result, Err(PipelineError::ModelLoad(_))));
    }
}
