use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// Capability interface for cutting an audio file down to a bounded duration.
///
/// The production implementation shells out to ffmpeg; tests substitute a fake.
#[async_trait]
pub trait MediaTrimmer: Send + Sync {
    /// Trim `input` to the first `max_duration` and return the path of the
    /// trimmed copy. The input file is never modified.
    async fn trim(&self, input: &Path, max_duration: Duration) -> Result<PathBuf>;
}

/// FFmpeg-based trimmer. Tries a stream copy first (no re-encode), then
/// falls back to re-encoding when the container refuses the copy.
#[derive(Debug, Clone)]
pub struct FfmpegTrimmer {
    trimmed_dir: PathBuf,
}

impl FfmpegTrimmer {
    pub fn new(trimmed_dir: PathBuf) -> Self {
        Self { trimmed_dir }
    }

    /// Output path for a trimmed copy: `<trimmed_dir>/<stem>_trimmed.<ext>`
    pub fn output_path_for(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_else(|| "wav".to_string());
        self.trimmed_dir.join(format!("{}_trimmed.{}", stem, ext))
    }

    async fn run_ffmpeg_trim(
        &self,
        input: &Path,
        output: &Path,
        seconds: &str,
        stream_copy: bool,
    ) -> Result<bool> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-i").arg(input).arg("-t").arg(seconds);
        if stream_copy {
            cmd.arg("-c").arg("copy");
        }
        cmd.arg("-y").arg(output);
        cmd.stdout(Stdio::null()).stderr(Stdio::null());

        let status = cmd
            .status()
            .await
            .map_err(|e| PipelineError::Trim(format!("failed to run ffmpeg: {}", e)))?;
        Ok(status.success())
    }
}

#[async_trait]
impl MediaTrimmer for FfmpegTrimmer {
    async fn trim(&self, input: &Path, max_duration: Duration) -> Result<PathBuf> {
        if max_duration.is_zero() {
            return Err(PipelineError::Trim(
                "trim duration must be greater than 0".to_string(),
            ));
        }
        if !input.exists() {
            return Err(PipelineError::InputNotFound(input.to_path_buf()));
        }

        tokio::fs::create_dir_all(&self.trimmed_dir).await?;
        let output = self.output_path_for(input);
        let seconds = format!("{}", max_duration.as_secs_f64());

        info!(
            "✂️ Trimming {} to first {}s",
            input.display(),
            max_duration.as_secs()
        );

        if self.run_ffmpeg_trim(input, &output, &seconds, true).await? {
            info!("✅ Trimmed audio saved to: {}", output.display());
            return Ok(output);
        }

        warn!(
            "Stream copy failed for {}, retrying with re-encode",
            input.display()
        );

        if self.run_ffmpeg_trim(input, &output, &seconds, false).await? {
            info!("✅ Trimmed audio saved to: {}", output.display());
            return Ok(output);
        }

        Err(PipelineError::Trim(format!(
            "ffmpeg could not trim {}",
            input.display()
        )))
    }
}

/// Probe the container duration of an audio file with ffprobe.
pub async fn probe_duration(audio_path: &Path) -> Result<Duration> {
    let output = Command::new("ffprobe")
        .args(["-v", "quiet", "-print_format", "json", "-show_format"])
        .arg(audio_path)
        .output()
        .await
        .map_err(|e| PipelineError::UnsupportedFormat(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        return Err(PipelineError::UnsupportedFormat(format!(
            "ffprobe failed for {}",
            audio_path.display()
        )));
    }

    let ffprobe_data: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| PipelineError::UnsupportedFormat(format!("ffprobe output: {}", e)))?;

    let duration_seconds: f64 = ffprobe_data["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0.0);

    Ok(Duration::from_secs_f64(duration_seconds))
}

/// Convert an audio file to 16kHz mono PCM WAV for decoder compatibility.
/// The converted file lands in `cache_dir` and is the caller's to clean up.
pub async fn convert_to_wav(input: &Path, cache_dir: &Path) -> Result<PathBuf> {
    if !input.exists() {
        return Err(PipelineError::InputNotFound(input.to_path_buf()));
    }

    tokio::fs::create_dir_all(cache_dir).await?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    let wav_path = cache_dir.join(format!("{}_temp.wav", stem));

    info!("🎵 Converting {} to WAV", input.display());

    let status = Command::new("ffmpeg")
        .arg("-i")
        .arg(input)
        .args([
            "-vn", // No video stream
            "-acodec", "pcm_s16le", // 16-bit PCM
            "-ar", "16000", // 16kHz, optimal for Whisper
            "-ac", "1", // Mono channel
            "-f", "wav", "-y",
        ])
        .arg(&wav_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| PipelineError::UnsupportedFormat(format!("failed to run ffmpeg: {}", e)))?;

    if !status.success() {
        return Err(PipelineError::UnsupportedFormat(format!(
            "WAV conversion failed for {}",
            input.display()
        )));
    }

    Ok(wav_path)
}

/// Preflight check for ffmpeg in PATH.
pub async fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
