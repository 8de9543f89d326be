use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;

use whisper_batch::{
    BatchProcessor, BatchSource, ConfigBuilder, Device, FileStage, FileStatus, MediaTrimmer,
    PipelineError, Segment, TranscriptionEngine, TranscriptionResult,
};

/// Scripted engine: returns a fixed Thai transcript, optionally failing for
/// inputs whose path contains a marker substring.
struct MockEngine {
    fail_marker: Option<String>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockEngine {
    fn new() -> Self {
        Self {
            fail_marker: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl TranscriptionEngine for MockEngine {
    async fn transcribe(&self, audio_path: &Path) -> whisper_batch::Result<TranscriptionResult> {
        self.calls.lock().unwrap().push(audio_path.to_path_buf());
        if let Some(marker) = &self.fail_marker {
            if audio_path.to_string_lossy().contains(marker.as_str()) {
                return Err(PipelineError::Transcription(format!(
                    "decode failed for {}",
                    audio_path.display()
                )));
            }
        }
        Ok(TranscriptionResult::new(
            "th".to_string(),
            0.95,
            4.0,
            vec![
                Segment::new(0.0, 2.5, "สวัสดี"),
                Segment::new(2.5, 4.0, "ครับ"),
            ],
        ))
    }

    async fn transcribe_with_language(
        &self,
        audio_path: &Path,
        _language: &str,
    ) -> whisper_batch::Result<TranscriptionResult> {
        self.transcribe(audio_path).await
    }

    fn model_name(&self) -> &str {
        "mock"
    }

    fn device(&self) -> Device {
        Device::Cpu
    }
}

/// Fake trimmer writing a marker file, optionally failing every call.
struct FakeTrimmer {
    trimmed_dir: PathBuf,
    fail: bool,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeTrimmer {
    fn new(trimmed_dir: PathBuf) -> Self {
        Self {
            trimmed_dir,
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing(trimmed_dir: PathBuf) -> Self {
        Self {
            trimmed_dir,
            fail: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn calls(&self) -> Arc<Mutex<Vec<PathBuf>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl MediaTrimmer for FakeTrimmer {
    async fn trim(
        &self,
        input: &Path,
        _max_duration: Duration,
    ) -> whisper_batch::Result<PathBuf> {
        self.calls.lock().unwrap().push(input.to_path_buf());
        if self.fail {
            return Err(PipelineError::Trim("simulated trim failure".to_string()));
        }
        std::fs::create_dir_all(&self.trimmed_dir).unwrap();
        let stem = input.file_stem().unwrap().to_string_lossy();
        let out = self.trimmed_dir.join(format!("{}_trimmed.mp3", stem));
        std::fs::write(&out, b"trimmed audio").unwrap();
        Ok(out)
    }
}

async fn touch_audio(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.unwrap();
    }
    fs::write(&path, b"fake audio bytes").await.unwrap();
    path
}

#[tokio::test]
async fn test_batch_outcomes_follow_input_order() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("output");
    let a = touch_audio(temp_dir.path(), "a.mp3").await;
    let b = touch_audio(temp_dir.path(), "b.mp3").await;
    let c = touch_audio(temp_dir.path(), "c.mp3").await;

    let config = ConfigBuilder::new()
        .with_output_dir(out_dir.clone())
        .build()
        .unwrap();
    let processor = BatchProcessor::new(config, MockEngine::new());

    let source = BatchSource::Files(vec![a.clone(), b.clone(), c.clone()]);
    let outcomes = processor.run_batch(&source).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].input, a);
    assert_eq!(outcomes[1].input, b);
    assert_eq!(outcomes[2].input, c);
    assert!(outcomes.iter().all(|o| o.succeeded()));

    let ts = fs::read_to_string(out_dir.join("a_timestamped.txt"))
        .await
        .unwrap();
    assert_eq!(ts, "[0.00s → 2.50s] สวัสดี\n[2.50s → 4.00s] ครับ\n");
    let plain = fs::read_to_string(out_dir.join("a_plain.txt")).await.unwrap();
    assert_eq!(plain, "สวัสดี ครับ\n");
}

#[tokio::test]
async fn test_missing_file_does_not_abort_batch() {
    let temp_dir = TempDir::new().unwrap();
    let a = touch_audio(temp_dir.path(), "a.mp3").await;
    let missing = temp_dir.path().join("missing.mp3");
    let c = touch_audio(temp_dir.path(), "c.mp3").await;

    let config = ConfigBuilder::new()
        .with_output_dir(temp_dir.path().join("output"))
        .build()
        .unwrap();
    let processor = BatchProcessor::new(config, MockEngine::new());

    let source = BatchSource::Files(vec![a, missing.clone(), c]);
    let outcomes = processor.run_batch(&source).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].succeeded());
    assert!(outcomes[2].succeeded());

    let failed = &outcomes[1];
    assert_eq!(failed.status, FileStatus::Failed);
    assert_eq!(failed.input, missing);
    assert!(failed
        .error
        .as_deref()
        .unwrap()
        .contains("Audio input not found"));
}

#[tokio::test]
async fn test_engine_failure_is_isolated_to_one_file() {
    let temp_dir = TempDir::new().unwrap();
    let a = touch_audio(temp_dir.path(), "good.mp3").await;
    let b = touch_audio(temp_dir.path(), "broken.mp3").await;

    let config = ConfigBuilder::new()
        .with_output_dir(temp_dir.path().join("output"))
        .build()
        .unwrap();
    let processor = BatchProcessor::new(config, MockEngine::failing_on("broken"));

    let outcomes = processor
        .run_batch(&BatchSource::Files(vec![a, b]))
        .await
        .unwrap();

    assert!(outcomes[0].succeeded());
    assert_eq!(outcomes[1].status, FileStatus::Failed);
    assert!(outcomes[1]
        .error
        .as_deref()
        .unwrap()
        .contains("Transcription failed"));
}

#[tokio::test]
async fn test_directory_mode_filters_and_mirrors_structure() {
    let temp_dir = TempDir::new().unwrap();
    let audio_root = temp_dir.path().join("audio");
    touch_audio(&audio_root, "a.mp3").await;
    touch_audio(&audio_root, "b.txt").await;
    touch_audio(&audio_root, "survey/c.WAV").await;

    let out_dir = temp_dir.path().join("output");
    let config = ConfigBuilder::new()
        .with_output_dir(out_dir.clone())
        .build()
        .unwrap();
    let processor = BatchProcessor::new(config, MockEngine::new());

    let outcomes = processor
        .run_batch(&BatchSource::Directory(audio_root))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.succeeded()));

    // top-level input lands in the base dir, nested input in a mirrored subdir
    assert!(out_dir.join("a_timestamped.txt").exists());
    assert!(out_dir.join("survey/c_timestamped.txt").exists());
    assert!(out_dir.join("survey/c_plain.txt").exists());
}

#[tokio::test]
async fn test_trimmer_feeds_trimmed_file_to_engine() {
    let temp_dir = TempDir::new().unwrap();
    let input = touch_audio(temp_dir.path(), "long.mp3").await;

    let mut config = ConfigBuilder::new()
        .with_output_dir(temp_dir.path().join("output"))
        .with_trim(180)
        .build()
        .unwrap();
    config.trim.output_dir = temp_dir.path().join("trimmed");

    let engine = MockEngine::new();
    let engine_calls = engine.calls();
    let trimmer = FakeTrimmer::new(temp_dir.path().join("trimmed"));
    let trimmer_calls = trimmer.calls();

    let processor = BatchProcessor::new(config, engine).with_trimmer(Box::new(trimmer));
    let outcomes = processor
        .run_batch(&BatchSource::Files(vec![input.clone()]))
        .await
        .unwrap();

    assert!(outcomes[0].succeeded());
    assert!(outcomes[0].stages_completed.contains(&FileStage::Trimmed));
    assert_eq!(trimmer_calls.lock().unwrap().clone(), vec![input]);

    let decoded = engine_calls.lock().unwrap();
    assert_eq!(decoded.len(), 1);
    assert!(decoded[0].ends_with("long_trimmed.mp3"));
}

#[tokio::test]
async fn test_trim_failure_falls_back_to_original() {
    let temp_dir = TempDir::new().unwrap();
    let input = touch_audio(temp_dir.path(), "long.mp3").await;

    let config = ConfigBuilder::new()
        .with_output_dir(temp_dir.path().join("output"))
        .with_trim(180)
        .build()
        .unwrap();

    let engine = MockEngine::new();
    let engine_calls = engine.calls();
    let trimmer = FakeTrimmer::failing(temp_dir.path().join("trimmed"));

    let processor = BatchProcessor::new(config, engine).with_trimmer(Box::new(trimmer));
    let outcomes = processor
        .run_batch(&BatchSource::Files(vec![input.clone()]))
        .await
        .unwrap();

    assert!(outcomes[0].succeeded());
    assert!(!outcomes[0].stages_completed.contains(&FileStage::Trimmed));

    // the untrimmed original went to the engine
    assert_eq!(engine_calls.lock().unwrap().clone(), vec![input]);
}

#[tokio::test]
async fn test_batch_report_is_persisted() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("output");
    let a = touch_audio(temp_dir.path(), "a.mp3").await;

    let config = ConfigBuilder::new()
        .with_output_dir(out_dir.clone())
        .build()
        .unwrap();
    let processor = BatchProcessor::new(config, MockEngine::new());
    processor
        .run_batch(&BatchSource::Files(vec![a]))
        .await
        .unwrap();

    let report = fs::read_to_string(out_dir.join("processing_results.json"))
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert_eq!(parsed["total"], 1);
    assert_eq!(parsed["succeeded"], 1);
    assert_eq!(parsed["failed"], 0);
}

#[tokio::test]
async fn test_rerun_overwrites_outputs_identically() {
    let temp_dir = TempDir::new().unwrap();
    let out_dir = temp_dir.path().join("output");
    let a = touch_audio(temp_dir.path(), "a.mp3").await;

    let config = ConfigBuilder::new()
        .with_output_dir(out_dir.clone())
        .build()
        .unwrap();
    let processor = BatchProcessor::new(config, MockEngine::new());
    let source = BatchSource::Files(vec![a]);

    processor.run_batch(&source).await.unwrap();
    let first = fs::read_to_string(out_dir.join("a_timestamped.txt"))
        .await
        .unwrap();

    processor.run_batch(&source).await.unwrap();
    let second = fs::read_to_string(out_dir.join("a_timestamped.txt"))
        .await
        .unwrap();

    assert_eq!(first, second);
}
