use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::transcription::engine::TranscriptionResult;

/// Paths of the two transcript files written for one input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputPaths {
    pub timestamped: PathBuf,
    pub plain: PathBuf,
}

/// Render the timestamped form: one line per segment,
/// `[<start>s → <end>s] <text>` with two fractional digits.
///
/// Segments are rendered in the order received; out-of-order input from a
/// misbehaving engine is passed through untouched.
pub fn render_timestamped(result: &TranscriptionResult) -> String {
    let mut lines = Vec::with_capacity(result.segments.len());
    for seg in &result.segments {
        lines.push(format!("[{:.2}s → {:.2}s] {}", seg.start, seg.end, seg.text));
    }
    lines.join("\n")
}

/// Render the plain form: segment texts joined by single spaces,
/// outer whitespace trimmed.
pub fn render_plain(result: &TranscriptionResult) -> String {
    result
        .segments
        .iter()
        .map(|seg| seg.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Write both transcript renderings for `base_name` into `output_dir`,
/// creating the directory if needed and overwriting existing files.
///
/// The two writes are independent; on failure the first file may exist
/// without the second.
pub async fn write_outputs(
    result: &TranscriptionResult,
    base_name: &str,
    output_dir: &Path,
) -> Result<OutputPaths> {
    tokio::fs::create_dir_all(output_dir).await.map_err(|e| {
        PipelineError::OutputWrite(format!("cannot create {}: {}", output_dir.display(), e))
    })?;

    let timestamped = output_dir.join(format!("{}_timestamped.txt", base_name));
    let plain = output_dir.join(format!("{}_plain.txt", base_name));

    let mut timestamped_text = render_timestamped(result);
    if !timestamped_text.is_empty() {
        timestamped_text.push('\n');
    }
    tokio::fs::write(&timestamped, timestamped_text)
        .await
        .map_err(|e| {
            PipelineError::OutputWrite(format!("cannot write {}: {}", timestamped.display(), e))
        })?;

    let mut plain_text = render_plain(result);
    if !plain_text.is_empty() {
        plain_text.push('\n');
    }
    tokio::fs::write(&plain, plain_text).await.map_err(|e| {
        PipelineError::OutputWrite(format!("cannot write {}: {}", plain.display(), e))
    })?;

    info!("💾 Transcript saved: {}", timestamped.display());
    info!("💾 Transcript saved: {}", plain.display());

    Ok(OutputPaths { timestamped, plain })
}
