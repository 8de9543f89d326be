use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

/// Lines shorter than this are too generic to flag as duplicates.
const MIN_TEXT_LEN: usize = 10;

const TIMESTAMP_LINE: &str = r"^\[\d+\.\d{2}s → \d+\.\d{2}s\]\s*(.*)$";

/// One repeated segment text and how often it appeared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateLine {
    pub text: String,
    pub count: usize,
}

/// Duplicates found in one transcript file
#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub duplicates: Vec<DuplicateLine>,
}

/// Result of scanning an output tree for repeated transcript lines.
///
/// Repeated long lines in a timestamped transcript are a symptom of decoder
/// hallucination loops; the checker reports them, it never rewrites files.
#[derive(Debug, Clone)]
pub struct DuplicateReport {
    pub files_checked: usize,
    pub flagged: Vec<FileReport>,
}

impl DuplicateReport {
    pub fn is_clean(&self) -> bool {
        self.flagged.is_empty()
    }
}

impl fmt::Display for DuplicateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.files_checked == 0 {
            return write!(f, "No timestamped transcripts found");
        }
        if self.is_clean() {
            return write!(
                f,
                "No duplicate lines found in {} transcript file(s)",
                self.files_checked
            );
        }

        write!(f, "Files with duplicate lines: {}", self.flagged.len())?;
        for file in &self.flagged {
            let stem = file
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            write!(f, "\n   • {}", stem.trim_end_matches("_timestamped"))?;
        }
        Ok(())
    }
}

/// Strip the `[<start>s → <end>s]` prefix from a transcript line.
fn segment_text<'a>(line: &'a str, re: &Regex) -> &'a str {
    match re.captures(line.trim()) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(""),
        None => line.trim(),
    }
}

/// Check a single timestamped transcript for repeated segment texts.
pub fn check_file(path: &Path) -> Result<Vec<DuplicateLine>> {
    let re = Regex::new(TIMESTAMP_LINE).unwrap();
    let content = std::fs::read_to_string(path)?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for line in content.lines() {
        let text = segment_text(line, &re);
        if text.chars().count() >= MIN_TEXT_LEN {
            *counts.entry(text.to_string()).or_insert(0) += 1;
        }
    }

    let mut duplicates: Vec<DuplicateLine> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(text, count)| DuplicateLine { text, count })
        .collect();
    duplicates.sort_by(|a, b| a.text.cmp(&b.text));
    Ok(duplicates)
}

/// Scan all `*_timestamped.txt` files under `output_dir`.
pub fn check_output_dir(output_dir: &Path) -> Result<DuplicateReport> {
    let mut report = DuplicateReport {
        files_checked: 0,
        flagged: Vec::new(),
    };

    if !output_dir.is_dir() {
        return Ok(report);
    }

    let mut transcripts: Vec<PathBuf> = WalkDir::new(output_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_timestamped.txt"))
                .unwrap_or(false)
        })
        .collect();
    transcripts.sort();

    for path in transcripts {
        report.files_checked += 1;
        let duplicates = check_file(&path)?;
        if !duplicates.is_empty() {
            report.flagged.push(FileReport { path, duplicates });
        }
    }

    Ok(report)
}
