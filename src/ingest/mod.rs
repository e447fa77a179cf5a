//! Log ingestion.
//!
//! Accepts a single JSON-lines file or a directory of log files, and
//! parses one JSON object per line. Malformed lines are counted and
//! skipped rather than failing the whole load.

use crate::models::LogRecord;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Settings for file discovery.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Extensions accepted when walking a directory (without dot).
    pub extensions: Vec<String>,
    /// Cap on the number of files collected from a directory.
    pub max_files: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["jsonl", "ndjson", "log"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_files: None,
        }
    }
}

impl From<&crate::config::IngestSettings> for IngestConfig {
    fn from(settings: &crate::config::IngestSettings) -> Self {
        Self {
            extensions: settings.extensions.clone(),
            max_files: Some(settings.max_files),
        }
    }
}

/// Result of loading one or more log files.
#[derive(Debug, Clone)]
pub struct LoadedLogs {
    pub records: Vec<LogRecord>,
    /// Number of files the records came from.
    pub files: usize,
    /// Lines that were not valid JSON objects.
    pub skipped_lines: usize,
}

/// Resolve a path to the list of log files to read.
///
/// A file path is returned as-is; a directory is walked recursively,
/// filtered by extension, in file-name order.
pub fn collect_log_files(path: &Path, config: &IngestConfig) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("Log path does not exist: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let extension = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        if config.extensions.iter().any(|e| e == extension) {
            files.push(entry.into_path());
        }
    }

    if let Some(max) = config.max_files {
        files.truncate(max);
    }

    if files.is_empty() {
        anyhow::bail!(
            "No log files with extensions {:?} under {}",
            config.extensions,
            path.display()
        );
    }

    Ok(files)
}

/// Parse all files as JSON lines.
pub fn load_records(files: &[PathBuf]) -> Result<LoadedLogs> {
    let mut records = Vec::new();
    let mut skipped_lines = 0usize;

    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read log file: {}", file.display()))?;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(value) if value.is_object() => records.push(value),
                Ok(_) => {
                    skipped_lines += 1;
                    debug!("Skipping non-object line in {}", file.display());
                }
                Err(e) => {
                    skipped_lines += 1;
                    debug!("Skipping malformed line in {}: {}", file.display(), e);
                }
            }
        }
    }

    if skipped_lines > 0 {
        warn!("Skipped {} malformed log lines", skipped_lines);
    }

    Ok(LoadedLogs { records, files: files.len(), skipped_lines })
}

/// Convenience wrapper: discover files under `path` and load them.
pub fn load_path(path: &Path, config: &IngestConfig) -> Result<LoadedLogs> {
    let files = collect_log_files(path, config)?;
    load_records(&files)
}
