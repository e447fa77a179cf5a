//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.thorensic.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralSettings,

    /// Narrative model settings.
    #[serde(default)]
    pub model: ModelSettings,

    /// VirusTotal settings.
    #[serde(default)]
    pub virustotal: VirusTotalSettings,

    /// Log ingestion settings.
    #[serde(default)]
    pub ingest: IngestSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "thorensic_report.md".to_string()
}

/// Narrative model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Gemini model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Gemini API base URL.
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    /// API key; the CLI flag / GEMINI_API_KEY env var takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            name: default_model(),
            endpoint: default_model_endpoint(),
            api_key: None,
            temperature: default_temperature(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    crate::ai::gemini::DEFAULT_MODEL.to_string()
}

fn default_model_endpoint() -> String {
    crate::ai::gemini::DEFAULT_ENDPOINT.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model_timeout() -> u64 {
    60
}

/// VirusTotal client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirusTotalSettings {
    /// API base URL.
    #[serde(default = "default_vt_endpoint")]
    pub endpoint: String,

    /// API key; the CLI flag / VT_API_KEY env var takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_vt_timeout")]
    pub timeout_seconds: u64,
}

impl Default for VirusTotalSettings {
    fn default() -> Self {
        Self {
            endpoint: default_vt_endpoint(),
            api_key: None,
            timeout_seconds: default_vt_timeout(),
        }
    }
}

fn default_vt_endpoint() -> String {
    crate::enrich::virustotal::DEFAULT_ENDPOINT.to_string()
}

fn default_vt_timeout() -> u64 {
    30
}

/// Log ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// File extensions picked up when reading a directory.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Maximum number of files to read from a directory.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            max_files: default_max_files(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec!["jsonl", "ndjson", "log"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_files() -> usize {
    100
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".thorensic.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Model name always comes from the CLI (it has a default there).
        self.model.name = args.model.clone();

        if let Some(ref key) = args.gemini_key {
            self.model.api_key = Some(key.clone());
        }
        if let Some(ref key) = args.vt_key {
            self.virustotal.api_key = Some(key.clone());
        }

        // Timeout - only override if explicitly provided via CLI
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
            self.virustotal.timeout_seconds = timeout;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
