//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::{Path, PathBuf};

/// Thorensic - AI-assisted access-log analyzer
///
/// Filter JSON-lines access logs with a small query language, compute
/// statistics and anomaly flags, enrich top source IPs via VirusTotal,
/// and summarize the result with Gemini (or a deterministic fallback).
///
/// Examples:
///   thorensic --log access.jsonl
///   thorensic --log access.jsonl -q "status:>499 AND path:/api"
///   thorensic --log ./logs/ -q "verb:POST" --format json -o report.json
///   thorensic --log access.jsonl --dry-run
///   thorensic --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to a JSON-lines log file, or a directory of log files
    ///
    /// Not required when using --init-config.
    #[arg(short, long, value_name = "PATH", required_unless_present = "init_config")]
    pub log: Option<PathBuf>,

    /// Filter expression, e.g. "status:>499 AND path:/login"
    ///
    /// Tokens are `field:value` (case-insensitive substring) or
    /// `field:>N` / `field:<N` (numeric), joined with AND/OR and
    /// evaluated left to right. Empty matches every record.
    #[arg(short, long, default_value = "", value_name = "EXPR")]
    pub query: String,

    /// Output file path for the report
    #[arg(short, long, default_value = "thorensic_report.md", value_name = "FILE")]
    pub output: PathBuf,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Gemini model used for the narrative summary
    #[arg(short, long, default_value = "gemini-1.5-flash", env = "THORENSIC_MODEL")]
    pub model: String,

    /// Gemini API key for the narrative summary
    ///
    /// Without a key the deterministic rule-based summary is used.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub gemini_key: Option<String>,

    /// VirusTotal API key for threat-intelligence enrichment
    ///
    /// Without a key enrichment is skipped entirely.
    #[arg(long, env = "VT_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub vt_key: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .thorensic.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds for outbound API calls
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip VirusTotal enrichment even if a key is configured
    #[arg(long)]
    pub no_enrich: bool,

    /// Skip the AI narrative and always use the rule-based summary
    #[arg(long)]
    pub no_ai: bool,

    /// Exit with code 2 when anomalies are detected
    ///
    /// Useful for CI pipelines and scheduled checks.
    #[arg(long)]
    pub fail_on_anomaly: bool,

    /// Parse and query the logs, print statistics, make no API calls
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .thorensic.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(long)]
    pub quiet: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the log path, empty if not set (should be validated first).
    pub fn log_path(&self) -> &Path {
        self.log.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref log_path) = self.log {
            if !log_path.exists() {
                return Err(format!("Log path does not exist: {}", log_path.display()));
            }
        } else {
            return Err("A log file or directory is required".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
