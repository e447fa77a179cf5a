//! Thorensic - AI-assisted access-log analyzer
//!
//! A CLI tool that filters JSON-lines access logs with a small query
//! language, computes statistics and anomaly flags, enriches top
//! source IPs through VirusTotal, and summarizes the result with
//! Gemini or a deterministic rule-based fallback.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad input, unreadable logs, config failure, etc.)
//!   2 - Anomalies detected with --fail-on-anomaly set

mod ai;
mod analysis;
mod cli;
mod config;
mod enrich;
mod ingest;
mod models;
mod query;
mod report;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::LogRecord;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Thorensic v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the analysis
    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .thorensic.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".thorensic.toml");

    if path.exists() {
        eprintln!("⚠️  .thorensic.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .thorensic.toml")?;

    println!("✅ Created .thorensic.toml with default settings.");
    println!("   Edit it to customize the model, endpoints, and ingestion rules.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete analysis workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let log_path = args.log_path().to_path_buf();

    // Step 1: Load the logs
    println!("📥 Loading logs from: {}", log_path.display());
    let ingest_config = ingest::IngestConfig::from(&config.ingest);
    let loaded = ingest::load_path(&log_path, &ingest_config)?;
    info!("Parsed {} records from {} files", loaded.records.len(), loaded.files);

    let skipped_note = if loaded.skipped_lines > 0 {
        format!(", {} malformed line(s) skipped", loaded.skipped_lines)
    } else {
        String::new()
    };
    println!(
        "   {} records from {} file(s){}",
        loaded.records.len(),
        loaded.files,
        skipped_note
    );

    // Step 2: Apply the query
    let matched = query::run_query(&loaded.records, &args.query);
    if args.query.trim().is_empty() {
        println!("🔎 No query - analyzing all {} records", matched.len());
    } else {
        println!(
            "🔎 Query `{}` matched {} of {} records",
            args.query,
            matched.len(),
            loaded.records.len()
        );
    }

    // Handle --dry-run: statistics only, no network
    if args.dry_run {
        return handle_dry_run(&matched);
    }

    // Step 3: Set up the collaborators
    let vt_client = if args.no_enrich {
        None
    } else {
        config.virustotal.api_key.clone().map(|key| {
            enrich::VtClient::new(enrich::VtConfig {
                api_key: Some(key),
                endpoint: config.virustotal.endpoint.clone(),
                timeout_seconds: config.virustotal.timeout_seconds,
            })
        })
    };

    let narrator = if args.no_ai {
        None
    } else {
        config.model.api_key.clone().map(|key| {
            ai::GeminiClient::new(ai::GeminiConfig {
                api_key: key,
                endpoint: config.model.endpoint.clone(),
                model: config.model.name.clone(),
                temperature: config.model.temperature,
                timeout_seconds: config.model.timeout_seconds,
            })
        })
    };
    let model_used = narrator.as_ref().map(|_| config.model.name.clone());

    println!(
        "🤖 Narrative: {}",
        model_used.as_deref().unwrap_or("rule-based fallback")
    );
    println!(
        "🛡️  Threat intel: {}",
        if vt_client.is_some() { "VirusTotal" } else { "disabled" }
    );

    // Step 4: Run the analysis pipeline
    let spinner = make_spinner(args.quiet);
    let mut analyzer = ai::Analyzer::new(vt_client, narrator);
    let outcome = analyzer
        .analyze(ai::AnalyzeRequest {
            records: &loaded.records,
            query: &args.query,
            top_ips: None,
            top_paths: None,
        })
        .await;
    spinner.finish_and_clear();

    // Step 5: Build and write the report
    println!("\n📝 Generating report...");

    let duration = start_time.elapsed().as_secs_f64();
    let metadata = models::ReportMetadata {
        source: log_path.display().to_string(),
        query: args.query.clone(),
        records_total: loaded.records.len(),
        records_matched: outcome.stats.total as usize,
        analysis_date: Utc::now(),
        model_used,
        duration_seconds: duration,
    };

    let report = models::Report {
        metadata,
        anomalies: outcome.stats.anomalies.clone(),
        requests_over_time: analysis::time_buckets(&matched),
        analysis: outcome.report,
    };

    let output_text = match args.format {
        OutputFormat::Markdown => report::generate_markdown_report(&report),
        OutputFormat::Json => report::generate_json_report(&report)?,
    };

    std::fs::write(&args.output, &output_text)
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;

    // Print summary
    println!("\n📊 Analysis Summary:");
    println!("   Matched records: {}", outcome.stats.total);
    println!(
        "   5xx: {} | 4xx: {}",
        outcome.stats.server_errors, outcome.stats.client_errors
    );
    println!("   Anomalies: {}", outcome.stats.anomalies.len());
    if let Some(findings) = &outcome.stats.virus_total {
        let flagged = findings.iter().filter(|f| f.malicious > 0).count();
        println!(
            "   Threat intel: {} finding(s), {} flagged malicious",
            findings.len(),
            flagged
        );
    }
    println!("   Duration: {:.1}s", duration);
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        args.output.display()
    );

    // Check --fail-on-anomaly
    if args.fail_on_anomaly && !outcome.stats.anomalies.is_empty() {
        eprintln!(
            "\n⛔ {} anomaly(ies) detected. Failing (exit code 2).",
            outcome.stats.anomalies.len()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Handle --dry-run: print query statistics and exit.
fn handle_dry_run(matched: &[LogRecord]) -> Result<i32> {
    println!("\n🔍 Dry run: statistics only (no API calls)...\n");

    let counts = analysis::error_counts(matched);
    println!("   Total matched: {}", counts.total);
    println!("   5xx: {} | 4xx: {}", counts.server_errors, counts.client_errors);

    let top_ips = analysis::top_n(analysis::tally(matched, "ip"), 5);
    let top_paths = analysis::top_n(analysis::tally(matched, "path"), 5);
    let anomalies = analysis::detect_anomalies(&counts, &top_ips);

    if !top_ips.is_empty() {
        println!("\n   Top source IPs:");
        for entry in &top_ips {
            println!("     {:>6}  {}", entry.count, entry.key);
        }
    }

    if !top_paths.is_empty() {
        println!("\n   Top paths:");
        for entry in &top_paths {
            println!("     {:>6}  {}", entry.count, entry.key);
        }
    }

    if !anomalies.is_empty() {
        println!("\n   Anomalies:");
        for anomaly in &anomalies {
            println!("     ⚠️  {}: {}", anomaly.kind, anomaly.description);
        }
    }

    println!("\n✅ Dry run complete. No API calls were made.");
    Ok(0)
}

/// Build the progress spinner shown while the pipeline runs.
fn make_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}").expect("valid spinner template"),
    );
    spinner.set_message("Analyzing...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .thorensic.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
