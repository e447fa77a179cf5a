//! Markdown and JSON report generation.

use crate::models::{Anomaly, KeyCount, Report, ReportMetadata, TimeBucket, VtFinding};
use anyhow::{Context, Result};

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Thorensic Log Analysis\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_summary_section(&report.analysis.summary));
    output.push_str(&generate_anomalies_section(&report.anomalies));
    output.push_str(&generate_time_series_section(&report.requests_over_time));
    output.push_str(&generate_top_section("Top Source IPs", "IP", &report.analysis.top_ips));
    output.push_str(&generate_top_section("Top Paths", "Path", &report.analysis.top_paths));
    output.push_str(&generate_threat_intel_section(report.analysis.virus_total.as_deref()));
    output.push_str(&generate_recommendations_section(&report.analysis.recommendations));
    output.push_str(&generate_footer());

    output
}

/// Generate the JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** `{}`\n", metadata.source));
    if metadata.query.trim().is_empty() {
        section.push_str("- **Query:** *(all records)*\n");
    } else {
        section.push_str(&format!("- **Query:** `{}`\n", metadata.query));
    }
    section.push_str(&format!(
        "- **Records:** {} matched of {} parsed\n",
        metadata.records_matched, metadata.records_total
    ));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    match &metadata.model_used {
        Some(model) => section.push_str(&format!("- **Narrative Model:** `{}`\n", model)),
        None => section.push_str("- **Narrative Model:** rule-based fallback\n"),
    }
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_summary_section(summary: &str) -> String {
    format!("## Summary\n\n{}\n\n", summary.trim_end())
}

fn generate_anomalies_section(anomalies: &[Anomaly]) -> String {
    let mut section = String::new();

    section.push_str("## Anomalies\n\n");
    if anomalies.is_empty() {
        section.push_str("No anomalies detected.\n\n");
        return section;
    }

    section.push_str("| Type | Description |\n");
    section.push_str("|:---|:---|\n");
    for anomaly in anomalies {
        section.push_str(&format!("| {} | {} |\n", anomaly.kind, anomaly.description));
    }
    section.push('\n');

    section
}

fn generate_time_series_section(buckets: &[TimeBucket]) -> String {
    if buckets.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Requests Over Time\n\n");
    section.push_str("| Hour (UTC) | Requests |\n");
    section.push_str("|:---|:---:|\n");
    for bucket in buckets {
        section.push_str(&format!("| {} | {} |\n", bucket.time, bucket.count));
    }
    section.push('\n');

    section
}

fn generate_top_section(title: &str, key_label: &str, entries: &[KeyCount]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str(&format!("## {}\n\n", title));
    section.push_str(&format!("| {} | Requests |\n", key_label));
    section.push_str("|:---|:---:|\n");
    for entry in entries {
        section.push_str(&format!("| `{}` | {} |\n", entry.key, entry.count));
    }
    section.push('\n');

    section
}

fn generate_threat_intel_section(findings: Option<&[VtFinding]>) -> String {
    let Some(findings) = findings else {
        return String::new();
    };

    let mut section = String::new();
    section.push_str("## Threat Intelligence\n\n");

    if findings.is_empty() {
        section.push_str("No reputation data returned for the checked indicators.\n\n");
        return section;
    }

    section.push_str("| Indicator | Malicious | Suspicious | Country | Last Analysis |\n");
    section.push_str("|:---|:---:|:---:|:---:|:---|\n");
    for finding in findings {
        let country = finding.country.as_deref().unwrap_or("-");
        let last_analysis = finding
            .last_analysis
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} |\n",
            finding.ioc, finding.malicious, finding.suspicious, country, last_analysis
        ));
    }
    section.push('\n');

    section
}

fn generate_recommendations_section(recommendations: &[String]) -> String {
    if recommendations.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Recommendations\n\n");
    for (i, recommendation) in recommendations.iter().enumerate() {
        section.push_str(&format!("{}. {}\n", i + 1, recommendation.trim()));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Generated by Thorensic v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnalysisReport, AnomalyKind};
    use chrono::{TimeZone, Utc};

    fn sample_report() -> Report {
        Report {
            metadata: ReportMetadata {
                source: "access.jsonl".to_string(),
                query: "status:>499".to_string(),
                records_total: 5000,
                records_matched: 120,
                analysis_date: Utc.with_ymd_and_hms(2025, 11, 3, 19, 30, 0).unwrap(),
                model_used: None,
                duration_seconds: 2.4,
            },
            analysis: AnalysisReport {
                summary: "Total: 120, 5xx: 120 (100.0%), 4xx: 0 (0.0%)".to_string(),
                top_paths: vec![KeyCount { key: "/api/users".to_string(), count: 80 }],
                top_ips: vec![KeyCount { key: "192.0.2.77".to_string(), count: 64 }],
                recommendations: vec![
                    "Investigate 120 5xx errors (100.0% of traffic)".to_string(),
                    "Monitor IP 192.0.2.77 - 53.3% of requests".to_string(),
                ],
                virus_total: Some(vec![VtFinding {
                    ioc: "192.0.2.77".to_string(),
                    malicious: 4,
                    suspicious: 1,
                    country: Some("RU".to_string()),
                    last_analysis: Some(Utc.with_ymd_and_hms(2025, 11, 1, 0, 0, 0).unwrap()),
                }]),
            },
            anomalies: vec![Anomaly {
                kind: AnomalyKind::SingleIpDominance,
                description: "192.0.2.77 accounts for 53.3% of requests".to_string(),
            }],
            requests_over_time: vec![
                TimeBucket { time: "2025-11-03 18:00:00".to_string(), count: 40 },
                TimeBucket { time: "2025-11-03 19:00:00".to_string(), count: 80 },
            ],
        }
    }

    #[test]
    fn test_markdown_report_contains_all_sections() {
        let output = generate_markdown_report(&sample_report());

        assert!(output.starts_with("# Thorensic Log Analysis"));
        assert!(output.contains("- **Query:** `status:>499`"));
        assert!(output.contains("- **Records:** 120 matched of 5000 parsed"));
        assert!(output.contains("- **Narrative Model:** rule-based fallback"));
        assert!(output.contains("## Anomalies"));
        assert!(output.contains("| Single IP Dominance |"));
        assert!(output.contains("## Requests Over Time"));
        assert!(output.contains("| 2025-11-03 19:00:00 | 80 |"));
        assert!(output.contains("## Threat Intelligence"));
        assert!(output.contains("| `192.0.2.77` | 4 | 1 | RU | 2025-11-01 |"));
        assert!(output.contains("1. Investigate 120 5xx errors"));
        assert!(output.contains("*Generated by Thorensic v"));
    }

    #[test]
    fn test_markdown_report_without_enrichment_omits_section() {
        let mut report = sample_report();
        report.analysis.virus_total = None;
        let output = generate_markdown_report(&report);
        assert!(!output.contains("## Threat Intelligence"));
    }

    #[test]
    fn test_markdown_empty_enrichment_renders_placeholder() {
        let mut report = sample_report();
        report.analysis.virus_total = Some(vec![]);
        let output = generate_markdown_report(&report);
        assert!(output.contains("No reputation data returned"));
    }

    #[test]
    fn test_json_report_round_trips() {
        let report = sample_report();
        let json = generate_json_report(&report).unwrap();
        let parsed: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["analysis"].get("topIPs").is_some());
        assert!(value["metadata"].get("recordsMatched").is_some());
    }
}
