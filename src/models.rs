//! Data models for the log analyzer.
//!
//! This module contains the core data structures shared across the
//! query engine, the analysis pipeline, and report generation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single parsed log record.
///
/// Records are schemaless JSON objects; field access goes through the
/// dotted-path helpers in the query module.
pub type LogRecord = serde_json::Value;

/// A grouped key with its occurrence count, as produced by `tally`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCount {
    pub key: String,
    pub count: u64,
}

/// An hourly request bucket for time-series output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucket {
    /// Bucket key, formatted `YYYY-MM-DD HH:00:00` (UTC).
    pub time: String,
    pub count: u64,
}

/// Kind of statistical anomaly detected in a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    #[serde(rename = "High Error Rate")]
    HighErrorRate,
    #[serde(rename = "Single IP Dominance")]
    SingleIpDominance,
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnomalyKind::HighErrorRate => write!(f, "High Error Rate"),
            AnomalyKind::SingleIpDominance => write!(f, "Single IP Dominance"),
        }
    }
}

/// A detected anomaly with a human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub description: String,
}

/// A threat-intelligence finding for a single indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VtFinding {
    /// The indicator that was looked up (IP address, URL, or file hash).
    pub ioc: String,
    pub malicious: u32,
    pub suspicious: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "lastAnalysis", skip_serializing_if = "Option::is_none")]
    pub last_analysis: Option<DateTime<Utc>>,
}

impl VtFinding {
    /// True when the indicator is worth surfacing to the narrative prompt.
    pub fn is_high_risk(&self) -> bool {
        self.malicious > 0 || self.suspicious > 2
    }
}

/// Statistics computed over the matched record set.
///
/// This is the orchestrator's working state: the prompt builder, the
/// anomaly rules, and the rule-based fallback all read from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisStats {
    /// One-line totals summary, e.g. `Total: 120, 5xx: 5 (4.2%), 4xx: 12 (10.0%)`.
    pub summary: String,
    pub total: u64,
    /// Count of records with status >= 500.
    pub server_errors: u64,
    /// Count of records with 400 <= status < 500.
    pub client_errors: u64,
    pub top_ips: Vec<KeyCount>,
    pub top_paths: Vec<KeyCount>,
    pub anomalies: Vec<Anomaly>,
    /// Reputation findings, present once enrichment has run (possibly empty).
    pub virus_total: Option<Vec<VtFinding>>,
}

/// The analysis result returned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Narrative summary: AI-generated text, or the rule-based one-liner.
    pub summary: String,
    #[serde(rename = "topPaths")]
    pub top_paths: Vec<KeyCount>,
    #[serde(rename = "topIPs")]
    pub top_ips: Vec<KeyCount>,
    pub recommendations: Vec<String>,
    #[serde(rename = "virusTotal", skip_serializing_if = "Option::is_none")]
    pub virus_total: Option<Vec<VtFinding>>,
}

/// Metadata about a completed analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    /// Path of the analyzed log file or directory.
    pub source: String,
    /// The filter expression the analysis ran with (may be empty).
    pub query: String,
    pub records_total: usize,
    pub records_matched: usize,
    pub analysis_date: DateTime<Utc>,
    /// Narrative model name, absent when the rule-based fallback was used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    pub duration_seconds: f64,
}

/// The complete report written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub metadata: ReportMetadata,
    pub analysis: AnalysisReport,
    pub anomalies: Vec<Anomaly>,
    pub requests_over_time: Vec<TimeBucket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_report_field_names() {
        let report = AnalysisReport {
            summary: "ok".to_string(),
            top_paths: vec![KeyCount { key: "/".to_string(), count: 3 }],
            top_ips: vec![KeyCount { key: "10.0.0.1".to_string(), count: 2 }],
            recommendations: vec![],
            virus_total: None,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("topIPs").is_some());
        assert!(value.get("topPaths").is_some());
        // None enrichment is omitted entirely
        assert!(value.get("virusTotal").is_none());
    }

    #[test]
    fn test_anomaly_serializes_with_type_field() {
        let anomaly = Anomaly {
            kind: AnomalyKind::HighErrorRate,
            description: "5xx errors are 4.0% of total requests".to_string(),
        };

        let value = serde_json::to_value(&anomaly).unwrap();
        assert_eq!(value["type"], "High Error Rate");
        assert_eq!(AnomalyKind::SingleIpDominance.to_string(), "Single IP Dominance");
    }

    #[test]
    fn test_finding_omits_absent_optionals() {
        let finding = VtFinding {
            ioc: "192.0.2.77".to_string(),
            malicious: 3,
            suspicious: 1,
            country: None,
            last_analysis: None,
        };

        let value = serde_json::to_value(&finding).unwrap();
        assert!(value.get("country").is_none());
        assert!(value.get("lastAnalysis").is_none());
        assert!(finding.is_high_risk());
    }

    #[test]
    fn test_high_risk_threshold() {
        let mut finding = VtFinding {
            ioc: "198.51.100.22".to_string(),
            malicious: 0,
            suspicious: 2,
            country: Some("TR".to_string()),
            last_analysis: None,
        };
        assert!(!finding.is_high_risk());

        finding.suspicious = 3;
        assert!(finding.is_high_risk());
    }
}
