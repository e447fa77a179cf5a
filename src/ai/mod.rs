//! Analysis orchestration.
//!
//! The pipeline per call: filter the records with the query expression,
//! compute statistics and anomaly flags, best-effort enrich the top
//! source IPs with reputation data, then either generate an AI
//! narrative or fall back to the deterministic rule-based summary.
//! Enrichment and narration failures never surface to the caller; the
//! orchestrator always returns a usable result.

pub mod fallback;
pub mod gemini;

pub use gemini::{GeminiClient, GeminiConfig};

use crate::analysis::{detect_anomalies, error_counts, percent, tally, top_n};
use crate::enrich::{batch_lookup, IndicatorKind, ReputationLookup};
use crate::models::{AnalysisReport, AnalysisStats, KeyCount, LogRecord};
use crate::query::run_query;
use anyhow::Result;
use tracing::{debug, info, warn};

/// How many top IPs are submitted for reputation enrichment.
const ENRICH_LIMIT: usize = 5;

/// A narrative text source.
#[allow(async_fn_in_trait)]
pub trait Narrator {
    /// Generate a free-text analysis of the statistics. The text is
    /// parsed heuristically for bullet/numbered recommendation lines.
    async fn narrate(&self, stats: &AnalysisStats, query: &str) -> Result<String>;
}

/// Outcome of the narrative step.
#[derive(Debug, Clone, PartialEq)]
pub enum Narrative {
    /// The generator produced text.
    Generated(String),
    /// No generator configured, or the call failed: use the fallback.
    Unavailable,
}

/// One analysis request.
pub struct AnalyzeRequest<'a> {
    pub records: &'a [LogRecord],
    pub query: &'a str,
    /// Pre-computed top lists, reused instead of recomputing when the
    /// caller already has them.
    pub top_ips: Option<Vec<KeyCount>>,
    pub top_paths: Option<Vec<KeyCount>>,
}

/// The orchestrator's result: the report plus the statistics it was
/// derived from (for rendering and exit-code decisions).
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub report: AnalysisReport,
    pub stats: AnalysisStats,
}

/// Analysis orchestrator over injectable collaborators.
///
/// Both collaborators are optional: without a reputation client the
/// result simply carries no findings, and without a narrator every
/// call takes the rule-based path.
pub struct Analyzer<R, N> {
    reputation: Option<R>,
    narrator: Option<N>,
}

impl<R: ReputationLookup, N: Narrator> Analyzer<R, N> {
    pub fn new(reputation: Option<R>, narrator: Option<N>) -> Self {
        Self { reputation, narrator }
    }

    /// Run the full pipeline. Never fails: enrichment and narration
    /// problems degrade, they do not propagate.
    pub async fn analyze(&mut self, request: AnalyzeRequest<'_>) -> AnalysisOutcome {
        let matched = run_query(request.records, request.query);
        let mut stats = compute_stats(&matched, request.top_ips, request.top_paths);
        info!(
            "Matched {} of {} records; {} anomaly flag(s)",
            stats.total,
            request.records.len(),
            stats.anomalies.len()
        );

        if let Some(client) = self.reputation.as_mut() {
            let ips: Vec<String> = stats
                .top_ips
                .iter()
                .take(ENRICH_LIMIT)
                .map(|entry| entry.key.clone())
                .collect();
            let findings = batch_lookup(client, IndicatorKind::Ip, &ips, ENRICH_LIMIT).await;
            debug!("Reputation enrichment returned {} findings", findings.len());
            stats.virus_total = Some(findings);
        }

        let narrative = match &self.narrator {
            Some(narrator) => match narrator.narrate(&stats, request.query).await {
                Ok(text) => Narrative::Generated(text),
                Err(e) => {
                    warn!("Narrative generation failed, using rule-based summary: {:#}", e);
                    Narrative::Unavailable
                }
            },
            None => Narrative::Unavailable,
        };

        let report = compose_report(&stats, narrative);
        AnalysisOutcome { report, stats }
    }
}

/// Compute the statistics block over the matched records.
pub fn compute_stats(
    matched: &[LogRecord],
    top_ips: Option<Vec<KeyCount>>,
    top_paths: Option<Vec<KeyCount>>,
) -> AnalysisStats {
    let counts = error_counts(matched);
    let top_ips = top_ips.unwrap_or_else(|| top_n(tally(matched, "ip"), 5));
    let top_paths = top_paths.unwrap_or_else(|| top_n(tally(matched, "path"), 5));
    let anomalies = detect_anomalies(&counts, &top_ips);

    let summary = format!(
        "Total: {}, 5xx: {} ({:.1}%), 4xx: {} ({:.1}%)",
        counts.total,
        counts.server_errors,
        percent(counts.server_errors, counts.total),
        counts.client_errors,
        percent(counts.client_errors, counts.total)
    );

    AnalysisStats {
        summary,
        total: counts.total,
        server_errors: counts.server_errors,
        client_errors: counts.client_errors,
        top_ips,
        top_paths,
        anomalies,
        virus_total: None,
    }
}

/// Turn the narrative outcome into the final report. Pure: both paths
/// are decided entirely by the inputs.
pub fn compose_report(stats: &AnalysisStats, narrative: Narrative) -> AnalysisReport {
    match narrative {
        Narrative::Generated(text) => AnalysisReport {
            recommendations: extract_recommendations(&text),
            summary: text,
            top_paths: stats.top_paths.clone(),
            top_ips: stats.top_ips.clone(),
            virus_total: stats.virus_total.clone(),
        },
        Narrative::Unavailable => fallback::rule_based(stats),
    }
}

/// Pull recommendation-like lines out of generated text: non-blank
/// lines containing a bullet or hyphen, or starting a numbered list.
/// Capped at five.
pub fn extract_recommendations(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| {
            !line.trim().is_empty()
                && (line.contains('•') || line.contains('-') || starts_numbered(line))
        })
        .take(5)
        .map(str::to_string)
        .collect()
}

fn starts_numbered(line: &str) -> bool {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    digits > 0 && line.as_bytes().get(digits) == Some(&b'.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{VtClient, VtError};
    use crate::models::VtFinding;
    use serde_json::json;

    struct StubNarrator {
        text: Option<String>,
    }

    impl Narrator for StubNarrator {
        async fn narrate(&self, _stats: &AnalysisStats, _query: &str) -> Result<String> {
            match &self.text {
                Some(text) => Ok(text.clone()),
                None => Err(anyhow::anyhow!("generation failed")),
            }
        }
    }

    struct StubReputation {
        malicious: u32,
    }

    impl ReputationLookup for StubReputation {
        async fn lookup(
            &mut self,
            _kind: IndicatorKind,
            value: &str,
        ) -> std::result::Result<Option<VtFinding>, VtError> {
            Ok(Some(VtFinding {
                ioc: value.to_string(),
                malicious: self.malicious,
                suspicious: 0,
                country: None,
                last_analysis: None,
            }))
        }
    }

    fn records() -> Vec<LogRecord> {
        let mut rows: Vec<LogRecord> = (0..90)
            .map(|i| json!({"ip": format!("203.0.113.{}", i % 4), "path": "/", "status": 200}))
            .collect();
        rows.extend((0..10).map(|_| json!({"ip": "192.0.2.77", "path": "/wp-login.php", "status": 503})));
        rows
    }

    #[tokio::test]
    async fn test_analyze_without_collaborators_uses_fallback() {
        let mut analyzer = Analyzer::new(None::<VtClient>, None::<GeminiClient>);
        let rows = records();

        let outcome = analyzer
            .analyze(AnalyzeRequest { records: &rows, query: "", top_ips: None, top_paths: None })
            .await;

        assert_eq!(outcome.stats.total, 100);
        assert_eq!(outcome.stats.server_errors, 10);
        assert_eq!(outcome.report.summary, "Total: 100, 5xx: 10 (10.0%), 4xx: 0 (0.0%)");
        assert!(outcome.report.recommendations[0].starts_with("Investigate 10 5xx errors"));
        assert!(outcome.report.virus_total.is_none());
        assert_eq!(outcome.stats.anomalies.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_narration_matches_missing_narrator() {
        let rows = records();
        let request = || AnalyzeRequest { records: &rows, query: "", top_ips: None, top_paths: None };

        let mut without = Analyzer::new(None::<VtClient>, None::<GeminiClient>);
        let mut failing = Analyzer::new(
            None::<VtClient>,
            Some(StubNarrator { text: None }),
        );

        let baseline = without.analyze(request()).await;
        let degraded = failing.analyze(request()).await;
        assert_eq!(baseline.report, degraded.report);
    }

    #[tokio::test]
    async fn test_generated_narrative_drives_summary_and_recommendations() {
        let narrative = "Key findings:\n\
                         • Elevated 5xx rate on /wp-login.php\n\
                         plain prose line\n\
                         - Block the dominant source IP\n\
                         1. Enable rate limiting\n";
        let mut analyzer = Analyzer::new(
            None::<VtClient>,
            Some(StubNarrator { text: Some(narrative.to_string()) }),
        );
        let rows = records();

        let outcome = analyzer
            .analyze(AnalyzeRequest { records: &rows, query: "", top_ips: None, top_paths: None })
            .await;

        assert_eq!(outcome.report.summary, narrative);
        assert_eq!(
            outcome.report.recommendations,
            vec![
                "• Elevated 5xx rate on /wp-login.php".to_string(),
                "- Block the dominant source IP".to_string(),
                "1. Enable rate limiting".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_enrichment_findings_attach_to_result() {
        let mut analyzer = Analyzer::new(
            Some(StubReputation { malicious: 3 }),
            None::<GeminiClient>,
        );
        let rows = records();

        let outcome = analyzer
            .analyze(AnalyzeRequest { records: &rows, query: "", top_ips: None, top_paths: None })
            .await;

        let findings = outcome.report.virus_total.expect("enrichment ran");
        assert_eq!(findings.len(), ENRICH_LIMIT);
        assert!(findings.iter().all(|f| f.malicious == 3));
    }

    #[tokio::test]
    async fn test_caller_supplied_top_lists_are_reused() {
        let supplied = vec![KeyCount { key: "10.0.0.1".to_string(), count: 7 }];
        let mut analyzer = Analyzer::new(None::<VtClient>, None::<GeminiClient>);
        let rows = records();

        let outcome = analyzer
            .analyze(AnalyzeRequest {
                records: &rows,
                query: "",
                top_ips: Some(supplied.clone()),
                top_paths: None,
            })
            .await;

        assert_eq!(outcome.report.top_ips, supplied);
    }

    #[tokio::test]
    async fn test_query_filters_before_stats() {
        let mut analyzer = Analyzer::new(None::<VtClient>, None::<GeminiClient>);
        let rows = records();

        let outcome = analyzer
            .analyze(AnalyzeRequest {
                records: &rows,
                query: "status:503",
                top_ips: None,
                top_paths: None,
            })
            .await;

        assert_eq!(outcome.stats.total, 10);
        assert_eq!(outcome.stats.top_ips, vec![KeyCount { key: "192.0.2.77".to_string(), count: 10 }]);
    }

    #[test]
    fn test_extract_recommendations_caps_at_five() {
        let text = "- one\n- two\n- three\n- four\n- five\n- six\n";
        assert_eq!(extract_recommendations(text).len(), 5);
    }

    #[test]
    fn test_extract_recommendations_skips_plain_lines() {
        let text = "Summary paragraph.\n\n2. Numbered item\nNothing here\n• Bullet";
        assert_eq!(
            extract_recommendations(text),
            vec!["2. Numbered item".to_string(), "• Bullet".to_string()]
        );
    }

    #[test]
    fn test_compute_stats_summary_format() {
        let rows = records();
        let stats = compute_stats(&rows, None, None);
        assert_eq!(stats.summary, "Total: 100, 5xx: 10 (10.0%), 4xx: 0 (0.0%)");
        assert!(stats.top_paths.len() <= 5);
    }
}
