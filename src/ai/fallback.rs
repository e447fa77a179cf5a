//! Deterministic rule-based summary.
//!
//! Used whenever no narrative credential is configured or the
//! generation call fails. Identical input always produces identical
//! output, so the two failure paths are indistinguishable to callers.

use crate::analysis::percent;
use crate::models::{AnalysisReport, AnalysisStats};

/// Build an analysis report from fixed rules over the computed stats.
///
/// Rules fire in a fixed order; if none fires, two generic monitoring
/// recommendations are emitted instead.
pub fn rule_based(stats: &AnalysisStats) -> AnalysisReport {
    let mut recommendations = Vec::new();

    if stats.server_errors as f64 > stats.total as f64 * 0.03 {
        recommendations.push(format!(
            "Investigate {} 5xx errors ({:.1}% of traffic)",
            stats.server_errors,
            percent(stats.server_errors, stats.total)
        ));
    }

    if stats.client_errors as f64 > stats.total as f64 * 0.1 {
        recommendations.push(format!(
            "Review {} 4xx errors - may indicate broken links or misconfigurations",
            stats.client_errors
        ));
    }

    if stats.top_paths.iter().any(|p| p.key.contains("wp-login.php")) {
        recommendations
            .push("Rate-limit /wp-login.php - potential brute-force target".to_string());
    }

    if let Some(top) = stats.top_ips.first() {
        if top.count as f64 > stats.total as f64 * 0.2 {
            recommendations.push(format!(
                "Monitor IP {} - {:.1}% of requests",
                top.key,
                percent(top.count, stats.total)
            ));
        }
    }

    if recommendations.is_empty() {
        recommendations.push("No immediate security concerns detected".to_string());
        recommendations.push("Continue monitoring for anomalies".to_string());
    }

    AnalysisReport {
        summary: stats.summary.clone(),
        top_paths: stats.top_paths.clone(),
        top_ips: stats.top_ips.clone(),
        recommendations,
        virus_total: stats.virus_total.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::KeyCount;

    fn base_stats() -> AnalysisStats {
        AnalysisStats {
            summary: "Total: 100, 5xx: 0 (0.0%), 4xx: 0 (0.0%)".to_string(),
            total: 100,
            server_errors: 0,
            client_errors: 0,
            top_ips: vec![KeyCount { key: "203.0.113.45".to_string(), count: 10 }],
            top_paths: vec![KeyCount { key: "/".to_string(), count: 50 }],
            anomalies: vec![],
            virus_total: None,
        }
    }

    #[test]
    fn test_identical_input_yields_identical_output() {
        let stats = base_stats();
        assert_eq!(rule_based(&stats), rule_based(&stats));
    }

    #[test]
    fn test_server_error_rule() {
        let stats = AnalysisStats { server_errors: 5, ..base_stats() };
        let report = rule_based(&stats);
        assert_eq!(
            report.recommendations[0],
            "Investigate 5 5xx errors (5.0% of traffic)"
        );
    }

    #[test]
    fn test_client_error_rule() {
        let stats = AnalysisStats { client_errors: 15, ..base_stats() };
        let report = rule_based(&stats);
        assert_eq!(
            report.recommendations[0],
            "Review 15 4xx errors - may indicate broken links or misconfigurations"
        );
    }

    #[test]
    fn test_brute_force_path_rule() {
        let mut stats = base_stats();
        stats.top_paths.push(KeyCount { key: "/wp-login.php".to_string(), count: 12 });
        let report = rule_based(&stats);
        assert!(report
            .recommendations
            .contains(&"Rate-limit /wp-login.php - potential brute-force target".to_string()));
    }

    #[test]
    fn test_dominant_ip_rule_uses_twenty_percent_threshold() {
        // 21% of requests: below the 30% anomaly bar but above the
        // fallback's own monitoring threshold.
        let mut stats = base_stats();
        stats.top_ips = vec![KeyCount { key: "192.0.2.77".to_string(), count: 21 }];
        let report = rule_based(&stats);
        assert_eq!(
            report.recommendations[0],
            "Monitor IP 192.0.2.77 - 21.0% of requests"
        );

        stats.top_ips = vec![KeyCount { key: "192.0.2.77".to_string(), count: 20 }];
        let report = rule_based(&stats);
        assert_eq!(report.recommendations[0], "No immediate security concerns detected");
    }

    #[test]
    fn test_generic_recommendations_when_no_rule_fires() {
        let report = rule_based(&base_stats());
        assert_eq!(
            report.recommendations,
            vec![
                "No immediate security concerns detected".to_string(),
                "Continue monitoring for anomalies".to_string(),
            ]
        );
    }

    #[test]
    fn test_rules_accumulate_in_order() {
        let mut stats = base_stats();
        stats.server_errors = 10;
        stats.client_errors = 20;
        stats.top_paths.push(KeyCount { key: "/wp-login.php".to_string(), count: 9 });
        stats.top_ips = vec![KeyCount { key: "192.0.2.77".to_string(), count: 30 }];

        let report = rule_based(&stats);
        assert_eq!(report.recommendations.len(), 4);
        assert!(report.recommendations[0].starts_with("Investigate"));
        assert!(report.recommendations[1].starts_with("Review"));
        assert!(report.recommendations[2].starts_with("Rate-limit"));
        assert!(report.recommendations[3].starts_with("Monitor"));
    }
}
