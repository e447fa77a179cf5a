//! Narrative generation via the Gemini `generateContent` API.

use crate::ai::Narrator;
use crate::models::{AnalysisStats, Anomaly, KeyCount, VtFinding};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// API base URL, overridable for testing.
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

/// Gemini generateContent request.
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

/// Gemini generateContent response.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

/// The subset of the statistics embedded into the prompt.
#[derive(Serialize)]
struct PromptStats<'a> {
    summary: &'a str,
    #[serde(rename = "topIPs")]
    top_ips: &'a [KeyCount],
    #[serde(rename = "topPaths")]
    top_paths: &'a [KeyCount],
    anomalies: &'a [Anomaly],
}

/// Gemini-backed narrative generator.
pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self { config, http }
    }
}

impl Narrator for GeminiClient {
    async fn narrate(&self, stats: &AnalysisStats, query: &str) -> Result<String> {
        let prompt = build_prompt(stats, query);
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint, self.config.model
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!(
                        "Gemini request timed out after {}s",
                        self.config.timeout_seconds
                    )
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to Gemini at {}", self.config.endpoint)
                } else {
                    anyhow::anyhow!("Failed to send Gemini request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Gemini API error {}: {}", status, body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Gemini response")?;

        let text = generated
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(anyhow::anyhow!("Gemini returned an empty response"));
        }

        Ok(text)
    }
}

/// Compose the analyst prompt from the computed statistics.
///
/// Only high-risk reputation findings are embedded, to keep benign
/// lookups from diluting the signal.
pub fn build_prompt(stats: &AnalysisStats, user_query: &str) -> String {
    let mut vt_summary = String::new();
    if let Some(findings) = &stats.virus_total {
        let high_risk: Vec<&VtFinding> =
            findings.iter().filter(|f| f.is_high_risk()).collect();
        if !high_risk.is_empty() {
            vt_summary.push_str("\n\nThreat Intelligence (VirusTotal):\n");
            let lines: Vec<String> = high_risk
                .iter()
                .map(|f| {
                    let country = f
                        .country
                        .as_deref()
                        .map(|c| format!(" ({})", c))
                        .unwrap_or_default();
                    format!(
                        "- {}: {} malicious, {} suspicious{}",
                        f.ioc, f.malicious, f.suspicious, country
                    )
                })
                .collect();
            vt_summary.push_str(&lines.join("\n"));
        }
    }

    let stats_json = serde_json::to_string_pretty(&PromptStats {
        summary: &stats.summary,
        top_ips: &stats.top_ips[..stats.top_ips.len().min(5)],
        top_paths: &stats.top_paths[..stats.top_paths.len().min(5)],
        anomalies: &stats.anomalies,
    })
    .expect("statistics serialize to JSON");

    format!(
        "You are a cybersecurity log analyst. Analyze the following log statistics and provide concise insights.\n\
         \n\
         User Query: {}\n\
         \n\
         Statistics:\n\
         {}{}\n\
         \n\
         Provide:\n\
         1. Key findings (3-5 bullet points)\n\
         2. Security recommendations (3-5 actionable items)\n\
         3. Any notable anomalies or patterns\n\
         \n\
         Format as clear, concise bullet points. Be specific and data-driven.",
        user_query, stats_json, vt_summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_with_findings(findings: Option<Vec<VtFinding>>) -> AnalysisStats {
        AnalysisStats {
            summary: "Total: 100, 5xx: 4 (4.0%), 4xx: 6 (6.0%)".to_string(),
            total: 100,
            server_errors: 4,
            client_errors: 6,
            top_ips: vec![KeyCount { key: "192.0.2.77".to_string(), count: 40 }],
            top_paths: vec![KeyCount { key: "/wp-login.php".to_string(), count: 25 }],
            anomalies: vec![],
            virus_total: findings,
        }
    }

    fn finding(ioc: &str, malicious: u32, suspicious: u32) -> VtFinding {
        VtFinding {
            ioc: ioc.to_string(),
            malicious,
            suspicious,
            country: Some("RU".to_string()),
            last_analysis: None,
        }
    }

    #[test]
    fn test_prompt_embeds_query_and_stats() {
        let prompt = build_prompt(&stats_with_findings(None), "status:>499");
        assert!(prompt.contains("User Query: status:>499"));
        assert!(prompt.contains("\"topIPs\""));
        assert!(prompt.contains("192.0.2.77"));
        assert!(!prompt.contains("Threat Intelligence"));
    }

    #[test]
    fn test_prompt_includes_only_high_risk_findings() {
        let findings = vec![
            finding("192.0.2.77", 5, 0),
            finding("203.0.113.45", 0, 1),
        ];
        let prompt = build_prompt(&stats_with_findings(Some(findings)), "");

        assert!(prompt.contains("Threat Intelligence (VirusTotal):"));
        assert!(prompt.contains("- 192.0.2.77: 5 malicious, 0 suspicious (RU)"));
        assert!(!prompt.contains("203.0.113.45: 0 malicious"));
    }

    #[test]
    fn test_prompt_omits_section_when_all_findings_benign() {
        let findings = vec![finding("203.0.113.45", 0, 0)];
        let prompt = build_prompt(&stats_with_findings(Some(findings)), "");
        assert!(!prompt.contains("Threat Intelligence"));
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "• Finding one\n"}, {"text": "• Finding two"}]}}
            ]
        }"#;

        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();

        assert_eq!(text, "• Finding one\n• Finding two");
    }

    #[test]
    fn test_response_parsing_tolerates_empty_candidates() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.candidates.is_empty());
    }
}
