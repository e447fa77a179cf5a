//! Threat-intelligence enrichment.
//!
//! This module wraps the VirusTotal v3 API behind the [`ReputationLookup`]
//! seam so the analysis pipeline can be tested without live credentials.

pub mod virustotal;

pub use virustotal::{VtClient, VtConfig};

use crate::models::VtFinding;
use thiserror::Error;
use tracing::warn;

/// Failures a reputation lookup can surface to its caller.
///
/// Anything else (transport errors, unknown indicators, unexpected
/// response shapes) resolves to "no data" instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VtError {
    /// The API rejected the credential (HTTP 401). Every subsequent
    /// call with the same key will fail the same way.
    #[error("invalid VirusTotal API key")]
    InvalidKey,
    /// The API quota is exhausted (HTTP 429).
    #[error("VirusTotal rate limit exceeded")]
    RateLimited,
}

/// Kind of indicator to look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Ip,
    Url,
    Hash,
}

impl IndicatorKind {
    /// Cache-key prefix for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Ip => "ip",
            IndicatorKind::Url => "url",
            IndicatorKind::Hash => "hash",
        }
    }
}

/// A reputation source for single indicators.
#[allow(async_fn_in_trait)]
pub trait ReputationLookup {
    /// Look up one indicator. `Ok(None)` means no data is available;
    /// only the named [`VtError`] failures are surfaced.
    async fn lookup(
        &mut self,
        kind: IndicatorKind,
        value: &str,
    ) -> Result<Option<VtFinding>, VtError>;
}

/// Look up `values` sequentially, up to `limit`.
///
/// Lookups are never issued concurrently: the client's request pacer is
/// shared across all of them. The batch stops early, without raising,
/// as soon as the quota is exhausted or the key is rejected, returning
/// whatever was collected so far.
pub async fn batch_lookup<R: ReputationLookup>(
    client: &mut R,
    kind: IndicatorKind,
    values: &[String],
    limit: usize,
) -> Vec<VtFinding> {
    let mut findings = Vec::new();
    for value in values.iter().take(limit) {
        match client.lookup(kind, value).await {
            Ok(Some(finding)) => findings.push(finding),
            Ok(None) => {}
            Err(VtError::RateLimited) => {
                warn!(
                    "VirusTotal rate limit reached, stopping batch after {} findings",
                    findings.len()
                );
                break;
            }
            Err(VtError::InvalidKey) => {
                warn!("VirusTotal API key rejected, stopping batch");
                break;
            }
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        responses: VecDeque<Result<Option<VtFinding>, VtError>>,
        calls: usize,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Option<VtFinding>, VtError>>) -> Self {
            Self { responses: responses.into(), calls: 0 }
        }
    }

    impl ReputationLookup for Scripted {
        async fn lookup(
            &mut self,
            _kind: IndicatorKind,
            _value: &str,
        ) -> Result<Option<VtFinding>, VtError> {
            self.calls += 1;
            self.responses.pop_front().unwrap_or(Ok(None))
        }
    }

    fn finding(ioc: &str) -> VtFinding {
        VtFinding {
            ioc: ioc.to_string(),
            malicious: 1,
            suspicious: 0,
            country: None,
            last_analysis: None,
        }
    }

    fn values(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("192.0.2.{}", i)).collect()
    }

    #[tokio::test]
    async fn test_batch_stops_on_rate_limit() {
        let mut client = Scripted::new(vec![
            Ok(Some(finding("192.0.2.0"))),
            Ok(Some(finding("192.0.2.1"))),
            Err(VtError::RateLimited),
            Ok(Some(finding("192.0.2.3"))),
            Ok(Some(finding("192.0.2.4"))),
        ]);

        let findings = batch_lookup(&mut client, IndicatorKind::Ip, &values(5), 10).await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].ioc, "192.0.2.0");
        // Nothing past the failing call was attempted.
        assert_eq!(client.calls, 3);
    }

    #[tokio::test]
    async fn test_batch_stops_on_invalid_key() {
        let mut client = Scripted::new(vec![
            Ok(Some(finding("192.0.2.0"))),
            Err(VtError::InvalidKey),
        ]);

        let findings = batch_lookup(&mut client, IndicatorKind::Ip, &values(4), 10).await;
        assert_eq!(findings.len(), 1);
        assert_eq!(client.calls, 2);
    }

    #[tokio::test]
    async fn test_batch_skips_entries_without_data() {
        let mut client = Scripted::new(vec![
            Ok(Some(finding("192.0.2.0"))),
            Ok(None),
            Ok(Some(finding("192.0.2.2"))),
        ]);

        let findings = batch_lookup(&mut client, IndicatorKind::Ip, &values(3), 10).await;
        assert_eq!(findings.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_respects_limit() {
        let mut client = Scripted::new((0..20).map(|i| Ok(Some(finding(&format!("192.0.2.{}", i))))).collect());

        let findings = batch_lookup(&mut client, IndicatorKind::Ip, &values(20), 10).await;
        assert_eq!(findings.len(), 10);
        assert_eq!(client.calls, 10);
    }
}
