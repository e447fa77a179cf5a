//! VirusTotal v3 API client.
//!
//! Each client instance owns its own response cache and request pacer,
//! so tests can construct isolated clients and control time. The public
//! API quota is tight; the cache (5 minute TTL) and the 500 ms spacing
//! between outbound requests are what keep batch enrichment inside it.

use crate::enrich::{IndicatorKind, ReputationLookup, VtError};
use crate::models::VtFinding;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Cached entries go stale after this long.
const CACHE_TTL: Duration = Duration::from_millis(300_000);
/// Minimum spacing between outbound requests (2 requests/second).
const REQUEST_GAP: Duration = Duration::from_millis(500);

pub const DEFAULT_ENDPOINT: &str = "https://www.virustotal.com/api/v3";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct VtConfig {
    /// API key; without one every lookup resolves to "no data".
    pub api_key: Option<String>,
    /// API base URL, overridable for testing.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for VtConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    finding: VtFinding,
    fetched_at: Instant,
}

/// VirusTotal response envelope, shared by all three resource kinds.
#[derive(Debug, Deserialize)]
struct VtResponse {
    data: Option<VtData>,
}

#[derive(Debug, Deserialize)]
struct VtData {
    /// Analysis identifier, present on URL submissions.
    id: Option<String>,
    attributes: Option<VtAttributes>,
}

#[derive(Debug, Deserialize)]
struct VtAttributes {
    #[serde(default)]
    last_analysis_stats: Option<VtStats>,
    country: Option<String>,
    /// Unix seconds of the most recent analysis.
    last_analysis_date: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
struct VtStats {
    #[serde(default)]
    malicious: u32,
    #[serde(default)]
    suspicious: u32,
}

impl VtAttributes {
    fn stats(&self) -> (u32, u32) {
        match &self.last_analysis_stats {
            Some(stats) => (stats.malicious, stats.suspicious),
            None => (0, 0),
        }
    }

    fn analysis_time(&self) -> Option<DateTime<Utc>> {
        self.last_analysis_date
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}

/// VirusTotal client with per-instance cache and request pacing.
pub struct VtClient {
    config: VtConfig,
    http: reqwest::Client,
    cache: HashMap<String, CacheEntry>,
    last_request: Option<Instant>,
}

impl VtClient {
    pub fn new(config: VtConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            http,
            cache: HashMap::new(),
            last_request: None,
        }
    }

    fn cache_key(kind: IndicatorKind, value: &str) -> String {
        format!("{}:{}", kind.as_str(), value)
    }

    fn cached(&self, key: &str) -> Option<VtFinding> {
        self.cache
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < CACHE_TTL)
            .map(|entry| entry.finding.clone())
    }

    fn store(&mut self, key: String, finding: &VtFinding) {
        self.cache.insert(
            key,
            CacheEntry {
                finding: finding.clone(),
                fetched_at: Instant::now(),
            },
        );
    }

    /// Wait until at least [`REQUEST_GAP`] has passed since the previous
    /// outbound request, then claim the slot.
    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < REQUEST_GAP {
                sleep(REQUEST_GAP - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    /// GET a VirusTotal object and extract its attributes.
    ///
    /// 401 and 429 surface as named failures; every other non-success
    /// response, transport error, or unparseable body is "no data".
    async fn get_attributes(
        &self,
        url: &str,
        api_key: &str,
    ) -> Result<Option<VtAttributes>, VtError> {
        let response = match self.http.get(url).header("x-apikey", api_key).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("VirusTotal request failed: {}", e);
                return Ok(None);
            }
        };

        check_status(response.status())?;
        if !response.status().is_success() {
            return Ok(None);
        }

        match response.json::<VtResponse>().await {
            Ok(body) => Ok(body.data.and_then(|data| data.attributes)),
            Err(e) => {
                warn!("Failed to parse VirusTotal response: {}", e);
                Ok(None)
            }
        }
    }

    async fn lookup_ip(&mut self, ip: &str) -> Result<Option<VtFinding>, VtError> {
        let Some(api_key) = self.config.api_key.clone() else {
            return Ok(None);
        };

        let key = Self::cache_key(IndicatorKind::Ip, ip);
        if let Some(hit) = self.cached(&key) {
            debug!("VirusTotal cache hit for {}", key);
            return Ok(Some(hit));
        }

        self.pace().await;

        let url = format!("{}/ip_addresses/{}", self.config.endpoint, ip);
        let Some(attributes) = self.get_attributes(&url, &api_key).await? else {
            return Ok(None);
        };

        let (malicious, suspicious) = attributes.stats();
        let finding = VtFinding {
            ioc: ip.to_string(),
            malicious,
            suspicious,
            country: attributes.country.clone(),
            last_analysis: attributes.analysis_time(),
        };

        self.store(key, &finding);
        Ok(Some(finding))
    }

    async fn lookup_url(&mut self, target: &str) -> Result<Option<VtFinding>, VtError> {
        let Some(api_key) = self.config.api_key.clone() else {
            return Ok(None);
        };

        let key = Self::cache_key(IndicatorKind::Url, target);
        if let Some(hit) = self.cached(&key) {
            debug!("VirusTotal cache hit for {}", key);
            return Ok(Some(hit));
        }

        self.pace().await;

        // URLs are a two-step protocol: submit for analysis, then fetch
        // the analysis by the returned identifier.
        let submit_url = format!("{}/urls", self.config.endpoint);
        let response = match self
            .http
            .post(&submit_url)
            .header("x-apikey", &api_key)
            .form(&[("url", target)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("VirusTotal URL submission failed: {}", e);
                return Ok(None);
            }
        };

        check_status(response.status())?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let submitted = match response.json::<VtResponse>().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to parse VirusTotal submission response: {}", e);
                return Ok(None);
            }
        };
        let Some(analysis_id) = submitted.data.and_then(|data| data.id) else {
            return Ok(None);
        };

        let fetch_url = format!("{}/urls/{}", self.config.endpoint, analysis_id);
        let Some(attributes) = self.get_attributes(&fetch_url, &api_key).await? else {
            return Ok(None);
        };

        let (malicious, suspicious) = attributes.stats();
        let finding = VtFinding {
            ioc: target.to_string(),
            malicious,
            suspicious,
            country: None,
            last_analysis: attributes.analysis_time(),
        };

        self.store(key, &finding);
        Ok(Some(finding))
    }

    async fn lookup_hash(&mut self, hash: &str) -> Result<Option<VtFinding>, VtError> {
        let Some(api_key) = self.config.api_key.clone() else {
            return Ok(None);
        };

        let key = Self::cache_key(IndicatorKind::Hash, hash);
        if let Some(hit) = self.cached(&key) {
            debug!("VirusTotal cache hit for {}", key);
            return Ok(Some(hit));
        }

        self.pace().await;

        let url = format!("{}/files/{}", self.config.endpoint, hash);
        let Some(attributes) = self.get_attributes(&url, &api_key).await? else {
            return Ok(None);
        };

        let (malicious, suspicious) = attributes.stats();
        let finding = VtFinding {
            ioc: hash.to_string(),
            malicious,
            suspicious,
            country: attributes.country.clone(),
            last_analysis: attributes.analysis_time(),
        };

        self.store(key, &finding);
        Ok(Some(finding))
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), VtError> {
    match status {
        reqwest::StatusCode::UNAUTHORIZED => Err(VtError::InvalidKey),
        reqwest::StatusCode::TOO_MANY_REQUESTS => Err(VtError::RateLimited),
        _ => Ok(()),
    }
}

impl ReputationLookup for VtClient {
    async fn lookup(
        &mut self,
        kind: IndicatorKind,
        value: &str,
    ) -> Result<Option<VtFinding>, VtError> {
        match kind {
            IndicatorKind::Ip => self.lookup_ip(value).await,
            IndicatorKind::Url => self.lookup_url(value).await,
            IndicatorKind::Hash => self.lookup_hash(value).await,
        }
    }
}
