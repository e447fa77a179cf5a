//! Grouping, counting, and anomaly heuristics.
//!
//! All functions here are pure and synchronous; they operate on the
//! record set the query engine already filtered.

use crate::models::{Anomaly, AnomalyKind, KeyCount, LogRecord, TimeBucket};
use crate::query::{coerce_number, lookup_path, value_text};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::HashMap;
use tracing::debug;

/// 5xx share above which the error-rate anomaly fires.
const HIGH_ERROR_RATE: f64 = 0.03;
/// Share of total requests above which a single IP counts as dominant.
const IP_DOMINANCE: f64 = 0.3;

/// Error-rate counters over a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorCounts {
    pub total: u64,
    /// status >= 500
    pub server_errors: u64,
    /// 400 <= status < 500
    pub client_errors: u64,
}

/// Group records by the (possibly dotted) field and count occurrences.
///
/// The result is sorted by count descending; ties keep the order in
/// which each key was first seen.
pub fn tally(records: &[LogRecord], field: &str) -> Vec<KeyCount> {
    let mut counts: HashMap<String, (usize, u64)> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let key = value_text(lookup_path(record, field));
        let entry = counts.entry(key).or_insert((index, 0));
        entry.1 += 1;
    }

    let mut grouped: Vec<(String, (usize, u64))> = counts.into_iter().collect();
    grouped.sort_by_key(|(_, (first_seen, count))| (Reverse(*count), *first_seen));

    grouped
        .into_iter()
        .map(|(key, (_, count))| KeyCount { key, count })
        .collect()
}

/// Keep the first `n` entries of a tally.
pub fn top_n(mut entries: Vec<KeyCount>, n: usize) -> Vec<KeyCount> {
    entries.truncate(n);
    entries
}

/// Count total records and 4xx/5xx responses.
pub fn error_counts(records: &[LogRecord]) -> ErrorCounts {
    let mut counts = ErrorCounts {
        total: records.len() as u64,
        ..ErrorCounts::default()
    };

    for record in records {
        let Some(status) = coerce_number(lookup_path(record, "status")) else {
            continue;
        };
        if status >= 500.0 {
            counts.server_errors += 1;
        } else if status >= 400.0 {
            counts.client_errors += 1;
        }
    }

    counts
}

/// Bucket records by hour of their `@timestamp`, ascending.
///
/// Bucket keys are formatted `YYYY-MM-DD HH:00:00` in UTC. Records with
/// a missing or unparseable timestamp are skipped.
pub fn time_buckets(records: &[LogRecord]) -> Vec<TimeBucket> {
    let mut buckets: HashMap<String, u64> = HashMap::new();
    for record in records {
        let Some(raw) = lookup_path(record, "@timestamp").and_then(Value::as_str) else {
            continue;
        };
        let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) else {
            debug!("Skipping record with unparseable timestamp: {}", raw);
            continue;
        };
        let key = timestamp
            .with_timezone(&Utc)
            .format("%Y-%m-%d %H:00:00")
            .to_string();
        *buckets.entry(key).or_insert(0) += 1;
    }

    let mut series: Vec<TimeBucket> = buckets
        .into_iter()
        .map(|(time, count)| TimeBucket { time, count })
        .collect();
    series.sort_by(|a, b| a.time.cmp(&b.time));
    series
}

/// Flag statistically notable patterns in the counters and top-IP list.
pub fn detect_anomalies(counts: &ErrorCounts, top_ips: &[KeyCount]) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if counts.server_errors as f64 > counts.total as f64 * HIGH_ERROR_RATE {
        anomalies.push(Anomaly {
            kind: AnomalyKind::HighErrorRate,
            description: format!(
                "5xx errors are {:.1}% of total requests",
                percent(counts.server_errors, counts.total)
            ),
        });
    }

    if let Some(top) = top_ips.first() {
        if top.count as f64 > counts.total as f64 * IP_DOMINANCE {
            anomalies.push(Anomaly {
                kind: AnomalyKind::SingleIpDominance,
                description: format!(
                    "{} accounts for {:.1}% of requests",
                    top.key,
                    percent(top.count, counts.total)
                ),
            });
        }
    }

    anomalies
}

/// Share of `part` in `total`, as a percentage.
pub fn percent(part: u64, total: u64) -> f64 {
    part as f64 / total as f64 * 100.0
}
