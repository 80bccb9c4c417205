use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::core::ent::*;
use crate::core::store::LogStore;

/// Builds the report for the window; `None` when the window holds no checks.
pub fn build(
    store: &LogStore,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<Report> {
    let report = summarize(&store.query(start, end), start, end);
    match &report {
        Some(r) => info!(
            "report: {} checks, {} up, {} down, {:.2}% uptime",
            r.total_checks, r.up_count, r.down_count, r.uptime_percentage
        ),
        None => warn!("no probe entries in the report window"),
    }
    report
}

pub fn summarize(
    entries: &[ProbeResult],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Option<Report> {
    if entries.is_empty() {
        return None;
    }
    let total_checks = entries.len();
    let up_count = entries.iter().filter(|e| e.is_up()).count();
    let down_count = total_checks - up_count;

    let downtime_incidents = entries
        .iter()
        .filter(|e| !e.is_up())
        .map(|e| Incident {
            timestamp: e.timestamp,
            endpoint: e.endpoint.clone(),
            method: e.method,
            error: e.error.clone().unwrap_or_else(|| "Unknown error".to_string()),
        })
        .collect();

    // only measured successes count towards latency
    let latencies: Vec<u64> = entries
        .iter()
        .filter(|e| e.is_up())
        .filter_map(|e| e.response_time_ms)
        .collect();
    let average_response_time_ms = if latencies.is_empty() {
        None
    } else {
        Some(latencies.iter().sum::<u64>() as f64 / latencies.len() as f64)
    };

    Some(Report {
        report_date: Utc::now(),
        start_time: start,
        end_time: end,
        total_checks,
        up_count,
        down_count,
        uptime_percentage: 100.0 * up_count as f64 / total_checks as f64,
        average_response_time_ms,
        downtime_incidents,
    })
}
