use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::core::alarm::Alarm;
use crate::core::ent::*;
use crate::core::monitor::Monitor;
use crate::core::report;
use crate::core::schedule::{report_cycle, ReportOutcome};
use crate::core::store::SharedStore;

pub struct AppState {
    pub store: SharedStore,
    pub monitor: Arc<Monitor>,
    pub alarm: Arc<Alarm>,
    pub reset_logs_after_send: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        service: state.alarm.service_name().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
pub struct PingResponse {
    pub service_name: String,
    pub base_url: String,
    pub results: Vec<ProbeResult>,
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
}

pub async fn ping(State(state): State<Arc<AppState>>) -> Json<PingResponse> {
    let results = state.monitor.probe_only().await;
    Json(PingResponse {
        service_name: state.alarm.service_name().to_string(),
        base_url: state.alarm.service_url().to_string(),
        healthy: crate::core::doctor::is_healthy(&results),
        results,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct KeepAliveResponse {
    pub success: bool,
    pub healthy: bool,
    pub results: Vec<ProbeResult>,
    pub timestamp: DateTime<Utc>,
}

pub async fn keep_alive_cron(State(state): State<Arc<AppState>>) -> Json<KeepAliveResponse> {
    let monitor = state.monitor.clone();
    // run detached so a dropped request cannot cut a cycle in half
    let cycle = tokio::spawn(async move { monitor.run_cycle().await }).await;
    let response = match cycle {
        Ok(outcome) => KeepAliveResponse {
            success: true,
            healthy: outcome.healthy,
            results: outcome.results,
            timestamp: Utc::now(),
        },
        Err(e) => {
            tracing::error!("keep-alive cycle aborted: {}", e);
            KeepAliveResponse {
                success: false,
                healthy: false,
                results: Vec::new(),
                timestamp: Utc::now(),
            }
        }
    };
    Json(response)
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
}

pub async fn current_report(State(state): State<Arc<AppState>>) -> Json<ReportResponse> {
    let end = Utc::now();
    let built = {
        let store = state.store.read().await;
        report::build(&store, Some(end - Duration::days(1)), Some(end))
    };
    let response = match built {
        Some(report) => {
            state.alarm.backup_report(&report);
            ReportResponse {
                success: true,
                message: "Report generated successfully".to_string(),
                report: Some(report),
            }
        }
        None => ReportResponse {
            success: false,
            message: "No data available for report generation".to_string(),
            report: None,
        },
    };
    Json(response)
}

#[derive(Debug, Serialize)]
pub struct CronResponse {
    pub success: bool,
    pub message: String,
}

pub async fn midnight_report_cron(State(state): State<Arc<AppState>>) -> Json<CronResponse> {
    let (store, alarm) = (state.store.clone(), state.alarm.clone());
    let reset = state.reset_logs_after_send;
    let cycle =
        tokio::spawn(async move { report_cycle(&store, &alarm, reset, Utc::now()).await }).await;
    let response = match cycle {
        Ok(outcome) => CronResponse {
            success: outcome == ReportOutcome::Sent,
            message: outcome.message().to_string(),
        },
        Err(e) => {
            tracing::error!("report cycle aborted: {}", e);
            CronResponse {
                success: false,
                message: format!("Report cycle aborted: {}", e),
            }
        }
    };
    Json(response)
}

// one year back is more than any log file keeps
const MAX_LOG_HOURS: i64 = 24 * 365;

#[derive(Debug, Deserialize, Default)]
pub struct LogsQuery {
    pub hours: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs_count: usize,
    pub time_range: TimeRange,
    pub logs: Vec<ProbeResult>,
}

pub async fn recent_logs(
    query: Option<Query<LogsQuery>>,
    State(state): State<Arc<AppState>>,
) -> Json<LogsResponse> {
    let Query(query) = query.unwrap_or_default();
    let end = Utc::now();
    let hours = query.hours.unwrap_or(6).clamp(0, MAX_LOG_HOURS);
    let start = end - Duration::hours(hours);
    let logs = state.store.read().await.query(Some(start), Some(end));
    let logs_count = logs.len();
    let keep = query.limit.unwrap_or(50);
    let logs = logs.into_iter().skip(logs_count.saturating_sub(keep)).collect();
    Json(LogsResponse {
        logs_count,
        time_range: TimeRange { start, end },
        logs,
    })
}

#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub success: bool,
    pub message: String,
    pub alert_sent: bool,
}

pub async fn send_test_alert(State(state): State<Arc<AppState>>) -> Json<AlertResponse> {
    let alarm = state.alarm.clone();
    let alert = Alert::test(alarm.service_name(), alarm.service_url());
    tokio::spawn(async move {
        alarm.send_alert(&alert).await;
    });
    Json(AlertResponse {
        success: true,
        message: "Test alert queued for sending".to_string(),
        alert_sent: true,
    })
}
