use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Method {
    #[serde(rename = "GET", alias = "get")]
    Get,
    #[serde(rename = "HEAD", alias = "head")]
    Head,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Head => write!(f, "HEAD"),
        }
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            other => Err(Error::Config(format!("unsupported http method: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Up,
    Down,
}

/// Outcome of one request against one endpoint/method pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub endpoint: String,
    pub method: Method,
    pub status: ProbeStatus,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn is_up(&self) -> bool {
        self.status == ProbeStatus::Up
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: Method,
    pub error: String,
}

/// Uptime statistics over a window of the probe log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_date: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_checks: usize,
    pub up_count: usize,
    pub down_count: usize,
    pub uptime_percentage: f64,
    pub average_response_time_ms: Option<f64>,
    pub downtime_incidents: Vec<Incident>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertType {
    Downtime,
    Recovery,
    Test,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Downtime => "downtime",
            AlertType::Recovery => "recovery",
            AlertType::Test => "test",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub timestamp: DateTime<Utc>,
    pub service_name: String,
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_endpoints: Vec<ProbeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery_endpoints: Vec<ProbeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_endpoints_checked: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Alert {
    pub fn downtime(service_name: &str, service_url: &str, results: &[ProbeResult]) -> Alert {
        let failed: Vec<ProbeResult> = results.iter().filter(|r| !r.is_up()).cloned().collect();
        Alert {
            alert_type: AlertType::Downtime,
            timestamp: Utc::now(),
            service_name: service_name.to_string(),
            service_url: service_url.to_string(),
            total_endpoints_checked: Some(results.len()),
            failed_count: Some(failed.len()),
            failed_endpoints: failed,
            recovery_endpoints: Vec::new(),
            message: None,
        }
    }

    pub fn recovery(service_name: &str, service_url: &str, results: &[ProbeResult]) -> Alert {
        Alert {
            alert_type: AlertType::Recovery,
            timestamp: Utc::now(),
            service_name: service_name.to_string(),
            service_url: service_url.to_string(),
            failed_endpoints: Vec::new(),
            recovery_endpoints: results.iter().filter(|r| r.is_up()).cloned().collect(),
            total_endpoints_checked: None,
            failed_count: None,
            message: Some("Service has recovered and is responding normally".to_string()),
        }
    }

    pub fn test(service_name: &str, service_url: &str) -> Alert {
        Alert {
            alert_type: AlertType::Test,
            timestamp: Utc::now(),
            service_name: service_name.to_string(),
            service_url: service_url.to_string(),
            failed_endpoints: Vec::new(),
            recovery_endpoints: Vec::new(),
            total_endpoints_checked: None,
            failed_count: None,
            message: Some("This is a test alert to verify email functionality".to_string()),
        }
    }
}

/// Anything the notifier can deliver.
#[derive(Debug, Clone)]
pub enum Payload {
    Report(Report),
    Alert(Alert),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ProbeStatus) -> ProbeResult {
        ProbeResult {
            endpoint: "/ping".to_string(),
            method: Method::Get,
            status,
            response_time_ms: Some(12),
            status_code: Some(200),
            error: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!(" HEAD ".parse::<Method>().unwrap(), Method::Head);
        assert!("POST".parse::<Method>().is_err());
    }

    #[test]
    fn probe_result_uses_wire_names() {
        let json = serde_json::to_value(result(ProbeStatus::Up)).unwrap();
        assert_eq!(json["status"], "UP");
        assert_eq!(json["method"], "GET");
        assert_eq!(json["response_time_ms"], 12);
    }

    #[test]
    fn downtime_alert_keeps_only_failures() {
        let results = vec![result(ProbeStatus::Up), result(ProbeStatus::Down)];
        let alert = Alert::downtime("svc", "https://svc.example", &results);
        assert_eq!(alert.failed_endpoints.len(), 1);
        assert_eq!(alert.total_endpoints_checked, Some(2));
        assert_eq!(alert.failed_count, Some(1));

        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["alert_type"], "DOWNTIME");
        assert!(json.get("recovery_endpoints").is_none());
    }
}
