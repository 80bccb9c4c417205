use chrono::{DateTime, Local, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::ent::*;

/// Lower bounds (in percent) of the uptime tiers shown in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UptimeTiers {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
}

impl Default for UptimeTiers {
    fn default() -> Self {
        UptimeTiers {
            excellent: 99.0,
            good: 95.0,
            fair: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Excellent => "Excellent",
            Tier::Good => "Good",
            Tier::Fair => "Fair",
            Tier::Poor => "Poor",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Tier::Excellent => "#4CAF50",
            Tier::Good => "#FFC107",
            Tier::Fair => "#FF9800",
            Tier::Poor => "#F44336",
        }
    }
}

impl UptimeTiers {
    pub fn classify(&self, uptime_percentage: f64) -> Tier {
        if uptime_percentage >= self.excellent {
            Tier::Excellent
        } else if uptime_percentage >= self.good {
            Tier::Good
        } else if uptime_percentage >= self.fair {
            Tier::Fair
        } else {
            Tier::Poor
        }
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn local(ts: &DateTime<Utc>, format: &str) -> String {
    ts.with_timezone(&Local).format(format).to_string()
}

const CELL: &str = "padding: 10px; border: 1px solid #ddd;";

pub fn report_subject(service_name: &str) -> String {
    format!("{} - Daily Uptime Report", service_name)
}

pub fn report_html(report: &Report, service_name: &str, service_url: &str, tiers: &UptimeTiers) -> String {
    let tier = tiers.classify(report.uptime_percentage);
    let period = |ts: &Option<DateTime<Utc>>| {
        ts.as_ref()
            .map(|t| local(t, "%Y-%m-%d %H:%M:%S"))
            .unwrap_or_else(|| "N/A".to_string())
    };

    let mut html = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto;">
  <h2 style="color: #333; border-bottom: 2px solid #ddd; padding-bottom: 10px;">{name} - Daily Uptime Report</h2>
  <div style="background-color: #f9f9f9; padding: 15px; border-radius: 5px; margin: 20px 0;">
    <p><strong>Report Period:</strong> {start} to {end}</p>
    <p><strong>Generated:</strong> {generated}</p>
  </div>
  <h3 style="color: #333;">Summary Statistics</h3>
  <table style="border-collapse: collapse; width: 100%; margin-bottom: 20px;">
    <tr><td style="{cell}"><strong>Uptime Percentage</strong></td><td style="{cell} color: {color}; font-weight: bold;">{uptime:.2}%</td></tr>
    <tr><td style="{cell}"><strong>Total Checks</strong></td><td style="{cell}">{total}</td></tr>
    <tr><td style="{cell}"><strong>Successful Checks</strong></td><td style="{cell} color: green;">{up}</td></tr>
    <tr><td style="{cell}"><strong>Failed Checks</strong></td><td style="{cell} color: red;">{down}</td></tr>
"#,
        name = escape(service_name),
        start = period(&report.start_time),
        end = period(&report.end_time),
        generated = local(&report.report_date, "%Y-%m-%d %H:%M:%S"),
        cell = CELL,
        color = tier.color(),
        uptime = report.uptime_percentage,
        total = report.total_checks,
        up = report.up_count,
        down = report.down_count,
    );
    if let Some(avg) = report.average_response_time_ms {
        html.push_str(&format!(
            "    <tr><td style=\"{cell}\"><strong>Average Response Time</strong></td><td style=\"{cell}\">{avg:.0}ms</td></tr>\n",
            cell = CELL,
            avg = avg
        ));
    }
    html.push_str(&format!(
        r#"  </table>
  <div style="background-color: {color}; color: white; padding: 15px; border-radius: 5px; text-align: center; margin: 20px 0;">
    <h3 style="margin: 0;">Service Status: {label}</h3>
  </div>
"#,
        color = tier.color(),
        label = tier.label()
    ));

    if report.downtime_incidents.is_empty() {
        html.push_str(
            r#"  <div style="background-color: #e8f5e8; padding: 15px; border-radius: 5px; margin: 20px 0;">
    <h3 style="color: #2e7d2e; margin: 0;">No downtime incidents recorded!</h3>
  </div>
"#,
        );
    } else {
        html.push_str(&format!(
            r#"  <h3 style="color: #333;">Downtime Incidents</h3>
  <table style="border-collapse: collapse; width: 100%; margin-bottom: 20px;">
    <tr style="background-color: #ffebee;"><th style="{cell}">Timestamp</th><th style="{cell}">Endpoint</th><th style="{cell}">Method</th><th style="{cell}">Error</th></tr>
"#,
            cell = CELL
        ));
        for incident in &report.downtime_incidents {
            html.push_str(&format!(
                "    <tr><td style=\"{cell}\">{ts}</td><td style=\"{cell}\">{endpoint}</td><td style=\"{cell}\">{method}</td><td style=\"{cell} color: red;\">{error}</td></tr>\n",
                cell = CELL,
                ts = local(&incident.timestamp, "%H:%M:%S"),
                endpoint = escape(&incident.endpoint),
                method = incident.method,
                error = escape(&incident.error),
            ));
        }
        html.push_str("  </table>\n");
    }

    html.push_str(&format!(
        r#"  <hr style="margin: 30px 0; border: none; border-top: 1px solid #ddd;">
  <p style="color: #666; font-size: 12px;">This report was generated automatically by the uptime monitor.<br>Service URL: {url}</p>
</body>
</html>
"#,
        url = escape(service_url)
    ));
    html
}

pub fn alert_subject(alert: &Alert) -> String {
    match alert.alert_type {
        AlertType::Downtime => format!("ALERT: {} is DOWN!", alert.service_name),
        AlertType::Recovery => format!("RECOVERY: {} is back online!", alert.service_name),
        AlertType::Test => format!("{} - Service Alert", alert.service_name),
    }
}

pub fn alert_html(alert: &Alert) -> String {
    let (color, heading, title, status, status_color, background) = match alert.alert_type {
        AlertType::Downtime => (
            "#F44336",
            "SERVICE DOWNTIME ALERT",
            format!("{} is Currently DOWN", alert.service_name),
            "DOWN",
            "red",
            "#ffebee",
        ),
        AlertType::Recovery => (
            "#4CAF50",
            "SERVICE RECOVERY NOTIFICATION",
            format!("{} has Recovered", alert.service_name),
            "ONLINE",
            "green",
            "#e8f5e8",
        ),
        AlertType::Test => (
            "#2196F3",
            "TEST ALERT",
            format!("{} alert check", alert.service_name),
            "TEST",
            "#2196F3",
            "#e3f2fd",
        ),
    };

    let mut html = format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto;">
  <div style="background-color: {color}; color: white; padding: 20px; text-align: center;">
    <h1 style="margin: 0;">{heading}</h1>
  </div>
  <div style="padding: 20px;">
    <h2 style="color: #333;">{title}</h2>
    <div style="background-color: {background}; padding: 15px; border-radius: 5px; margin: 20px 0;">
      <p><strong>Time:</strong> {time}</p>
      <p><strong>Service URL:</strong> {url}</p>
      <p><strong>Status:</strong> <span style="color: {status_color}; font-weight: bold;">{status}</span></p>
    </div>
"#,
        color = color,
        heading = heading,
        title = escape(&title),
        background = background,
        time = local(&alert.timestamp, "%Y-%m-%d %H:%M:%S"),
        url = escape(&alert.service_url),
        status_color = status_color,
        status = status,
    );

    if alert.alert_type == AlertType::Downtime {
        html.push_str(&format!(
            r#"    <h3>Failed Endpoints:</h3>
    <table style="border-collapse: collapse; width: 100%; margin-bottom: 20px;">
      <tr style="background-color: #ffebee;"><th style="{cell}">Endpoint</th><th style="{cell}">Method</th><th style="{cell}">Error</th></tr>
"#,
            cell = CELL
        ));
        for failed in &alert.failed_endpoints {
            html.push_str(&format!(
                "      <tr><td style=\"{cell}\">{endpoint}</td><td style=\"{cell}\">{method}</td><td style=\"{cell} color: red;\">{error}</td></tr>\n",
                cell = CELL,
                endpoint = escape(&failed.endpoint),
                method = failed.method,
                error = escape(failed.error.as_deref().unwrap_or("Unknown error")),
            ));
        }
        html.push_str("    </table>\n");
    }
    if let Some(message) = &alert.message {
        html.push_str(&format!("    <p>{}</p>\n", escape(message)));
    }

    html.push_str(
        r#"  </div>
  <hr style="margin: 30px 0; border: none; border-top: 1px solid #ddd;">
  <p style="color: #666; font-size: 12px;">This alert was generated automatically by the uptime monitor.</p>
</body>
</html>
"#,
    );
    html
}
