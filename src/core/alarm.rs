use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::Serialize;
use uuid::Uuid;

use crate::core::ent::*;
use crate::core::render::{self, UptimeTiers};
use crate::core::storage::{write_json, write_text};
use crate::config::EmailConfig;
use crate::{Error, Result};

/// One rendered message ready for the transport.
#[derive(Debug, Clone)]
pub struct Mail {
    pub subject: String,
    pub html: String,
    pub urgent: bool,
}

/// Delivery channel for rendered mail. Implementations may block.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: &Mail) -> Result<()>;
}

#[derive(Clone)]
struct XPriority(u8);

impl Header for XPriority {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Priority")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(XPriority(s.trim().parse()?))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.to_string())
    }
}

pub struct SmtpMailer {
    from: Mailbox,
    to: Vec<Mailbox>,
    mailer: SmtpTransport,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig) -> Result<SmtpMailer> {
        let (username, password) = match (&config.smtp_username, &config.smtp_password) {
            (Some(u), Some(p)) => (u.clone(), p.clone()),
            _ => return Err(Error::Mail("smtp credentials are missing".to_string())),
        };
        let from = config
            .sender_email
            .as_deref()
            .ok_or_else(|| Error::Mail("sender address is missing".to_string()))?
            .parse::<Mailbox>()?;
        if config.recipient_emails.is_empty() {
            return Err(Error::Mail("no recipient addresses configured".to_string()));
        }
        let to = config
            .recipient_emails
            .iter()
            .map(|r| r.parse::<Mailbox>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let creds = Credentials::new(username, password);
        let mailer = SmtpTransport::starttls_relay(&config.smtp_server)?
            .port(config.smtp_port)
            .credentials(creds)
            .build();
        tracing::info!(
            "smtp mailer ready via {}:{} for {} recipients",
            config.smtp_server,
            config.smtp_port,
            to.len()
        );
        Ok(SmtpMailer { from, to, mailer })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, mail: &Mail) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .header(XPriority(if mail.urgent { 1 } else { 3 }));
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let email = builder.body(mail.html.clone())?;
        let response = self.mailer.send(&email)?;
        if response.is_positive() {
            Ok(())
        } else {
            Err(Error::Mail(format!("smtp server answered {}", response.code())))
        }
    }
}

/// Stands in when smtp settings are incomplete; every send fails.
pub struct UnconfiguredMailer;

impl Mailer for UnconfiguredMailer {
    fn send(&self, _mail: &Mail) -> Result<()> {
        Err(Error::Mail("smtp configuration is incomplete".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(300),
        }
    }
}

/// Renders, backs up and mails reports and alerts.
pub struct Alarm {
    mailer: Arc<dyn Mailer>,
    backup_dir: PathBuf,
    service_name: String,
    service_url: String,
    tiers: UptimeTiers,
    retry: RetryPolicy,
}

impl Alarm {
    pub fn new(
        mailer: Arc<dyn Mailer>,
        backup_dir: PathBuf,
        service_name: String,
        service_url: String,
        tiers: UptimeTiers,
        retry: RetryPolicy,
    ) -> Alarm {
        Alarm {
            mailer,
            backup_dir,
            service_name,
            service_url,
            tiers,
            retry,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub async fn deliver(&self, payload: &Payload) -> bool {
        match payload {
            Payload::Report(report) => self.send_report(report).await,
            Payload::Alert(alert) => self.send_alert(alert).await,
        }
    }

    /// Backs the report up, then tries the transport up to the retry budget.
    pub async fn send_report(&self, report: &Report) -> bool {
        self.backup_report(report);
        let mail = Mail {
            subject: render::report_subject(&self.service_name),
            html: self.report_html(report),
            urgent: false,
        };
        let attempts = self.retry.attempts.max(1);
        for attempt in 1..=attempts {
            match self.transmit(mail.clone()).await {
                Ok(()) => {
                    tracing::info!("report mailed on attempt {}/{}", attempt, attempts);
                    return true;
                }
                Err(e) => tracing::warn!("report mail attempt {}/{} failed: {}", attempt, attempts, e),
            }
            if attempt < attempts {
                tracing::info!("retrying report mail in {:?}", self.retry.delay);
                tokio::time::sleep(self.retry.delay).await;
            }
        }
        tracing::error!(
            "report not mailed after {} attempts, the backup copy is kept",
            attempts
        );
        false
    }

    /// Backs the alert up, then makes a single delivery attempt.
    pub async fn send_alert(&self, alert: &Alert) -> bool {
        self.backup_alert(alert);
        let mail = Mail {
            subject: render::alert_subject(alert),
            html: render::alert_html(alert),
            urgent: alert.alert_type == AlertType::Downtime,
        };
        match self.transmit(mail).await {
            Ok(()) => {
                tracing::info!("{} alert mailed", alert.alert_type.as_str());
                true
            }
            Err(e) => {
                tracing::error!("could not mail {} alert: {}", alert.alert_type.as_str(), e);
                false
            }
        }
    }

    pub fn report_html(&self, report: &Report) -> String {
        render::report_html(report, &self.service_name, &self.service_url, &self.tiers)
    }

    pub fn backup_report(&self, report: &Report) -> Option<PathBuf> {
        let dir = self.backup_dir.join("report_backups");
        let stem = format!("report_backup_{}", stamp());
        save_backup(&dir, &stem, report, &self.report_html(report))
    }

    pub fn backup_alert(&self, alert: &Alert) -> Option<PathBuf> {
        let dir = self.backup_dir.join("alert_backups");
        let stem = format!("alert_{}_{}", alert.alert_type.as_str(), stamp());
        save_backup(&dir, &stem, alert, &render::alert_html(alert))
    }

    // the smtp transport blocks, keep it off the async workers
    async fn transmit(&self, mail: Mail) -> Result<()> {
        let mailer = Arc::clone(&self.mailer);
        tokio::task::spawn_blocking(move || mailer.send(&mail)).await?
    }
}

fn stamp() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format("%Y-%m-%d_%H-%M-%S"), &id[..8])
}

fn save_backup<T: Serialize>(dir: &Path, stem: &str, value: &T, html: &str) -> Option<PathBuf> {
    let json_path = dir.join(format!("{}.json", stem));
    let html_path = dir.join(format!("{}.html", stem));
    let saved = write_json(&json_path, value).and_then(|_| write_text(&html_path, html));
    match saved {
        Ok(()) => {
            tracing::info!("backup saved to {}", json_path.display());
            Some(json_path)
        }
        Err(e) => {
            tracing::error!("failed to save backup {}: {}", json_path.display(), e);
            None
        }
    }
}
