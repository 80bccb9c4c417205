use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::alarm::RetryPolicy;
use crate::core::ent::Method;
use crate::core::render::UptimeTiers;
use crate::{Error, Result};

#[derive(Serialize, Deserialize, Debug)]
pub struct Profiles {
    pub active: String,
}
// application.yml only names the active profile
#[derive(Serialize, Deserialize, Debug)]
pub struct EnvConfig {
    pub profiles: Profiles,
}

/// Shape of a configuration file. Every key is optional; anything left out
/// falls through to the environment and then to the built-in default.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Default, Clone)]
#[serde(default)]
pub struct RawConfig {
    pub server: RawServer,
    pub service: RawService,
    pub reporting: RawReporting,
    pub email: RawEmail,
    pub storage: RawStorage,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Default, Clone)]
#[serde(default)]
pub struct RawServer {
    pub addr: Option<String>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Default, Clone)]
#[serde(default)]
pub struct RawService {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub endpoints: Option<Vec<String>>,
    pub http_methods: Option<Vec<Method>>,
    pub timeout_seconds: Option<u64>,
    pub interval_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Default, Clone)]
#[serde(default)]
pub struct RawReporting {
    /// Wall-clock time of the daily report, `HH:MM`.
    pub schedule: Option<String>,
    pub reset_logs_after_send: Option<bool>,
    pub retry_count: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
    pub tick_seconds: Option<u64>,
    pub cooldown_seconds: Option<u64>,
    pub tiers: Option<UptimeTiers>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Default, Clone)]
#[serde(default)]
pub struct RawEmail {
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub sender_email: Option<String>,
    pub recipient_emails: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, JsonSchema, Debug, Default, Clone)]
#[serde(default)]
pub struct RawStorage {
    pub log_file: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub reporting: ReportingConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub base_url: String,
    pub endpoints: Vec<String>,
    pub methods: Vec<Method>,
    pub timeout: Duration,
    pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct ReportingConfig {
    pub schedule: NaiveTime,
    pub reset_logs_after_send: bool,
    pub retry: RetryPolicy,
    pub tick: Duration,
    pub cooldown: Duration,
    pub tiers: UptimeTiers,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub sender_email: Option<String>,
    pub recipient_emails: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub log_file: PathBuf,
    pub backup_dir: PathBuf,
}

impl RawConfig {
    /// Reads the environment-variable layer through `lookup`, so callers can
    /// substitute a map in place of the process environment.
    pub fn from_env<F>(lookup: F) -> Result<RawConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(*name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        Ok(RawConfig {
            server: RawServer {
                addr: var(&["SERVER_ADDR"]),
            },
            service: RawService {
                name: var(&["SERVICE_NAME"]),
                base_url: var(&["BASE_URL", "SERVICE_URL"]),
                endpoints: var(&["ENDPOINTS"]).map(|v| split_list(&v)),
                http_methods: var(&["HTTP_METHODS"])
                    .map(|v| {
                        split_list(&v)
                            .iter()
                            .map(|m| m.parse())
                            .collect::<Result<Vec<Method>>>()
                    })
                    .transpose()?,
                timeout_seconds: parse_var("TIMEOUT_SECONDS", var(&["TIMEOUT_SECONDS"]))?,
                interval_seconds: parse_var("INTERVAL_SECONDS", var(&["INTERVAL_SECONDS"]))?,
            },
            reporting: RawReporting {
                schedule: var(&["REPORT_SCHEDULE"]),
                reset_logs_after_send: parse_var(
                    "RESET_LOGS_AFTER_SEND",
                    var(&["RESET_LOGS_AFTER_SEND"]),
                )?,
                retry_count: parse_var("REPORT_RETRY_COUNT", var(&["REPORT_RETRY_COUNT"]))?,
                retry_delay_seconds: parse_var(
                    "REPORT_RETRY_DELAY_SECONDS",
                    var(&["REPORT_RETRY_DELAY_SECONDS"]),
                )?,
                tick_seconds: None,
                cooldown_seconds: None,
                tiers: None,
            },
            email: RawEmail {
                smtp_server: var(&["SMTP_SERVER"]),
                smtp_port: parse_var("SMTP_PORT", var(&["SMTP_PORT"]))?,
                smtp_username: var(&["EMAIL_USER", "SMTP_USERNAME"]),
                smtp_password: var(&["EMAIL_PASSWORD", "SMTP_PASSWORD"]),
                sender_email: var(&["FROM_EMAIL", "SENDER_EMAIL"]),
                recipient_emails: var(&["RECIPIENT_EMAIL", "RECIPIENT_EMAILS"])
                    .map(|v| split_list(&v)),
            },
            storage: RawStorage {
                log_file: var(&["LOG_FILE"]).map(PathBuf::from),
                backup_dir: var(&["BACKUP_DIR"]).map(PathBuf::from),
            },
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_var<T: std::str::FromStr>(name: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| Error::Config(format!("{} has an invalid value: {}", name, v)))
        })
        .transpose()
}

fn pick<T>(file: Option<T>, env: Option<T>, default: T) -> T {
    file.or(env).unwrap_or(default)
}

/// Merges the file layer over the environment layer over the defaults.
pub fn resolve(file: RawConfig, env: RawConfig) -> Result<Config> {
    let base_url = file
        .service
        .base_url
        .filter(|url| !url.trim().is_empty())
        .or(env.service.base_url)
        .map(|url| url.trim().trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
        .ok_or(Error::MissingBaseUrl)?;

    let addr = pick(
        file.server.addr,
        env.server.addr,
        "127.0.0.1:3000".to_string(),
    );
    let addr = addr
        .parse::<SocketAddr>()
        .map_err(|_| Error::Config(format!("server address is invalid: {}", addr)))?;

    let schedule = pick(
        file.reporting.schedule,
        env.reporting.schedule,
        "00:00".to_string(),
    );
    let schedule = NaiveTime::parse_from_str(&schedule, "%H:%M")
        .map_err(|_| Error::Config(format!("report schedule must be HH:MM, got {}", schedule)))?;

    let endpoints = pick(
        file.service.endpoints,
        env.service.endpoints,
        vec!["/ping".to_string(), "/api/health".to_string()],
    );
    let methods = pick(
        file.service.http_methods,
        env.service.http_methods,
        vec![Method::Get, Method::Head],
    );
    if endpoints.is_empty() || methods.is_empty() {
        return Err(Error::Config(
            "at least one endpoint and one http method are required".to_string(),
        ));
    }

    let timeout = pick(
        file.service.timeout_seconds,
        env.service.timeout_seconds,
        10,
    );
    let interval = pick(
        file.service.interval_seconds,
        env.service.interval_seconds,
        60,
    );
    if timeout == 0 || interval == 0 {
        return Err(Error::Config(
            "probe timeout and interval must be at least one second".to_string(),
        ));
    }
    let (timeout, interval) = (Duration::from_secs(timeout), Duration::from_secs(interval));

    let recipient_emails = pick(
        file.email.recipient_emails,
        env.email.recipient_emails,
        Vec::new(),
    );

    Ok(Config {
        server: ServerConfig { addr },
        service: ServiceConfig {
            name: pick(
                file.service.name,
                env.service.name,
                "Render Service".to_string(),
            ),
            base_url,
            endpoints,
            methods,
            timeout,
            interval,
        },
        reporting: ReportingConfig {
            schedule,
            reset_logs_after_send: pick(
                file.reporting.reset_logs_after_send,
                env.reporting.reset_logs_after_send,
                true,
            ),
            retry: RetryPolicy {
                attempts: pick(file.reporting.retry_count, env.reporting.retry_count, 3).max(1),
                delay: Duration::from_secs(pick(
                    file.reporting.retry_delay_seconds,
                    env.reporting.retry_delay_seconds,
                    300,
                )),
            },
            tick: Duration::from_secs(pick(
                file.reporting.tick_seconds,
                env.reporting.tick_seconds,
                30,
            )),
            cooldown: Duration::from_secs(pick(
                file.reporting.cooldown_seconds,
                env.reporting.cooldown_seconds,
                120,
            )),
            tiers: pick(file.reporting.tiers, env.reporting.tiers, UptimeTiers::default()),
        },
        email: EmailConfig {
            smtp_server: pick(
                file.email.smtp_server,
                env.email.smtp_server,
                "smtp.gmail.com".to_string(),
            ),
            smtp_port: pick(file.email.smtp_port, env.email.smtp_port, 587),
            smtp_username: file.email.smtp_username.or(env.email.smtp_username),
            smtp_password: file.email.smtp_password.or(env.email.smtp_password),
            sender_email: file.email.sender_email.or(env.email.sender_email),
            recipient_emails,
        },
        storage: StorageConfig {
            log_file: pick(
                file.storage.log_file,
                env.storage.log_file,
                PathBuf::from("logs/uptime_logs.json"),
            ),
            backup_dir: pick(
                file.storage.backup_dir,
                env.storage.backup_dir,
                PathBuf::from("logs"),
            ),
        },
    })
}

// Load one yaml (or json) file; a missing or broken file yields None
fn load_config<T>(path: &Path) -> Option<T>
where
    T: DeserializeOwned,
{
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            info!("config file {} not read: {}", path.display(), err);
            return None;
        }
    };
    match serde_yaml::from_str::<T>(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            warn!("config file {} is invalid, ignoring it: {}", path.display(), err);
            None
        }
    }
}

// application.yml in the given directory
fn load_env_config(dir: &Path) -> Option<EnvConfig> {
    load_config::<EnvConfig>(&dir.join("application.yml"))
}
// application-{active}.yml in the given directory
fn load_bootstrap_config_from_env(dir: &Path, active: String) -> Option<RawConfig> {
    let path = dir.join(format!("application-{}.yml", active));
    load_config::<RawConfig>(&path)
}
// Follow the active profile named by application.yml
pub fn load_bootstrap_config(dir: &Path) -> Option<RawConfig> {
    if let Some(env_config) = load_env_config(dir) {
        return load_bootstrap_config_from_env(dir, env_config.profiles.active);
    }
    None
}

/// Resolves the effective configuration: an explicit file if given, the active
/// profile otherwise, layered over the process environment.
pub fn load(explicit: Option<&Path>, profile_dir: &Path) -> Result<Config> {
    let file = match explicit {
        Some(path) => load_config::<RawConfig>(path),
        None => load_bootstrap_config(profile_dir),
    }
    .unwrap_or_default();
    let env = RawConfig::from_env(|name| std::env::var(name).ok())?;
    resolve(file, env)
}
