use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("base url is not configured, set service.base_url or BASE_URL")]
    MissingBaseUrl,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build mail: {0}")]
    MailBuild(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("mail not delivered: {0}")]
    Mail(String),

    #[error("http server error: {0}")]
    Server(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
