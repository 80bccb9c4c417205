//! Keeps a remote web service awake and watches it.
//!
//! A probe loop hits the configured endpoints on a fixed cadence, records every
//! attempt in an append-only JSON log and mails an alert the moment the service
//! goes down or comes back. A second loop mails a daily uptime report built from
//! that log. Both cycles can also be triggered over HTTP for hosts without a
//! long-running process.

pub mod config;
pub mod core;
mod error;

pub use error::{Error, Result};
