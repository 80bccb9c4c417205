pub mod alarm;
pub mod api;
pub mod collector;
pub mod doctor;
pub mod ent;
pub mod monitor;
pub mod render;
pub mod report;
pub mod schedule;
pub mod storage;
pub mod store;
pub use alarm::{Alarm, Mailer, RetryPolicy, SmtpMailer, UnconfiguredMailer};
pub use collector::listen;
pub use doctor::*;
pub use ent::*;
pub use monitor::*;
pub use store::*;
