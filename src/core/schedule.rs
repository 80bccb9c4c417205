use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::ReportingConfig;
use crate::core::alarm::Alarm;
use crate::core::monitor::Monitor;
use crate::core::report;
use crate::core::store::SharedStore;

/// Fires once per calendar day when the wall clock reaches `at` (to the minute).
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    at: NaiveTime,
    last_handled: Option<NaiveDate>,
}

impl DailyTrigger {
    pub fn new(at: NaiveTime) -> DailyTrigger {
        DailyTrigger {
            at,
            last_handled: None,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.hour() == self.at.hour()
            && now.minute() == self.at.minute()
            && self.last_handled != Some(now.date())
    }

    pub fn mark_handled(&mut self, date: NaiveDate) {
        self.last_handled = Some(date);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Sent,
    Failed,
    NoData,
}

impl ReportOutcome {
    /// Sent and no-data both settle the day; a failed send does not.
    pub fn settles_day(&self) -> bool {
        !matches!(self, ReportOutcome::Failed)
    }

    pub fn message(&self) -> &'static str {
        match self {
            ReportOutcome::Sent => "Daily report sent successfully",
            ReportOutcome::Failed => "Failed to send daily report",
            ReportOutcome::NoData => "No data available for daily report",
        }
    }
}

/// Builds the report for the 24 hours ending at `end` and delivers it.
pub async fn report_cycle(
    store: &SharedStore,
    alarm: &Alarm,
    reset_logs: bool,
    end: DateTime<Utc>,
) -> ReportOutcome {
    let start = end - chrono::Duration::days(1);
    let built = {
        let store = store.read().await;
        report::build(&store, Some(start), Some(end))
    };
    let Some(report) = built else {
        return ReportOutcome::NoData;
    };
    if !alarm.send_report(&report).await {
        return ReportOutcome::Failed;
    }
    if reset_logs {
        store.write().await.clear();
    }
    ReportOutcome::Sent
}

/// One tick of the report loop. Returns the outcome when a report was due.
pub async fn report_tick(
    trigger: &mut DailyTrigger,
    now: DateTime<Local>,
    store: &SharedStore,
    alarm: &Arc<Alarm>,
    reset_logs: bool,
) -> Option<ReportOutcome> {
    if !trigger.is_due(now.naive_local()) {
        return None;
    }
    info!("daily report is due, building it");
    let (store, alarm) = (store.clone(), alarm.clone());
    let end = now.with_timezone(&Utc);
    let cycle =
        tokio::spawn(async move { report_cycle(&store, &alarm, reset_logs, end).await });
    match cycle.await {
        Ok(outcome) => {
            match outcome {
                ReportOutcome::Sent => info!("{}", outcome.message()),
                ReportOutcome::NoData => warn!("{}", outcome.message()),
                ReportOutcome::Failed => error!("{}", outcome.message()),
            }
            if outcome.settles_day() {
                trigger.mark_handled(now.date_naive());
            }
            Some(outcome)
        }
        Err(e) => {
            error!("report cycle aborted: {}", e);
            Some(ReportOutcome::Failed)
        }
    }
}

/// Probe loop: runs a cycle, then sleeps out the rest of the interval.
pub fn schedule_checks(monitor: Arc<Monitor>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("probe loop started, interval {:?}", interval);
        loop {
            let started = Instant::now();
            let m = monitor.clone();
            if let Err(e) = tokio::spawn(async move { m.run_cycle().await }).await {
                error!("probe cycle aborted: {}", e);
            }
            let took = started.elapsed();
            match interval.checked_sub(took) {
                Some(rest) if !rest.is_zero() => tokio::time::sleep(rest).await,
                _ => warn!("probe cycle took {:?}, longer than the {:?} interval", took, interval),
            }
        }
    })
}

/// Report loop: polls the wall clock and sends the daily report once a day.
pub fn schedule_reports(
    store: SharedStore,
    alarm: Arc<Alarm>,
    reporting: ReportingConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("report loop started, daily report at {}", reporting.schedule.format("%H:%M"));
        let mut trigger = DailyTrigger::new(reporting.schedule);
        loop {
            let fired = report_tick(
                &mut trigger,
                Local::now(),
                &store,
                &alarm,
                reporting.reset_logs_after_send,
            )
            .await;
            let pause = if fired.is_some() {
                reporting.cooldown
            } else {
                reporting.tick
            };
            tokio::time::sleep(pause).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alarm::{Mail, Mailer, RetryPolicy};
    use crate::core::ent::{Method, ProbeResult, ProbeStatus};
    use crate::core::render::UptimeTiers;
    use crate::core::store::LogStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingMailer {
        fail: bool,
        calls: AtomicUsize,
    }

    impl Mailer for CountingMailer {
        fn send(&self, _mail: &Mail) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(crate::Error::Mail("down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn setup(fail: bool, dir: &std::path::Path) -> (SharedStore, Arc<Alarm>, Arc<CountingMailer>) {
        let mailer = Arc::new(CountingMailer {
            fail,
            calls: AtomicUsize::new(0),
        });
        let alarm = Arc::new(Alarm::new(
            mailer.clone(),
            dir.to_path_buf(),
            "Svc".to_string(),
            "https://svc.example".to_string(),
            UptimeTiers::default(),
            RetryPolicy {
                attempts: 2,
                delay: Duration::ZERO,
            },
        ));
        let store = LogStore::open(dir.join("log.json")).shared();
        (store, alarm, mailer)
    }

    async fn seed(store: &SharedStore, at: DateTime<Utc>) {
        store.write().await.append(ProbeResult {
            endpoint: "/ping".to_string(),
            method: Method::Get,
            status: ProbeStatus::Up,
            response_time_ms: Some(25),
            status_code: Some(200),
            error: None,
            timestamp: at,
        });
    }

    fn midnight(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn trigger_matches_hour_and_minute_once_per_day() {
        let mut trigger = DailyTrigger::new(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let now = midnight(2);
        assert!(trigger.is_due(now));
        assert!(trigger.is_due(now + chrono::Duration::seconds(45)));
        assert!(!trigger.is_due(now + chrono::Duration::minutes(1)));

        trigger.mark_handled(now.date());
        assert!(!trigger.is_due(now + chrono::Duration::seconds(30)));
        assert!(trigger.is_due(midnight(3)));
    }

    #[tokio::test]
    async fn two_due_ticks_send_one_report() {
        let dir = tempfile::tempdir().unwrap();
        let (store, alarm, mailer) = setup(false, dir.path());
        let now = Local::now();
        seed(&store, now.with_timezone(&Utc) - chrono::Duration::hours(1)).await;

        let mut trigger = DailyTrigger::new(now.time());
        let first = report_tick(&mut trigger, now, &store, &alarm, true).await;
        let second = report_tick(&mut trigger, now, &store, &alarm, true).await;

        assert_eq!(first, Some(ReportOutcome::Sent));
        assert_eq!(second, None);
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 1);
        assert!(store.read().await.is_empty());
    }

    #[tokio::test]
    async fn failed_send_keeps_logs_and_leaves_day_open() {
        let dir = tempfile::tempdir().unwrap();
        let (store, alarm, mailer) = setup(true, dir.path());
        let now = Local::now();
        seed(&store, now.with_timezone(&Utc) - chrono::Duration::minutes(5)).await;

        let mut trigger = DailyTrigger::new(now.time());
        let outcome = report_tick(&mut trigger, now, &store, &alarm, true).await;
        assert_eq!(outcome, Some(ReportOutcome::Failed));
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.read().await.len(), 1);
        assert!(trigger.is_due(now.naive_local()));
    }

    #[tokio::test]
    async fn empty_window_settles_the_day_without_mail() {
        let dir = tempfile::tempdir().unwrap();
        let (store, alarm, mailer) = setup(false, dir.path());
        let end = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        seed(&store, end - chrono::Duration::days(3)).await;

        let outcome = report_cycle(&store, &alarm, true, end).await;
        assert_eq!(outcome, ReportOutcome::NoData);
        assert!(outcome.settles_day());
        assert_eq!(mailer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.read().await.len(), 1);
    }

    #[tokio::test]
    async fn logs_kept_when_reset_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let (store, alarm, _mailer) = setup(false, dir.path());
        let end = Utc::now();
        seed(&store, end - chrono::Duration::hours(2)).await;

        assert_eq!(report_cycle(&store, &alarm, false, end).await, ReportOutcome::Sent);
        assert_eq!(store.read().await.len(), 1);
        assert_eq!(
            std::fs::read_dir(dir.path().join("report_backups")).unwrap().count(),
            2
        );
    }
}
