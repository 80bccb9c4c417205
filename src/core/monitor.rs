use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::alarm::Alarm;
use crate::core::doctor::{is_healthy, Doctor};
use crate::core::ent::*;
use crate::core::store::SharedStore;

/// Whether the current outage has already been reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Healthy,
    DownNotified,
}

impl HealthState {
    /// Feeds one health observation; returns the alert to raise, if any.
    pub fn observe(&mut self, healthy: bool) -> Option<AlertType> {
        match (*self, healthy) {
            (HealthState::Healthy, false) => {
                *self = HealthState::DownNotified;
                Some(AlertType::Downtime)
            }
            (HealthState::DownNotified, true) => {
                *self = HealthState::Healthy;
                Some(AlertType::Recovery)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub results: Vec<ProbeResult>,
    pub healthy: bool,
    pub alert: Option<AlertType>,
}

// Records every probe and decides when to alarm
pub struct Monitor {
    doctor: Doctor,
    store: SharedStore,
    alarm: Arc<Alarm>,
    // held for a whole cycle, so cycles never overlap
    state: Mutex<HealthState>,
}

impl Monitor {
    pub fn new(doctor: Doctor, store: SharedStore, alarm: Arc<Alarm>) -> Monitor {
        Monitor {
            doctor,
            store,
            alarm,
            state: Mutex::new(HealthState::default()),
        }
    }

    pub async fn state(&self) -> HealthState {
        *self.state.lock().await
    }

    /// Probe, run the transition logic, then log every result.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let mut state = self.state.lock().await;
        let results = self.doctor.check_all().await;
        let healthy = is_healthy(&results);

        let alert = state.observe(healthy);
        match alert {
            Some(AlertType::Downtime) => {
                tracing::warn!("service down detected, sending alert");
                let alert = Alert::downtime(
                    self.alarm.service_name(),
                    self.doctor.base_url(),
                    &results,
                );
                self.alarm.send_alert(&alert).await;
            }
            Some(AlertType::Recovery) => {
                tracing::info!("service recovered, sending notice");
                let alert = Alert::recovery(
                    self.alarm.service_name(),
                    self.doctor.base_url(),
                    &results,
                );
                self.alarm.send_alert(&alert).await;
            }
            Some(AlertType::Test) | None => {}
        }

        self.record(&results).await;
        tracing::info!(
            "probe cycle done, service {}",
            if healthy { "healthy" } else { "unhealthy" }
        );
        CycleOutcome {
            results,
            healthy,
            alert,
        }
    }

    /// Probe and log without touching the alert state.
    pub async fn probe_only(&self) -> Vec<ProbeResult> {
        let _cycle = self.state.lock().await;
        let results = self.doctor.check_all().await;
        self.record(&results).await;
        results
    }

    async fn record(&self, results: &[ProbeResult]) {
        let mut store = self.store.write().await;
        for result in results {
            store.append(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alarm::{Mail, Mailer, RetryPolicy};
    use crate::core::render::UptimeTiers;
    use crate::core::report;
    use crate::core::store::LogStore;
    use axum::{extract::State, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Outbox(std::sync::Mutex<Vec<String>>);

    impl Mailer for Outbox {
        fn send(&self, mail: &Mail) -> crate::Result<()> {
            self.0.lock().unwrap().push(mail.subject.clone());
            Ok(())
        }
    }

    #[test]
    fn only_edges_raise_alerts() {
        let mut state = HealthState::default();
        let alerts: Vec<Option<AlertType>> = [false, false, false, true]
            .into_iter()
            .map(|healthy| state.observe(healthy))
            .collect();
        assert_eq!(
            alerts,
            vec![Some(AlertType::Downtime), None, None, Some(AlertType::Recovery)]
        );
        assert_eq!(state, HealthState::Healthy);
    }

    #[test]
    fn healthy_stays_quiet() {
        let mut state = HealthState::Healthy;
        assert_eq!(state.observe(true), None);
        assert_eq!(state, HealthState::Healthy);
    }

    async fn spawn_target(up: Arc<AtomicBool>) -> String {
        let app = Router::new()
            .route(
                "/ping",
                get(|State(up): State<Arc<AtomicBool>>| async move {
                    if up.load(Ordering::SeqCst) {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    }
                }),
            )
            .route(
                "/health",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    StatusCode::OK
                }),
            )
            .with_state(up);
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = axum::Server::bind(&addr).serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    fn monitor(base: &str, endpoints: &[&str], dir: &std::path::Path, outbox: Arc<Outbox>) -> (Monitor, SharedStore) {
        let store = LogStore::open(dir.join("uptime_logs.json")).shared();
        let alarm = Arc::new(Alarm::new(
            outbox,
            dir.to_path_buf(),
            "Svc".to_string(),
            base.to_string(),
            UptimeTiers::default(),
            RetryPolicy {
                attempts: 1,
                delay: Duration::ZERO,
            },
        ));
        let doctor = Doctor::new(
            base,
            endpoints.iter().map(|e| e.to_string()).collect(),
            vec![Method::Get],
            Duration::from_millis(300),
        );
        (Monitor::new(doctor, store.clone(), alarm), store)
    }

    #[tokio::test]
    async fn outage_alerts_once_then_recovers() {
        let up = Arc::new(AtomicBool::new(false));
        let base = spawn_target(up.clone()).await;
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::default());
        let (monitor, store) = monitor(&base, &["/ping"], dir.path(), outbox.clone());

        for _ in 0..3 {
            assert!(!monitor.run_cycle().await.healthy);
        }
        assert_eq!(monitor.state().await, HealthState::DownNotified);
        up.store(true, Ordering::SeqCst);
        let outcome = monitor.run_cycle().await;
        assert!(outcome.healthy);
        assert_eq!(outcome.alert, Some(AlertType::Recovery));

        let subjects = outbox.0.lock().unwrap().clone();
        assert_eq!(
            subjects,
            vec!["ALERT: Svc is DOWN!", "RECOVERY: Svc is back online!"]
        );
        assert_eq!(store.read().await.len(), 4);
    }

    #[tokio::test]
    async fn one_fast_endpoint_keeps_the_service_healthy() {
        let base = spawn_target(Arc::new(AtomicBool::new(true))).await;
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::default());
        let (monitor, store) = monitor(&base, &["/ping", "/health"], dir.path(), outbox.clone());

        let outcome = monitor.run_cycle().await;
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.healthy);
        assert_eq!(outcome.alert, None);
        assert!(outbox.0.lock().unwrap().is_empty());

        let ping_latency = outcome.results[0].response_time_ms.unwrap() as f64;
        assert_eq!(outcome.results[1].response_time_ms, Some(300));
        let store = store.read().await;
        assert_eq!(store.len(), 2);
        let report = report::build(&store, None, None).unwrap();
        assert_eq!(report.average_response_time_ms, Some(ping_latency));
        assert_eq!(report.downtime_incidents.len(), 1);
    }

    #[tokio::test]
    async fn probe_only_never_alerts() {
        let base = spawn_target(Arc::new(AtomicBool::new(false))).await;
        let dir = tempfile::tempdir().unwrap();
        let outbox = Arc::new(Outbox::default());
        let (monitor, store) = monitor(&base, &["/ping"], dir.path(), outbox.clone());

        let results = monitor.probe_only().await;
        assert_eq!(results.len(), 1);
        assert!(outbox.0.lock().unwrap().is_empty());
        assert_eq!(monitor.state().await, HealthState::Healthy);
        assert_eq!(store.read().await.len(), 1);
    }
}
