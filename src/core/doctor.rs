use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::ent::*;

/// Probes the endpoints of one service and judges its health.
#[derive(Clone)]
pub struct Doctor {
    client: reqwest::Client,
    base_url: String,
    endpoints: Vec<String>,
    methods: Vec<Method>,
    timeout: Duration,
}

impl Doctor {
    pub fn new(
        base_url: &str,
        endpoints: Vec<String>,
        methods: Vec<Method>,
        timeout: Duration,
    ) -> Doctor {
        let base_url = base_url.trim_end_matches('/').to_string();
        info!(
            "doctor ready for {} endpoints={:?} methods={:?} timeout={:?}",
            base_url, endpoints, methods, timeout
        );
        Doctor {
            client: reqwest::Client::new(),
            base_url,
            endpoints,
            methods,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// One request, never an error: every failure becomes a `Down` result.
    pub async fn check(&self, endpoint: &str, method: Method) -> ProbeResult {
        let url = format!("{}{}", self.base_url, endpoint);
        let timestamp = Utc::now();
        let request = match method {
            Method::Get => self.client.get(&url),
            Method::Head => self.client.head(&url),
        };
        debug!("probing {} {}", method, url);

        let start = Instant::now();
        let outcome = request.timeout(self.timeout).send().await;
        let elapsed = start.elapsed().as_millis() as u64;

        let mut result = ProbeResult {
            endpoint: endpoint.to_string(),
            method,
            status: ProbeStatus::Down,
            response_time_ms: None,
            status_code: None,
            error: None,
            timestamp,
        };
        match outcome {
            Ok(response) => {
                let code = response.status().as_u16();
                result.response_time_ms = Some(elapsed);
                result.status_code = Some(code);
                if code < 400 {
                    result.status = ProbeStatus::Up;
                    info!("{} {} is UP (HTTP {}) - {}ms", method, url, code, elapsed);
                } else {
                    result.error = Some(format!("HTTP {}", code));
                    warn!("{} {} returned HTTP {} - {}ms", method, url, code, elapsed);
                }
            }
            Err(err) if err.is_timeout() => {
                // keep the latency metric meaningful for timeouts
                let timeout_ms = self.timeout.as_millis() as u64;
                result.response_time_ms = Some(timeout_ms);
                result.error = Some(format!("timeout after {}ms", timeout_ms));
                warn!("{} {} timed out after {}ms", method, url, timeout_ms);
            }
            Err(err) if err.is_connect() => {
                result.error = Some(format!("connection error: {}", err));
                warn!("{} {} connection failed: {}", method, url, err);
            }
            Err(err) => {
                result.error = Some(format!("request error: {}", err));
                warn!("{} {} request failed: {}", method, url, err);
            }
        }
        result
    }

    /// Every configured endpoint crossed with every configured method, in order.
    pub async fn check_all(&self) -> Vec<ProbeResult> {
        let mut results = Vec::with_capacity(self.endpoints.len() * self.methods.len());
        for endpoint in &self.endpoints {
            for method in &self.methods {
                results.push(self.check(endpoint, *method).await);
            }
        }
        results
    }
}

/// The service counts as up as soon as any surface answers.
pub fn is_healthy(results: &[ProbeResult]) -> bool {
    results.iter().any(ProbeResult::is_up)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    async fn spawn_target() -> String {
        let app = Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route(
                "/status/:code",
                get(|Path(code): Path<u16>| async move {
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            );
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = axum::Server::bind(&addr).serve(app.into_make_service());
        let addr = server.local_addr();
        tokio::spawn(server);
        format!("http://{}", addr)
    }

    fn doctor(base_url: &str, endpoints: &[&str], methods: Vec<Method>) -> Doctor {
        Doctor::new(
            base_url,
            endpoints.iter().map(|e| e.to_string()).collect(),
            methods,
            Duration::from_millis(300),
        )
    }

    #[tokio::test]
    async fn status_codes_below_400_are_up() {
        let base = spawn_target().await;
        let dc = doctor(&base, &[], vec![]);
        for code in [200u16, 204, 301, 399] {
            let result = dc.check(&format!("/status/{}", code), Method::Get).await;
            assert_eq!(result.status, ProbeStatus::Up, "code {}", code);
            assert_eq!(result.status_code, Some(code));
            assert!(result.response_time_ms.is_some());
            assert!(result.error.is_none());
        }
    }

    #[tokio::test]
    async fn status_codes_from_400_are_down_with_the_code() {
        let base = spawn_target().await;
        let dc = doctor(&base, &[], vec![]);
        for code in [400u16, 404, 500, 503] {
            let result = dc.check(&format!("/status/{}", code), Method::Head).await;
            assert_eq!(result.status, ProbeStatus::Down, "code {}", code);
            assert!(result.error.unwrap().contains(&code.to_string()));
        }
    }

    #[tokio::test]
    async fn timeout_is_down_with_timeout_latency() {
        let base = spawn_target().await;
        let dc = doctor(&base, &[], vec![]);
        let result = dc.check("/slow", Method::Get).await;
        assert_eq!(result.status, ProbeStatus::Down);
        assert_eq!(result.response_time_ms, Some(300));
        assert!(result.error.unwrap().contains("timeout"));
    }

    #[tokio::test]
    async fn connection_failure_does_not_abort_the_pass() {
        // nothing listens on port 9 of localhost
        let dc = doctor("http://127.0.0.1:9", &["/a", "/b"], vec![Method::Get, Method::Head]);
        let results = dc.check_all().await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.status == ProbeStatus::Down));
        assert!(results.iter().all(|r| r.error.is_some()));
        assert!(!is_healthy(&results));
    }

    #[tokio::test]
    async fn check_all_covers_the_cartesian_product() {
        let base = spawn_target().await;
        let dc = doctor(&base, &["/ping", "/status/500"], vec![Method::Get, Method::Head]);
        let results = dc.check_all().await;
        let pairs: Vec<(&str, Method)> = results
            .iter()
            .map(|r| (r.endpoint.as_str(), r.method))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("/ping", Method::Get),
                ("/ping", Method::Head),
                ("/status/500", Method::Get),
                ("/status/500", Method::Head),
            ]
        );
        assert!(is_healthy(&results));
    }

    #[test]
    fn healthy_when_any_result_is_up() {
        let down = ProbeResult {
            endpoint: "/x".to_string(),
            method: Method::Get,
            status: ProbeStatus::Down,
            response_time_ms: None,
            status_code: None,
            error: Some("boom".to_string()),
            timestamp: Utc::now(),
        };
        let up = ProbeResult {
            status: ProbeStatus::Up,
            error: None,
            ..down.clone()
        };
        assert!(!is_healthy(&[]));
        assert!(!is_healthy(&[down.clone(), down.clone()]));
        assert!(is_healthy(&[down.clone(), up.clone()]));
        assert!(is_healthy(&[up]));
    }
}
