use crate::core::api::*;
use crate::{Error, Result};

use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::time;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

/// Routes for hosts that trigger the cycles over HTTP instead of running loops.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/logs", get(recent_logs))
        .route("/report", get(current_report))
        // quick reads only; probe and report cycles may outlive any fixed limit
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(|error: BoxError| async move {
                    if error.is::<tower::timeout::error::Elapsed>() {
                        Ok(StatusCode::REQUEST_TIMEOUT)
                    } else {
                        Err((
                            StatusCode::INTERNAL_SERVER_ERROR,
                            format!("Unhandled internal error: {}", error),
                        ))
                    }
                }))
                .timeout(time::Duration::from_secs(10))
                .into_inner(),
        )
        .route("/ping", get(ping))
        .route("/cron/keep-alive", get(keep_alive_cron))
        .route("/cron/midnight-report", get(midnight_report_cron))
        .route("/alert", post(send_test_alert))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn listen(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    tracing::info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .map_err(|e| Error::Server(e.to_string()))
}
