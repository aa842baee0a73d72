//! Liveness and readiness signals, plus the HTTP probes that expose them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Body returned by the probe endpoints.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[derive(Debug, Default)]
struct Signals {
    live: AtomicBool,
    ready: AtomicBool,
    /// Milliseconds since the epoch; zero until the first committed or
    /// unchanged cycle.
    last_sync_ms: AtomicI64,
}

/// Shared health state. Clones observe the same signals.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    signals: Arc<Signals>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_live(&self, live: bool) {
        self.signals.live.store(live, Ordering::Release);
    }

    /// Marks the service ready. Readiness is never withdrawn once given.
    pub fn mark_ready(&self) {
        self.signals.ready.store(true, Ordering::Release);
    }

    pub fn record_sync(&self, at: DateTime<Utc>) {
        self.signals
            .last_sync_ms
            .store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.signals.live.load(Ordering::Acquire)
    }

    pub fn is_ready(&self) -> bool {
        self.signals.ready.load(Ordering::Acquire)
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        match self.signals.last_sync_ms.load(Ordering::Acquire) {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    pub fn liveness(&self) -> HealthReport {
        let (status, description) = if self.is_live() {
            (HealthStatus::Healthy, "The sync loop is running.")
        } else {
            (HealthStatus::Unhealthy, "The sync loop is not running.")
        };
        HealthReport {
            status,
            description: description.to_string(),
            last_sync: self.last_sync(),
        }
    }

    pub fn readiness(&self) -> HealthReport {
        let (status, description) = if self.is_ready() {
            (HealthStatus::Healthy, "The startup task is finished.")
        } else {
            (HealthStatus::Unhealthy, "The startup task is still running.")
        };
        HealthReport {
            status,
            description: description.to_string(),
            last_sync: self.last_sync(),
        }
    }
}

/// Probe routes: `GET /health/live` and `GET /health/ready`.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .with_state(state)
}

/// Serves the probes until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    state: HealthState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Health probes listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn live(State(state): State<HealthState>) -> impl IntoResponse {
    respond(state.liveness())
}

async fn ready(State(state): State<HealthState>) -> impl IntoResponse {
    respond(state.readiness())
}

fn respond(report: HealthReport) -> (StatusCode, Json<HealthReport>) {
    let code = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}
