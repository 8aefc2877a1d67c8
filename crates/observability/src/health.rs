//! Health-Check-Endpunkt fuer emlink
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Anzahl lebender Verbindungen

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub sessions: usize,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Clone teilt die Zaehler; der Server aktualisiert sie periodisch.
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    sitzungen: Arc<AtomicUsize>,
    telemetrie_laeuft: Arc<AtomicBool>,
}

impl HealthState {
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            sitzungen: Arc::new(AtomicUsize::new(0)),
            telemetrie_laeuft: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn sitzungen(&self) -> usize {
        self.sitzungen.load(Ordering::Relaxed)
    }

    pub fn sitzungen_setzen(&self, anzahl: usize) {
        self.sitzungen.store(anzahl, Ordering::Relaxed);
    }

    /// Meldet ob der Telemetrie-Task noch laeuft (sonst `degraded`)
    pub fn telemetrie_status_setzen(&self, laeuft: bool) {
        self.telemetrie_laeuft.store(laeuft, Ordering::Relaxed);
    }

    pub fn status(&self) -> HealthStatus {
        if self.telemetrie_laeuft.load(Ordering::Relaxed) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            sessions: self.sitzungen(),
        }
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
///
/// Auch `degraded` antwortet mit 200, damit Liveness-Checks nicht fehlschlagen.
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}
