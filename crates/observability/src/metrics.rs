//! Prometheus-kompatible Metriken fuer emlink
//!
//! Registrierte Metriken:
//! - `emlink_sessions_live` – Gauge: Lebende Verbindungen
//! - `emlink_observers_attached` – Gauge: Angemeldete Beobachter
//! - `emlink_broadcast_dropped_total` – Counter: Wegen Ueberlauf verworfene Events
//! - `emlink_telemetry_ticks_total` – Counter: Ausgefuehrte Pegel-Ticks
//! - `emlink_commands_total` – Counter: Kommandos (command, outcome)
//!
//! Die Werte stammen aus Zaehlern der Kern-Crates und werden periodisch
//! per `uebernehmen` gespiegelt.

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Momentaufnahme der Kern-Zaehler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetrikSnapshot {
    pub sitzungen: usize,
    pub beobachter: usize,
    pub verworfen_gesamt: u64,
    pub telemetrie_ticks: u64,
    /// `(kommando, ergebnis, anzahl)`
    pub kommandos: Vec<(&'static str, &'static str, u64)>,
}

/// Alle emlink-Prometheus-Metriken
#[derive(Clone)]
pub struct EmlinkMetrics {
    pub registry: Arc<Registry>,

    pub sessions_live: IntGauge,
    pub observers_attached: IntGauge,
    pub broadcast_dropped_total: IntCounter,
    pub telemetry_ticks_total: IntCounter,
    pub commands_total: IntCounterVec,
}

impl EmlinkMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let sessions_live = IntGauge::with_opts(Opts::new(
            "emlink_sessions_live",
            "Anzahl lebender Verbindungen",
        ))?;
        registry.register(Box::new(sessions_live.clone()))?;

        let observers_attached = IntGauge::with_opts(Opts::new(
            "emlink_observers_attached",
            "Anzahl angemeldeter Beobachter",
        ))?;
        registry.register(Box::new(observers_attached.clone()))?;

        let broadcast_dropped_total = IntCounter::with_opts(Opts::new(
            "emlink_broadcast_dropped_total",
            "Wegen Queue-Ueberlauf verworfene Broadcast-Events",
        ))?;
        registry.register(Box::new(broadcast_dropped_total.clone()))?;

        let telemetry_ticks_total = IntCounter::with_opts(Opts::new(
            "emlink_telemetry_ticks_total",
            "Ausgefuehrte Pegel-Telemetrie-Ticks",
        ))?;
        registry.register(Box::new(telemetry_ticks_total.clone()))?;

        let commands_total = IntCounterVec::new(
            Opts::new("emlink_commands_total", "Verarbeitete Client-Kommandos"),
            &["command", "outcome"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            sessions_live,
            observers_attached,
            broadcast_dropped_total,
            telemetry_ticks_total,
            commands_total,
        })
    }

    /// Spiegelt eine Momentaufnahme in die Prometheus-Metriken
    ///
    /// Counter werden nur um die Differenz zum bisherigen Stand erhoeht.
    pub fn uebernehmen(&self, snapshot: &MetrikSnapshot) {
        self.sessions_live.set(snapshot.sitzungen as i64);
        self.observers_attached.set(snapshot.beobachter as i64);
        nachziehen(&self.broadcast_dropped_total, snapshot.verworfen_gesamt);
        nachziehen(&self.telemetry_ticks_total, snapshot.telemetrie_ticks);
        for (kommando, ergebnis, anzahl) in &snapshot.kommandos {
            nachziehen(
                &self.commands_total.with_label_values(&[kommando, ergebnis]),
                *anzahl,
            );
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn nachziehen(counter: &IntCounter, ziel: u64) {
    let bisher = counter.get();
    if ziel > bisher {
        counter.inc_by(ziel - bisher);
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: EmlinkMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<EmlinkMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
