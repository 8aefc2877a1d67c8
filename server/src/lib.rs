//! emlink-server – Bibliotheks-Root
//!
//! Verdrahtet Geraete-Registry, Session-Registry, Broadcast-Hub,
//! Pegel-Telemetrie, TCP-Gateway und Observability zu einem Prozess.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use emlink_audio::{DeviceRegistry, GeraeteQuelle, StatischeGeraeteQuelle};
use emlink_observability::{
    observability_server_starten, EmlinkMetrics, HealthState, MetrikSnapshot,
};
use emlink_signaling::{BroadcastHub, SignalingServer, SignalingState};
use emlink_voice::{SessionRegistry, TelemetrySampler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Mindestabstand zwischen zwei Metrik-Abgleichen
const ABGLEICH_MIN_INTERVALL: Duration = Duration::from_secs(1);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C-Handler konnte nicht registriert werden");
                return;
            }
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            let _ = shutdown_tx.send(true);
        });

        self.laufen(shutdown_rx).await
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown_rx` `true` meldet
    ///
    /// Reihenfolge:
    /// 1. Geraete entdecken
    /// 2. Broadcast-Hub und Session-Registry aufbauen
    /// 3. Pegel-Telemetrie starten
    /// 4. Observability-Server und Metrik-Abgleich starten
    /// 5. TCP-Gateway annehmen lassen, bis zum Shutdown
    pub async fn laufen(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let tcp_addr: SocketAddr = self.config.tcp_bind_adresse().parse()?;
        let kern = Kern::aufbauen(&self.config);

        let sampler_handle = kern.sampler.clone().starten(Duration::from_millis(
            self.config.sitzung.telemetrie_intervall_ms,
        ));

        let metriken = EmlinkMetrics::neu()?;
        let health = HealthState::neu();
        let abgleich_handle = metrik_abgleich_starten(
            kern.state.clone(),
            kern.sampler.clone(),
            metriken.clone(),
            health.clone(),
            abgleich_intervall(self.config.sitzung.telemetrie_intervall_ms),
        );

        let observability_handle = if self.config.observability.aktiviert {
            let addr: SocketAddr = self.config.observability_bind_adresse().parse()?;
            Some(tokio::spawn(observability_server_starten(
                addr,
                metriken,
                health,
                shutdown_rx.clone(),
            )))
        } else {
            tracing::info!("Observability-Server deaktiviert");
            None
        };

        let server = SignalingServer::binden(kern.state.clone(), tcp_addr).await?;
        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %server.lokale_addr()?,
            geraete = kern.state.registry.geraete().anzahl(),
            "Server laeuft"
        );
        let ergebnis = server.starten(shutdown_rx).await;

        sampler_handle.abort();
        abgleich_handle.abort();
        if let Some(handle) = observability_handle {
            match handle.await {
                Ok(Err(e)) => tracing::warn!(fehler = %e, "Observability-Server beendet mit Fehler"),
                Err(e) => tracing::warn!(fehler = %e, "Observability-Task abgebrochen"),
                Ok(Ok(())) => {}
            }
        }

        ergebnis?;
        tracing::info!("Server beendet");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Kern-Komponenten
// ---------------------------------------------------------------------------

/// Geteilte Kern-Komponenten eines Server-Prozesses
pub struct Kern {
    pub state: Arc<SignalingState>,
    pub sampler: Arc<TelemetrySampler>,
}

impl Kern {
    /// Entdeckt die Geraete und baut Hub, Registry und Sampler auf
    ///
    /// Der Hub ist zugleich die Event-Senke der Registry.
    pub fn aufbauen(config: &ServerConfig) -> Self {
        let quelle: Arc<dyn GeraeteQuelle> =
            Arc::new(StatischeGeraeteQuelle::neu(config.geraete_liste()));
        let geraete = DeviceRegistry::neu(quelle);
        geraete.entdecken();

        let hub = BroadcastHub::neu(config.sitzung.queue_kapazitaet);
        let registry = Arc::new(SessionRegistry::mit_lautstaerke(
            geraete,
            Arc::new(hub.clone()),
            config.sitzung.standard_lautstaerke,
        ));
        let sampler = Arc::new(TelemetrySampler::neu(registry.clone()));
        let state = SignalingState::neu(config.signaling_config(), registry, hub);

        Self { state, sampler }
    }
}

// ---------------------------------------------------------------------------
// Metrik-Abgleich
// ---------------------------------------------------------------------------

fn abgleich_intervall(telemetrie_ms: u64) -> Duration {
    ABGLEICH_MIN_INTERVALL.max(Duration::from_millis(telemetrie_ms.saturating_mul(2)))
}

/// Sammelt die aktuellen Kern-Zaehler
pub fn metrik_snapshot(state: &SignalingState, sampler: &TelemetrySampler) -> MetrikSnapshot {
    MetrikSnapshot {
        sitzungen: state.registry.anzahl(),
        beobachter: state.hub.beobachter_anzahl(),
        verworfen_gesamt: state.hub.verworfen_gesamt(),
        telemetrie_ticks: sampler.ticks(),
        kommandos: state
            .statistik
            .snapshot()
            .into_iter()
            .map(|(art, ergebnis, anzahl)| (art, ergebnis.als_str(), anzahl))
            .collect(),
    }
}

/// Spiegelt die Kern-Zaehler periodisch nach Prometheus und Health
///
/// Bleiben die Telemetrie-Ticks zwischen zwei Abgleichen stehen, meldet
/// der Health-Check `degraded`.
fn metrik_abgleich_starten(
    state: Arc<SignalingState>,
    sampler: Arc<TelemetrySampler>,
    metriken: EmlinkMetrics,
    health: HealthState,
    intervall: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(intervall);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        let mut letzte_ticks = sampler.ticks();

        loop {
            ticker.tick().await;
            let snapshot = metrik_snapshot(&state, &sampler);
            health.sitzungen_setzen(snapshot.sitzungen);
            health.telemetrie_status_setzen(snapshot.telemetrie_ticks > letzte_ticks);
            letzte_ticks = snapshot.telemetrie_ticks;
            metriken.uebernehmen(&snapshot);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.netzwerk.bind_adresse = "127.0.0.1".into();
        cfg.netzwerk.tcp_port = 0;
        cfg.observability.aktiviert = false;
        cfg
    }

    #[test]
    fn kern_nutzt_konfigurierte_geraete() {
        let kern = Kern::aufbauen(&test_config());
        let geraete = kern.state.registry.geraete();
        assert_eq!(geraete.anzahl(), 4);
        assert!(geraete.enthaelt("usb2"));
    }

    #[test]
    fn snapshot_spiegelt_kern_zustand() {
        let mut cfg = test_config();
        cfg.sitzung.standard_lautstaerke = 0.5;
        let kern = Kern::aufbauen(&cfg);

        let client = emlink_core::ClientId::new();
        let verbindung = kern
            .state
            .registry
            .erstellen(client, "Leitung", "usb0")
            .unwrap();
        assert_eq!(verbindung.volume, 0.5);
        kern.sampler.tick();

        let snapshot = metrik_snapshot(&kern.state, &kern.sampler);
        assert_eq!(snapshot.sitzungen, 1);
        assert_eq!(snapshot.beobachter, 0);
        assert_eq!(snapshot.telemetrie_ticks, 1);
    }

    #[test]
    fn abgleich_intervall_hat_untergrenze() {
        assert_eq!(abgleich_intervall(100), Duration::from_secs(1));
        assert_eq!(abgleich_intervall(2000), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn server_endet_nach_shutdown_signal() {
        let (tx, rx) = watch::channel(false);
        let server = tokio::spawn(Server::neu(test_config()).laufen(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let ergebnis = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("Server muss nach Shutdown enden")
            .unwrap();
        assert!(ergebnis.is_ok());
    }
}
