//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Registry, Broadcast-Hub und Statistik als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use dashmap::DashMap;
use emlink_core::types::ClientId;
use emlink_voice::SessionRegistry;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::broadcast::{BeobachterQueue, BroadcastHub};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Clients
    pub max_clients: u32,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "emlink".to_string(),
            max_clients: 64,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
        }
    }
}

// ---------------------------------------------------------------------------
// Kommando-Statistik
// ---------------------------------------------------------------------------

/// Ergebnis eines verarbeiteten Kommandos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KommandoErgebnis {
    Ok,
    Abgelehnt,
}

impl KommandoErgebnis {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Abgelehnt => "rejected",
        }
    }
}

/// Zaehler pro Kommando-Art und Ergebnis (fuer Prometheus)
#[derive(Debug, Default)]
pub struct KommandoStatistik {
    zaehler: DashMap<(&'static str, KommandoErgebnis), u64>,
}

impl KommandoStatistik {
    pub fn erfassen(&self, art: &'static str, ergebnis: KommandoErgebnis) {
        *self.zaehler.entry((art, ergebnis)).or_insert(0) += 1;
    }

    pub fn anzahl(&self, art: &'static str, ergebnis: KommandoErgebnis) -> u64 {
        self.zaehler
            .get(&(art, ergebnis))
            .map(|z| *z.value())
            .unwrap_or(0)
    }

    /// Momentaufnahme aller Zaehler als `(art, ergebnis, anzahl)`
    pub fn snapshot(&self) -> Vec<(&'static str, KommandoErgebnis, u64)> {
        self.zaehler
            .iter()
            .map(|e| (e.key().0, e.key().1, *e.value()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Client-Plaetze
// ---------------------------------------------------------------------------

/// Reservierter Platz eines Clients; wird beim Drop freigegeben
#[derive(Debug)]
pub struct ClientPlatz {
    belegt: Arc<AtomicU32>,
}

impl Drop for ClientPlatz {
    fn drop(&mut self) {
        self.belegt.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// SignalingState
// ---------------------------------------------------------------------------

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Session-Registry (alleiniger Besitzer der Verbindungen)
    pub registry: Arc<SessionRegistry>,
    /// Broadcast-Hub (dieselbe Instanz ist die Event-Senke der Registry)
    pub hub: BroadcastHub,
    /// Kommando-Zaehler
    pub statistik: KommandoStatistik,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_time: Instant,
    /// Belegte Client-Plaetze (angenommene, noch laufende Verbindungen)
    belegt: Arc<AtomicU32>,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState
    ///
    /// `hub` muss die Senke sein, mit der `registry` erstellt wurde.
    pub fn neu(
        config: SignalingConfig,
        registry: Arc<SessionRegistry>,
        hub: BroadcastHub,
    ) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            registry,
            hub,
            statistik: KommandoStatistik::default(),
            start_time: Instant::now(),
            belegt: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Meldet einen Beobachter an
    ///
    /// Die Anmeldung laeuft unter dem Lese-Lock der Registry: der Beobachter
    /// erhaelt den Snapshot und danach lueckenlos jedes spaetere Event.
    pub fn beobachter_anmelden(&self, client_id: ClientId) -> Arc<BeobachterQueue> {
        let geraete = self.registry.geraete().liste();
        self.registry
            .snapshot_mit(|verbindungen| self.hub.anmelden(client_id, geraete, verbindungen))
    }

    /// Ersetzt den Rueckstand einer uebergelaufenen Queue durch frische Snapshots
    ///
    /// Laeuft wie die Anmeldung unter dem Lese-Lock der Registry.
    pub fn beobachter_nachholen(&self, queue: &BeobachterQueue) {
        let geraete = self.registry.geraete().liste();
        self.registry
            .snapshot_mit(|verbindungen| queue.neu_synchronisieren(geraete, verbindungen));
        tracing::debug!(
            client = %queue.client_id(),
            verworfen = queue.verworfen(),
            "Beobachter neu synchronisiert"
        );
    }

    /// Reserviert einen Client-Platz, falls `max_clients` nicht erreicht ist
    ///
    /// Die Reservierung gilt sofort, nicht erst nach der Beobachter-Anmeldung
    /// im Verbindungs-Task.
    pub fn platz_reservieren(&self) -> Option<ClientPlatz> {
        let max = self.config.max_clients;
        self.belegt
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| ClientPlatz {
                belegt: Arc::clone(&self.belegt),
            })
    }

    /// Anzahl aktuell reservierter Client-Plaetze
    pub fn clients_aktiv(&self) -> u32 {
        self.belegt.load(Ordering::Acquire)
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
