//! Pegel-Telemetrie
//!
//! Erzeugt in festem Takt synthetische Audio-Pegel fuer alle aktiven
//! Verbindungen (durchgeschaltet und hoerend oder sprechend). Die Werte
//! sind gleichverteilt in `[0, 100]` und ersetzen eine echte Aussteuerung.
//!
//! Jeder Tick wird als ein Batch in der Registry angewandt; das Lock wird
//! zwischen zwei Ticks nie gehalten.

use emlink_core::model::MAX_PEGEL;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::state::SessionRegistry;

/// Standard-Takt der Pegel-Telemetrie
pub const STANDARD_INTERVALL: Duration = Duration::from_millis(100);

/// Periodischer Pegel-Sampler
pub struct TelemetrySampler {
    registry: Arc<SessionRegistry>,
    ticks: AtomicU64,
}

impl TelemetrySampler {
    pub fn neu(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            ticks: AtomicU64::new(0),
        }
    }

    /// Fuehrt einen einzelnen Tick aus und gibt die Anzahl geaenderter Verbindungen zurueck
    pub fn tick(&self) -> usize {
        let mut rng = rand::thread_rng();
        let geaendert = self
            .registry
            .pegel_aktualisieren(|_| rng.gen_range(0.0..=MAX_PEGEL));
        self.ticks.fetch_add(1, Ordering::Relaxed);
        geaendert
    }

    /// Anzahl bisher ausgefuehrter Ticks
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Startet den Sampler-Task
    ///
    /// Laeuft bis der zurueckgegebene Handle abgebrochen wird.
    pub fn starten(self: Arc<Self>, intervall: Duration) -> tokio::task::JoinHandle<()> {
        info!(intervall_ms = intervall.as_millis() as u64, "Pegel-Telemetrie gestartet");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(intervall);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // Ersten Tick ueberspringen

            loop {
                ticker.tick().await;
                let geaendert = self.tick();
                if geaendert > 0 {
                    debug!(geaendert, "Pegel-Batch angewandt");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emlink_audio::{DeviceRegistry, StatischeGeraeteQuelle};
    use emlink_core::event::KeineSenke;
    use emlink_core::model::ConnectionStatus;
    use emlink_core::types::ClientId;

    fn registry() -> Arc<SessionRegistry> {
        let geraete = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        geraete.entdecken();
        Arc::new(SessionRegistry::neu(geraete, Arc::new(KeineSenke)))
    }

    #[test]
    fn tick_ohne_verbindungen() {
        let sampler = TelemetrySampler::neu(registry());
        assert_eq!(sampler.tick(), 0);
        assert_eq!(sampler.ticks(), 1);
    }

    #[test]
    fn nur_aktive_verbindungen_erhalten_pegel() {
        let r = registry();
        let hoerend = r.erstellen(ClientId::new(), "A", "usb0").unwrap();
        let getrennt = r.erstellen(ClientId::new(), "B", "usb1").unwrap();
        r.hoeren_umschalten(&hoerend.id).unwrap();
        r.entfernen(&getrennt.id);

        let sampler = TelemetrySampler::neu(Arc::clone(&r));
        for _ in 0..50 {
            sampler.tick();
            let pegel = r.get(&hoerend.id).unwrap().audio_level;
            assert!((0.0..=100.0).contains(&pegel));
        }
        assert!(r.get(&getrennt.id).is_none());
    }

    #[test]
    fn inaktive_verbindung_faellt_auf_null() {
        let r = registry();
        let v = r.erstellen(ClientId::new(), "A", "usb0").unwrap();
        let still = r.erstellen(ClientId::new(), "B", "usb0").unwrap();
        r.sprechen_umschalten(&v.id).unwrap();

        let sampler = TelemetrySampler::neu(Arc::clone(&r));
        sampler.tick();
        assert_eq!(r.get(&still.id).unwrap().audio_level, 0.0);
        assert_eq!(r.get(&still.id).unwrap().status, ConnectionStatus::Connected);

        r.sprechen_umschalten(&v.id).unwrap();
        sampler.tick();
        assert_eq!(r.get(&v.id).unwrap().audio_level, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn task_tickt_periodisch() {
        let sampler = Arc::new(TelemetrySampler::neu(registry()));
        let handle = Arc::clone(&sampler).starten(Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(350)).await;
        handle.abort();

        assert!(sampler.ticks() >= 2);
    }
}
