//! Audio-Geraete-Registry
//!
//! Die `DeviceRegistry` haelt die bei der Discovery gefundenen Geraete.
//! Eine neue Discovery ersetzt die gesamte Menge atomar; Leser sehen immer
//! entweder die alte oder die neue Liste, nie eine Mischung.

use emlink_core::model::{AudioDevice, DeviceStatus};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AudioError, AudioResult};

// ---------------------------------------------------------------------------
// Discovery-Quelle
// ---------------------------------------------------------------------------

/// Externe Geraete-Erkennung (Hardware-Layer, Konfiguration, ...)
pub trait GeraeteQuelle: Send + Sync + 'static {
    /// Liefert alle aktuell verfuegbaren Geraete
    fn entdecken(&self) -> AudioResult<Vec<AudioDevice>>;
}

/// Feste Geraeteliste (aus der Konfiguration oder fuer Tests)
#[derive(Debug, Clone, Default)]
pub struct StatischeGeraeteQuelle {
    geraete: Vec<AudioDevice>,
}

impl StatischeGeraeteQuelle {
    pub fn neu(geraete: Vec<AudioDevice>) -> Self {
        Self { geraete }
    }

    /// Die vier USB-Soundkarten des Referenzaufbaus (`usb2` ist inaktiv)
    pub fn usb_standard() -> Self {
        let geraete = (0..4u16)
            .map(|i| AudioDevice {
                id: format!("usb{i}"),
                name: format!("USB Audio Device {}", i + 1),
                channel_count: 2,
                status: if i == 2 {
                    DeviceStatus::Inactive
                } else {
                    DeviceStatus::Active
                },
            })
            .collect();
        Self { geraete }
    }
}

impl GeraeteQuelle for StatischeGeraeteQuelle {
    fn entdecken(&self) -> AudioResult<Vec<AudioDevice>> {
        Ok(self.geraete.clone())
    }
}

// ---------------------------------------------------------------------------
// DeviceRegistry
// ---------------------------------------------------------------------------

/// Registry aller bekannten Audio-Geraete
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct DeviceRegistry {
    quelle: Arc<dyn GeraeteQuelle>,
    geraete: Arc<RwLock<Arc<Vec<AudioDevice>>>>,
}

impl DeviceRegistry {
    /// Erstellt eine leere Registry; Geraete erst nach `entdecken()`
    pub fn neu(quelle: Arc<dyn GeraeteQuelle>) -> Self {
        Self {
            quelle,
            geraete: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }

    /// Fuehrt die Discovery aus und ersetzt die Geraeteliste
    ///
    /// Schlaegt die Quelle fehl, wird die Liste geleert und eine Warnung
    /// protokolliert. Doppelte IDs werden verworfen (erstes Vorkommen gewinnt).
    pub fn entdecken(&self) -> Vec<AudioDevice> {
        let gefunden = match self.quelle.entdecken() {
            Ok(geraete) => geraete,
            Err(e) => {
                warn!(fehler = %e, "Geraete-Discovery fehlgeschlagen, Geraeteliste leer");
                Vec::new()
            }
        };

        let mut gesehen = HashSet::new();
        let eindeutig: Vec<AudioDevice> = gefunden
            .into_iter()
            .filter(|g| {
                let neu = gesehen.insert(g.id.clone());
                if !neu {
                    warn!(geraet = %g.id, "Doppelte Geraete-ID verworfen");
                }
                neu
            })
            .collect();

        info!(anzahl = eindeutig.len(), "Audio-Geraete entdeckt");
        for g in &eindeutig {
            debug!(geraet = %g.id, name = %g.name, status = ?g.status, "Geraet");
        }

        *self.geraete.write() = Arc::new(eindeutig.clone());
        eindeutig
    }

    /// Sucht ein Geraet anhand seiner ID
    pub fn get(&self, id: &str) -> AudioResult<AudioDevice> {
        self.geraete
            .read()
            .iter()
            .find(|g| g.id == id)
            .cloned()
            .ok_or_else(|| AudioError::GeraetNichtGefunden(id.to_string()))
    }

    /// Prueft ob ein Geraet bekannt ist
    pub fn enthaelt(&self, id: &str) -> bool {
        self.geraete.read().iter().any(|g| g.id == id)
    }

    /// Geordnete Momentaufnahme (Reihenfolge der Discovery)
    pub fn liste(&self) -> Vec<AudioDevice> {
        self.geraete.read().as_ref().clone()
    }

    pub fn anzahl(&self) -> usize {
        self.geraete.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KaputteQuelle;

    impl GeraeteQuelle for KaputteQuelle {
        fn entdecken(&self) -> AudioResult<Vec<AudioDevice>> {
            Err(AudioError::Discovery("kein USB-Host".to_string()))
        }
    }

    fn geraet(id: &str) -> AudioDevice {
        AudioDevice {
            id: id.to_string(),
            name: format!("Geraet {id}"),
            channel_count: 2,
            status: DeviceStatus::Active,
        }
    }

    #[test]
    fn leer_vor_discovery() {
        let registry = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        assert_eq!(registry.anzahl(), 0);
        assert!(registry.get("usb0").is_err());
    }

    #[test]
    fn usb_standard_discovery() {
        let registry = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        let geraete = registry.entdecken();
        assert_eq!(geraete.len(), 4);

        let ids: Vec<_> = registry.liste().into_iter().map(|g| g.id).collect();
        assert_eq!(ids, vec!["usb0", "usb1", "usb2", "usb3"]);

        assert_eq!(registry.get("usb2").unwrap().status, DeviceStatus::Inactive);
        assert_eq!(registry.get("usb0").unwrap().name, "USB Audio Device 1");
    }

    #[test]
    fn discovery_ist_idempotent() {
        let registry = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        let erste = registry.entdecken();
        let zweite = registry.entdecken();
        assert_eq!(erste, zweite);
        assert_eq!(registry.anzahl(), 4);
    }

    #[test]
    fn fehlerhafte_quelle_ergibt_leere_liste() {
        let registry = DeviceRegistry::neu(Arc::new(KaputteQuelle));
        assert!(registry.entdecken().is_empty());
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn unbekanntes_geraet() {
        let registry = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        registry.entdecken();
        match registry.get("hdmi7") {
            Err(AudioError::GeraetNichtGefunden(id)) => assert_eq!(id, "hdmi7"),
            andere => panic!("Erwartet GeraetNichtGefunden, erhalten {andere:?}"),
        }
        assert!(!registry.enthaelt("hdmi7"));
    }

    #[test]
    fn doppelte_ids_werden_verworfen() {
        let mut zweites = geraet("a");
        zweites.name = "Duplikat".to_string();
        let quelle = StatischeGeraeteQuelle::neu(vec![geraet("a"), geraet("b"), zweites]);
        let registry = DeviceRegistry::neu(Arc::new(quelle));

        registry.entdecken();
        assert_eq!(registry.anzahl(), 2);
        assert_eq!(registry.get("a").unwrap().name, "Geraet a");
    }

    #[test]
    fn clone_teilt_inneren_state() {
        let r1 = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        let r2 = r1.clone();
        r1.entdecken();
        assert!(r2.enthaelt("usb3"));
    }
}
