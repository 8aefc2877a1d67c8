//! Session-Registry: alleiniger Besitzer aller Verbindungen
//!
//! Die Verbindungen liegen in einer Arena (`Vec<Option<Eintrag>>`) mit
//! Index-Map von `ConnectionId` auf den Slot. Alle Mutationen laufen unter
//! einem Schreib-Lock; jede angewandte Aenderung wird noch unter diesem Lock
//! an die `SessionEventSink` gemeldet. Dadurch sehen Beobachter die Events
//! in genau der Reihenfolge, in der sie angewandt wurden.
//!
//! Lesende Zugriffe (`snapshot`) teilen sich das Lese-Lock und sehen immer
//! einen konsistenten Zeitpunkt.

use emlink_audio::DeviceRegistry;
use emlink_core::event::{SessionEvent, SessionEventSink};
use emlink_core::model::{
    jetzt_ms, lautstaerke_begrenzen, pegel_begrenzen, Connection, ConnectionStatus,
    SignalingSnapshot,
};
use emlink_core::types::{ClientId, ConnectionId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::em::{self, UngueltigerUebergang};
use crate::error::{SessionError, SessionResult};

/// Standard-Lautstaerke neuer Verbindungen
pub const STANDARD_LAUTSTAERKE: f32 = 0.8;

// ---------------------------------------------------------------------------
// Teilaktualisierung
// ---------------------------------------------------------------------------

/// Erlaubte Felder fuer `aktualisieren`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerbindungsPatch {
    pub name: Option<String>,
    pub volume: Option<f32>,
    pub listening: Option<bool>,
    pub talking: Option<bool>,
}

impl VerbindungsPatch {
    /// Betrifft der Patch Audio-Felder (nur bei durchgeschalteter Leitung erlaubt)?
    pub fn betrifft_audio(&self) -> bool {
        self.volume.is_some() || self.listening.is_some() || self.talking.is_some()
    }

    fn anwenden(self, v: &mut Connection) {
        if let Some(name) = self.name {
            v.name = name;
        }
        if let Some(volume) = self.volume {
            v.volume = lautstaerke_begrenzen(volume);
        }
        if let Some(listening) = self.listening {
            v.listening = listening;
        }
        if let Some(talking) = self.talking {
            v.talking = talking;
        }
    }
}

// ---------------------------------------------------------------------------
// Session-Tabelle (Arena + Index)
// ---------------------------------------------------------------------------

struct Eintrag {
    /// Anlage-Reihenfolge fuer geordnete Snapshots
    seq: u64,
    verbindung: Connection,
}

#[derive(Default)]
struct SessionTabelle {
    slots: Vec<Option<Eintrag>>,
    index: HashMap<ConnectionId, usize>,
    frei: Vec<usize>,
    naechste_seq: u64,
}

impl SessionTabelle {
    fn einfuegen(&mut self, verbindung: Connection) {
        let eintrag = Eintrag {
            seq: self.naechste_seq,
            verbindung,
        };
        self.naechste_seq += 1;
        let id = eintrag.verbindung.id;
        let slot = match self.frei.pop() {
            Some(slot) => {
                self.slots[slot] = Some(eintrag);
                slot
            }
            None => {
                self.slots.push(Some(eintrag));
                self.slots.len() - 1
            }
        };
        self.index.insert(id, slot);
    }

    fn entnehmen(&mut self, id: &ConnectionId) -> Option<Connection> {
        let slot = self.index.remove(id)?;
        let eintrag = self.slots.get_mut(slot)?.take()?;
        self.frei.push(slot);
        Some(eintrag.verbindung)
    }

    fn get(&self, id: &ConnectionId) -> Option<&Connection> {
        let slot = *self.index.get(id)?;
        self.slots.get(slot)?.as_ref().map(|e| &e.verbindung)
    }

    fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        let slot = *self.index.get(id)?;
        self.slots.get_mut(slot)?.as_mut().map(|e| &mut e.verbindung)
    }

    fn geordnet(&self) -> Vec<Connection> {
        let mut eintraege: Vec<&Eintrag> = self.slots.iter().flatten().collect();
        eintraege.sort_by_key(|e| e.seq);
        eintraege.into_iter().map(|e| e.verbindung.clone()).collect()
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Registry aller lebenden Verbindungen
pub struct SessionRegistry {
    tabelle: RwLock<SessionTabelle>,
    geraete: DeviceRegistry,
    senke: Arc<dyn SessionEventSink>,
    standard_lautstaerke: f32,
}

impl SessionRegistry {
    /// Erstellt eine leere Registry
    pub fn neu(geraete: DeviceRegistry, senke: Arc<dyn SessionEventSink>) -> Self {
        Self::mit_lautstaerke(geraete, senke, STANDARD_LAUTSTAERKE)
    }

    /// Erstellt eine leere Registry mit eigener Standard-Lautstaerke
    pub fn mit_lautstaerke(
        geraete: DeviceRegistry,
        senke: Arc<dyn SessionEventSink>,
        standard_lautstaerke: f32,
    ) -> Self {
        Self {
            tabelle: RwLock::new(SessionTabelle::default()),
            geraete,
            senke,
            standard_lautstaerke: lautstaerke_begrenzen(standard_lautstaerke),
        }
    }

    /// Zugriff auf die Geraete-Registry (fuer Beobachter-Snapshots)
    pub fn geraete(&self) -> &DeviceRegistry {
        &self.geraete
    }

    /// Legt die Verbindung eines Clients an und schaltet sie durch
    ///
    /// Die E&M-Aufnahme (belegen, melden, durchschalten) laeuft vollstaendig
    /// unter dem Schreib-Lock; Beobachter sehen nur den Endzustand.
    pub fn erstellen(
        &self,
        client_id: ClientId,
        name: &str,
        geraet_id: &str,
    ) -> SessionResult<Connection> {
        if !self.geraete.enthaelt(geraet_id) {
            return Err(SessionError::DeviceNotFound(geraet_id.to_string()));
        }

        let id = ConnectionId::from(client_id);
        let name = match name.trim() {
            "" => format!("Connection {}", id.kurz()),
            n => n.to_string(),
        };

        let mut tabelle = self.tabelle.write();
        if tabelle.index.contains_key(&id) {
            return Err(SessionError::SessionExists(id));
        }

        let signaling =
            em::aufnahme(SignalingSnapshot::IDLE).map_err(Self::zustandsmaschine_verletzt)?;
        debug!(verbindung = %id, zustand = %signaling.state, "E&M-Aufnahme abgeschlossen");

        let verbindung = Connection {
            id,
            name,
            status: ConnectionStatus::Connected,
            audio_device_id: geraet_id.to_string(),
            listening: false,
            talking: false,
            volume: self.standard_lautstaerke,
            audio_level: 0.0,
            signaling,
            last_activity_ms: jetzt_ms(),
        };

        tabelle.einfuegen(verbindung.clone());
        self.senke
            .veroeffentlichen(SessionEvent::Aktualisiert(verbindung.clone()));

        info!(
            verbindung = %id,
            name = %verbindung.name,
            geraet = %geraet_id,
            "Verbindung angelegt"
        );
        Ok(verbindung)
    }

    /// Uebernimmt die erlaubten Felder eines Patches
    ///
    /// Ein reiner Namenswechsel ist in jedem Signalisierungszustand erlaubt;
    /// Audio-Felder erfordern eine durchgeschaltete Leitung.
    pub fn aktualisieren(
        &self,
        id: &ConnectionId,
        patch: VerbindungsPatch,
    ) -> SessionResult<Connection> {
        let audio = patch.betrifft_audio();
        self.mutieren(id, audio, |v| patch.anwenden(v))
    }

    /// Schaltet das Mithoeren um
    pub fn hoeren_umschalten(&self, id: &ConnectionId) -> SessionResult<Connection> {
        self.mutieren(id, true, |v| v.listening = !v.listening)
    }

    /// Schaltet das Sprechen um
    pub fn sprechen_umschalten(&self, id: &ConnectionId) -> SessionResult<Connection> {
        self.mutieren(id, true, |v| v.talking = !v.talking)
    }

    /// Setzt die Lautstaerke (auf `[0, 1]` begrenzt)
    pub fn lautstaerke_setzen(&self, id: &ConnectionId, volume: f32) -> SessionResult<Connection> {
        self.mutieren(id, true, |v| v.volume = lautstaerke_begrenzen(volume))
    }

    /// Loest die Leitung aus und entfernt die Verbindung
    ///
    /// Idempotent: fuer eine unbekannte ID passiert nichts und es wird kein
    /// Event gemeldet. Gibt den Endzustand der entfernten Verbindung zurueck.
    pub fn entfernen(&self, id: &ConnectionId) -> Option<Connection> {
        let mut tabelle = self.tabelle.write();
        let mut verbindung = tabelle.entnehmen(id)?;

        if em::kann_ausloesen(verbindung.signaling.state) {
            match em::ausloesen(verbindung.signaling) {
                Ok(s) => {
                    debug!(verbindung = %id, von = %verbindung.signaling.state, "E&M: disconnect");
                    verbindung.signaling = s;
                }
                Err(e) => {
                    Self::zustandsmaschine_verletzt(e);
                }
            }
        }
        verbindung.status = ConnectionStatus::Disconnected;
        verbindung.listening = false;
        verbindung.talking = false;
        verbindung.audio_level = 0.0;

        self.senke.veroeffentlichen(SessionEvent::Entfernt(*id));
        info!(verbindung = %id, "Verbindung entfernt");
        Some(verbindung)
    }

    /// Konsistente, nach Anlage geordnete Momentaufnahme
    pub fn snapshot(&self) -> Vec<Connection> {
        self.tabelle.read().geordnet()
    }

    /// Ruft `f` mit einer Momentaufnahme auf, waehrend keine Mutation laufen kann
    ///
    /// Alles was `f` registriert (z.B. ein neuer Beobachter) erhaelt danach
    /// lueckenlos jedes Event, das nach der Momentaufnahme angewandt wird.
    pub fn snapshot_mit<R>(&self, f: impl FnOnce(Vec<Connection>) -> R) -> R {
        let tabelle = self.tabelle.read();
        f(tabelle.geordnet())
    }

    /// Liest eine einzelne Verbindung
    pub fn get(&self, id: &ConnectionId) -> Option<Connection> {
        self.tabelle.read().get(id).cloned()
    }

    pub fn enthaelt(&self, id: &ConnectionId) -> bool {
        self.tabelle.read().index.contains_key(id)
    }

    pub fn anzahl(&self) -> usize {
        self.tabelle.read().len()
    }

    /// Wendet einen Telemetrie-Tick als ein Batch an
    ///
    /// Aktive Verbindungen erhalten den von `messen` gelieferten Pegel,
    /// alle anderen den Pegel 0. Nur tatsaechlich geaenderte Verbindungen
    /// landen im Batch; ein leerer Batch wird nicht gemeldet.
    pub fn pegel_aktualisieren(&self, mut messen: impl FnMut(&Connection) -> f32) -> usize {
        let mut tabelle = self.tabelle.write();
        let mut batch = Vec::new();

        for eintrag in tabelle.slots.iter_mut().flatten() {
            let v = &mut eintrag.verbindung;
            let pegel = if v.ist_aktiv() {
                pegel_begrenzen(messen(v))
            } else {
                0.0
            };
            if pegel != v.audio_level {
                v.audio_level = pegel;
                batch.push(v.clone());
            }
        }

        let anzahl = batch.len();
        if anzahl > 0 {
            self.senke
                .veroeffentlichen(SessionEvent::TelemetrieBatch(batch));
        }
        anzahl
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    fn mutieren(
        &self,
        id: &ConnectionId,
        erfordert_durchschaltung: bool,
        f: impl FnOnce(&mut Connection),
    ) -> SessionResult<Connection> {
        let mut tabelle = self.tabelle.write();
        let verbindung = tabelle
            .get_mut(id)
            .ok_or(SessionError::SessionNotFound(*id))?;

        if erfordert_durchschaltung && !verbindung.ist_durchgeschaltet() {
            return Err(SessionError::NotConnected {
                id: *id,
                zustand: verbindung.signaling.state,
            });
        }

        f(verbindung);
        verbindung.last_activity_ms = jetzt_ms();
        let kopie = verbindung.clone();

        self.senke
            .veroeffentlichen(SessionEvent::Aktualisiert(kopie.clone()));
        debug!(
            verbindung = %id,
            listening = kopie.listening,
            talking = kopie.talking,
            volume = kopie.volume,
            "Verbindung aktualisiert"
        );
        Ok(kopie)
    }

    /// Fehlgebrauch der Zustandsmaschine ist ein Programmierfehler
    fn zustandsmaschine_verletzt(e: UngueltigerUebergang) -> SessionError {
        error!(uebergang = %e.versucht, zustand = %e.aktuell, "Ungueltiger E&M-Uebergang");
        debug_assert!(false, "Ungueltiger E&M-Uebergang: {e}");
        e.into()
    }

    /// Fuegt eine Verbindung unveraendert ein (Tests fuer nicht durchgeschaltete Leitungen)
    #[cfg(test)]
    fn roh_einfuegen(&self, verbindung: Connection) {
        self.tabelle.write().einfuegen(verbindung);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
