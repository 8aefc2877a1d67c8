//! Broadcast-Hub – Verteilt Session-Events an alle Beobachter
//!
//! Jeder Beobachter (angeschlossener Client) hat eine eigene, begrenzte
//! Queue. Der Hub wird von der Session-Registry synchron aus dem
//! Mutationspfad aufgerufen; das Einreihen blockiert nie. Laeuft eine Queue
//! ueber, wird der aelteste Eintrag verworfen und die Queue als veraltet
//! markiert. Der Leser bekommt dann `HubEvent::Nachholen` statt des
//! Rueckstands und ersetzt ihn ueber `SignalingState::beobachter_nachholen`
//! durch frische Snapshots.
//!
//! ## Reihenfolge
//! Die Registry meldet Events unter ihrem Schreib-Lock. Jede Queue ist FIFO,
//! daher sieht jeder Beobachter die Events einer Verbindung in genau der
//! Reihenfolge, in der sie angewandt wurden.

use dashmap::DashMap;
use emlink_core::event::{SessionEvent, SessionEventSink};
use emlink_core::model::{AudioDevice, Connection};
use emlink_core::types::{ClientId, ConnectionId};
use emlink_protocol::control::{
    ConnectionRemoved, ControlMessage, ControlPayload, DeviceSnapshot, SessionSnapshot,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Standard-Groesse der Queue pro Beobachter
pub const STANDARD_QUEUE_KAPAZITAET: usize = 256;

/// Mindestgroesse (Geraete- und Sitzungs-Snapshot muessen hineinpassen)
const MIN_QUEUE_KAPAZITAET: usize = 2;

// ---------------------------------------------------------------------------
// HubEvent
// ---------------------------------------------------------------------------

/// Ein Eintrag in der Queue eines Beobachters
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Einzelne fertige Nachricht
    Nachricht(ControlMessage),
    /// Pegel-Batch eines Telemetrie-Ticks (ein Queue-Eintrag)
    PegelBatch(Arc<Vec<Connection>>),
    /// Die Queue ist uebergelaufen; der Rueckstand ist unvollstaendig und
    /// muss durch `BeobachterQueue::neu_synchronisieren` ersetzt werden
    Nachholen,
}

impl HubEvent {
    /// Zerlegt den Eintrag in Draht-Nachrichten
    pub fn in_nachrichten(self) -> Vec<ControlMessage> {
        match self {
            Self::Nachricht(n) => vec![n],
            Self::PegelBatch(batch) => batch
                .iter()
                .map(|v| ControlMessage::event(ControlPayload::ConnectionUpdate(v.clone())))
                .collect(),
            Self::Nachholen => Vec::new(),
        }
    }

    fn snapshots(geraete: Vec<AudioDevice>, verbindungen: Vec<Connection>) -> [Self; 2] {
        [
            Self::Nachricht(ControlMessage::event(ControlPayload::DeviceSnapshot(
                DeviceSnapshot { devices: geraete },
            ))),
            Self::Nachricht(ControlMessage::event(ControlPayload::SessionSnapshot(
                SessionSnapshot {
                    connections: verbindungen,
                },
            ))),
        ]
    }

    fn upsert(verbindung: Connection) -> Self {
        Self::Nachricht(ControlMessage::event(ControlPayload::ConnectionUpdate(
            verbindung,
        )))
    }

    fn entfernt(id: ConnectionId) -> Self {
        Self::Nachricht(ControlMessage::event(ControlPayload::ConnectionRemoved(
            ConnectionRemoved { id },
        )))
    }
}

// ---------------------------------------------------------------------------
// BeobachterQueue
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct QueueInhalt {
    eintraege: VecDeque<HubEvent>,
    /// Seit dem letzten Snapshot ging mindestens ein Eintrag verloren
    veraltet: bool,
}

/// Begrenzte Drop-Oldest-Queue eines Beobachters
///
/// Genau ein Leser (der Verbindungs-Task), beliebig viele Schreiber.
#[derive(Debug)]
pub struct BeobachterQueue {
    client_id: ClientId,
    kapazitaet: usize,
    inhalt: Mutex<QueueInhalt>,
    signal: Notify,
    verworfen: AtomicU64,
    geschlossen: AtomicBool,
}

impl BeobachterQueue {
    fn neu(client_id: ClientId, kapazitaet: usize) -> Self {
        Self {
            client_id,
            kapazitaet: kapazitaet.max(MIN_QUEUE_KAPAZITAET),
            inhalt: Mutex::new(QueueInhalt::default()),
            signal: Notify::new(),
            verworfen: AtomicU64::new(0),
            geschlossen: AtomicBool::new(false),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Reiht einen Eintrag ein; gibt `true` zurueck wenn dafuer einer verworfen wurde
    fn einreihen(&self, event: HubEvent) -> bool {
        if self.geschlossen.load(Ordering::Acquire) {
            return false;
        }
        let (verworfen, erstmals) = {
            let mut inhalt = self.inhalt.lock();
            let voll = inhalt.eintraege.len() >= self.kapazitaet;
            let erstmals = voll && !inhalt.veraltet;
            if voll {
                inhalt.eintraege.pop_front();
                inhalt.veraltet = true;
            }
            inhalt.eintraege.push_back(event);
            (voll, erstmals)
        };
        if verworfen {
            self.verworfen.fetch_add(1, Ordering::Relaxed);
        }
        if erstmals {
            tracing::warn!(client = %self.client_id, "Beobachter-Queue voll, Neusynchronisation noetig");
        }
        self.signal.notify_one();
        verworfen
    }

    /// Wartet auf den naechsten Eintrag
    ///
    /// Gibt `None` zurueck sobald die Queue geschlossen und leer ist.
    /// Abbruchsicher: ein Eintrag wird erst beim Zurueckgeben entnommen.
    pub async fn empfangen(&self) -> Option<HubEvent> {
        loop {
            if let Some(event) = self.try_empfangen() {
                return Some(event);
            }
            if self.geschlossen.load(Ordering::Acquire) {
                return None;
            }
            self.signal.notified().await;
        }
    }

    /// Entnimmt den naechsten Eintrag ohne zu warten
    ///
    /// Solange die Queue veraltet ist, kommt immer `HubEvent::Nachholen`.
    pub fn try_empfangen(&self) -> Option<HubEvent> {
        let mut inhalt = self.inhalt.lock();
        if inhalt.veraltet {
            return Some(HubEvent::Nachholen);
        }
        inhalt.eintraege.pop_front()
    }

    /// Ersetzt den Rueckstand durch Geraete- und Sitzungs-Snapshot
    ///
    /// Der Aufrufer muss verhindern, dass zwischen dem Erstellen von
    /// `verbindungen` und diesem Aufruf eine Mutation gemeldet wird
    /// (siehe `SessionRegistry::snapshot_mit`).
    pub fn neu_synchronisieren(&self, geraete: Vec<AudioDevice>, verbindungen: Vec<Connection>) {
        {
            let mut inhalt = self.inhalt.lock();
            inhalt.eintraege.clear();
            inhalt
                .eintraege
                .extend(HubEvent::snapshots(geraete, verbindungen));
            inhalt.veraltet = false;
        }
        self.signal.notify_one();
    }

    /// Ob seit dem letzten Snapshot Eintraege verloren gingen
    pub fn ist_veraltet(&self) -> bool {
        self.inhalt.lock().veraltet
    }

    /// Schliesst die Queue; wartende Leser erhalten `None`
    pub fn schliessen(&self) {
        self.geschlossen.store(true, Ordering::Release);
        self.signal.notify_one();
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::Acquire)
    }

    /// Anzahl der wegen Ueberlauf verworfenen Eintraege
    pub fn verworfen(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }

    pub fn laenge(&self) -> usize {
        self.inhalt.lock().eintraege.len()
    }
}

// ---------------------------------------------------------------------------
// BroadcastHub
// ---------------------------------------------------------------------------

/// Zentraler Verteiler fuer Session-Events
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<BroadcastHubInner>,
}

struct BroadcastHubInner {
    beobachter: DashMap<ClientId, Arc<BeobachterQueue>>,
    kapazitaet: usize,
    /// Verworfene Events ueber alle (auch bereits abgemeldete) Beobachter
    verworfen_gesamt: AtomicU64,
}

impl BroadcastHub {
    /// Erstellt einen Hub mit gegebener Queue-Groesse pro Beobachter
    pub fn neu(kapazitaet: usize) -> Self {
        Self {
            inner: Arc::new(BroadcastHubInner {
                beobachter: DashMap::new(),
                kapazitaet,
                verworfen_gesamt: AtomicU64::new(0),
            }),
        }
    }

    /// Meldet einen Beobachter an und reiht die Anfangs-Snapshots ein
    ///
    /// Der Aufrufer muss sicherstellen, dass zwischen dem Erstellen von
    /// `verbindungen` und dieser Anmeldung keine Mutation gemeldet wird
    /// (siehe `SessionRegistry::snapshot_mit`).
    pub fn anmelden(
        &self,
        client_id: ClientId,
        geraete: Vec<AudioDevice>,
        verbindungen: Vec<Connection>,
    ) -> Arc<BeobachterQueue> {
        let queue = Arc::new(BeobachterQueue::neu(client_id, self.inner.kapazitaet));
        queue.neu_synchronisieren(geraete, verbindungen);

        if let Some(alt) = self.inner.beobachter.insert(client_id, Arc::clone(&queue)) {
            alt.schliessen();
        }
        tracing::debug!(client = %client_id, "Beobachter angemeldet");
        queue
    }

    /// Meldet einen Beobachter ab und schliesst seine Queue
    pub fn abmelden(&self, client_id: &ClientId) {
        if let Some((_, queue)) = self.inner.beobachter.remove(client_id) {
            queue.schliessen();
            tracing::debug!(
                client = %client_id,
                verworfen = queue.verworfen(),
                "Beobachter abgemeldet"
            );
        }
    }

    pub fn ist_angemeldet(&self, client_id: &ClientId) -> bool {
        self.inner.beobachter.contains_key(client_id)
    }

    /// Reiht einen Eintrag bei allen Beobachtern ein
    ///
    /// Gibt die Anzahl der erreichten Beobachter zurueck.
    pub fn an_alle(&self, event: HubEvent) -> usize {
        let mut erreicht = 0;
        self.inner.beobachter.iter().for_each(|entry| {
            if entry.value().einreihen(event.clone()) {
                self.inner.verworfen_gesamt.fetch_add(1, Ordering::Relaxed);
            }
            erreicht += 1;
        });
        erreicht
    }

    pub fn beobachter_anzahl(&self) -> usize {
        self.inner.beobachter.len()
    }

    /// Summe aller wegen Ueberlauf verworfenen Events
    pub fn verworfen_gesamt(&self) -> u64 {
        self.inner.verworfen_gesamt.load(Ordering::Relaxed)
    }

    /// Schliesst alle Queues (Server-Shutdown)
    pub fn alle_schliessen(&self) {
        self.inner
            .beobachter
            .iter()
            .for_each(|entry| entry.value().schliessen());
        self.inner.beobachter.clear();
    }
}

impl SessionEventSink for BroadcastHub {
    fn veroeffentlichen(&self, event: SessionEvent) {
        let hub_event = match event {
            SessionEvent::Aktualisiert(v) => HubEvent::upsert(v),
            SessionEvent::Entfernt(id) => HubEvent::entfernt(id),
            SessionEvent::TelemetrieBatch(batch) => HubEvent::PegelBatch(Arc::new(batch)),
        };
        let erreicht = self.an_alle(hub_event);
        tracing::trace!(erreicht, "Session-Event verteilt");
    }
}
