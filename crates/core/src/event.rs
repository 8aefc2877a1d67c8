//! Session-Events und die Senken-Schnittstelle der Registry
//!
//! Die Session-Registry meldet jede angewandte Aenderung als `SessionEvent`
//! an eine `SessionEventSink`. Die Meldung erfolgt innerhalb der Mutation,
//! die Reihenfolge der Events entspricht daher exakt der Reihenfolge, in der
//! die Aenderungen angewandt wurden.

use serde::{Deserialize, Serialize};

use crate::model::Connection;
use crate::types::ConnectionId;

/// Alle Aenderungen die die Session-Registry meldet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Verbindung wurde angelegt oder geaendert
    Aktualisiert(Connection),
    /// Verbindung wurde entfernt
    Entfernt(ConnectionId),
    /// Ergebnis eines Telemetrie-Ticks (hoechstens ein Eintrag pro Verbindung)
    TelemetrieBatch(Vec<Connection>),
}

impl SessionEvent {
    /// Anzahl der betroffenen Verbindungen
    pub fn umfang(&self) -> usize {
        match self {
            Self::Aktualisiert(_) | Self::Entfernt(_) => 1,
            Self::TelemetrieBatch(batch) => batch.len(),
        }
    }
}

/// Empfaenger fuer Session-Events
///
/// Wird synchron aus dem Mutationspfad der Registry aufgerufen und darf
/// deshalb niemals blockieren.
pub trait SessionEventSink: Send + Sync + 'static {
    /// Nimmt ein Event entgegen
    fn veroeffentlichen(&self, event: SessionEvent);
}

/// Senke die alle Events verwirft (Tests, Werkzeuge ohne Beobachter)
#[derive(Debug, Default, Clone, Copy)]
pub struct KeineSenke;

impl SessionEventSink for KeineSenke {
    fn veroeffentlichen(&self, _event: SessionEvent) {}
}
