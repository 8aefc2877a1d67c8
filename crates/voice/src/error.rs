//! Fehlertypen der Session-Registry

use emlink_core::model::EmZustand;
use emlink_core::types::ConnectionId;
use thiserror::Error;

use crate::em::{EmUebergang, UngueltigerUebergang};

/// Fehler einer Registry-Operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Referenziertes Audio-Geraet existiert nicht
    #[error("Audio-Geraet nicht gefunden: {0}")]
    DeviceNotFound(String),

    /// Verbindung existiert nicht (mehr)
    #[error("Verbindung nicht gefunden: {0}")]
    SessionNotFound(ConnectionId),

    /// Leitung ist nicht durchgeschaltet
    #[error("Verbindung {id} ist nicht durchgeschaltet (Zustand: {zustand})")]
    NotConnected { id: ConnectionId, zustand: EmZustand },

    /// Client besitzt bereits eine Verbindung
    #[error("Verbindung existiert bereits: {0}")]
    SessionExists(ConnectionId),

    /// Interner Fehlgebrauch der E&M-Zustandsmaschine
    #[error("Ungueltiger E&M-Uebergang {versucht} im Zustand {aktuell}")]
    InvalidTransition {
        versucht: EmUebergang,
        aktuell: EmZustand,
    },
}

impl From<UngueltigerUebergang> for SessionError {
    fn from(e: UngueltigerUebergang) -> Self {
        Self::InvalidTransition {
            versucht: e.versucht,
            aktuell: e.aktuell,
        }
    }
}

/// Result-Typ fuer Registry-Operationen
pub type SessionResult<T> = Result<T, SessionError>;
