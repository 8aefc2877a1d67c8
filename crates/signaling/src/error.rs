//! Fehlertypen fuer den Signaling-Service

use emlink_protocol::control::ErrorCode;
use emlink_voice::SessionError;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Abgelehnte Registry-Operation
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Protokollfehler (ungueltiges Frame, unerwartete Nachricht)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Server ist voll
    #[error("Server ist voll")]
    ServerVoll,
}

impl SignalingError {
    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    /// Fehler-Code fuer die Error-Response an den Client
    pub fn fehler_code(&self) -> ErrorCode {
        match self {
            Self::Session(e) => match e {
                SessionError::DeviceNotFound(_) => ErrorCode::DeviceNotFound,
                SessionError::SessionNotFound(_) => ErrorCode::SessionNotFound,
                SessionError::NotConnected { .. } => ErrorCode::NotConnected,
                SessionError::SessionExists(_) => ErrorCode::SessionExists,
                SessionError::InvalidTransition { .. } => ErrorCode::InternalError,
            },
            Self::Protokoll(_) => ErrorCode::InvalidRequest,
            Self::ServerVoll => ErrorCode::ServerFull,
            Self::Io(_) => ErrorCode::InternalError,
        }
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use emlink_core::model::EmZustand;
    use emlink_core::types::{ClientId, ConnectionId};
    use emlink_voice::em::EmUebergang;

    #[test]
    fn session_fehler_auf_codes_abbilden() {
        let id = ConnectionId::from(ClientId::new());
        let faelle = [
            (SessionError::DeviceNotFound("usb9".into()), ErrorCode::DeviceNotFound),
            (SessionError::SessionNotFound(id), ErrorCode::SessionNotFound),
            (
                SessionError::NotConnected {
                    id,
                    zustand: EmZustand::Idle,
                },
                ErrorCode::NotConnected,
            ),
            (SessionError::SessionExists(id), ErrorCode::SessionExists),
            (
                SessionError::InvalidTransition {
                    versucht: EmUebergang::Melden,
                    aktuell: EmZustand::Idle,
                },
                ErrorCode::InternalError,
            ),
        ];
        for (fehler, code) in faelle {
            assert_eq!(SignalingError::from(fehler).fehler_code(), code);
        }
    }

    #[test]
    fn protokollfehler_ist_ungueltige_anfrage() {
        assert_eq!(
            SignalingError::protokoll("unerwartet").fehler_code(),
            ErrorCode::InvalidRequest
        );
        assert_eq!(SignalingError::ServerVoll.fehler_code(), ErrorCode::ServerFull);
    }

    #[test]
    fn io_fehler_ist_interner_fehler() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "weg");
        assert_eq!(
            SignalingError::from(io).fehler_code(),
            ErrorCode::InternalError
        );
    }
}
