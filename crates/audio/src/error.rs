//! Fehlertypen der Geraete-Registry

use thiserror::Error;

/// Alle moeglichen Fehler rund um Audio-Geraete
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Geraete-Discovery fehlgeschlagen: {0}")]
    Discovery(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;
