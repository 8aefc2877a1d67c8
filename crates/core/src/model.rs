//! Datenmodell: Audio-Geraete, Verbindungen und E&M-Signalisierung
//!
//! Die Typen sind serde-kompatibel und werden unveraendert ueber das
//! Control-Protokoll an Beobachter ausgeliefert (camelCase auf dem Draht).

use serde::{Deserialize, Serialize};

use crate::types::ConnectionId;

// ---------------------------------------------------------------------------
// Grenzwerte
// ---------------------------------------------------------------------------

/// Obergrenze des synthetischen Audio-Pegels
pub const MAX_PEGEL: f32 = 100.0;

/// Begrenzt eine Lautstaerke auf `[0, 1]` (NaN wird zu 0)
pub fn lautstaerke_begrenzen(wert: f32) -> f32 {
    if wert.is_nan() {
        0.0
    } else {
        wert.clamp(0.0, 1.0)
    }
}

/// Begrenzt einen Audio-Pegel auf `[0, 100]` (NaN wird zu 0)
pub fn pegel_begrenzen(wert: f32) -> f32 {
    if wert.is_nan() {
        0.0
    } else {
        wert.clamp(0.0, MAX_PEGEL)
    }
}

// ---------------------------------------------------------------------------
// Audio-Geraete
// ---------------------------------------------------------------------------

/// Betriebszustand eines Audio-Geraets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Error,
}

/// Ein Audio-Endpunkt (z.B. USB-Soundkarte)
///
/// Nach der Discovery unveraenderlich.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioDevice {
    /// Stabiler Bezeichner (z.B. `usb0`)
    pub id: String,
    /// Anzeigename
    pub name: String,
    /// Anzahl der Kanaele
    pub channel_count: u16,
    /// Betriebszustand
    pub status: DeviceStatus,
}

// ---------------------------------------------------------------------------
// E&M-Signalisierung
// ---------------------------------------------------------------------------

/// Zustaende der E&M-Leitungssignalisierung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmZustand {
    Idle,
    Seized,
    Answered,
    Connected,
    Disconnected,
}

impl std::fmt::Display for EmZustand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Seized => "seized",
            Self::Answered => "answered",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Signalisierungszustand einer Verbindung samt E- und M-Ader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingSnapshot {
    /// Aktueller Zustand der Zustandsmaschine
    pub state: EmZustand,
    /// E-Ader (Ear, Empfangsrichtung)
    #[serde(rename = "eLead")]
    pub e_lead: bool,
    /// M-Ader (Mouth, Senderichtung)
    #[serde(rename = "mLead")]
    pub m_lead: bool,
}

impl SignalingSnapshot {
    /// Ruhezustand: beide Adern offen
    pub const IDLE: Self = Self {
        state: EmZustand::Idle,
        e_lead: false,
        m_lead: false,
    };
}

impl Default for SignalingSnapshot {
    fn default() -> Self {
        Self::IDLE
    }
}

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

/// Lebenszyklus-Status einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

/// Eine logische Audio-Leitung zwischen Server und einem Client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub status: ConnectionStatus,
    /// Referenz auf ein Geraet der DeviceRegistry
    pub audio_device_id: String,
    pub listening: bool,
    pub talking: bool,
    /// Lautstaerke in `[0, 1]`
    pub volume: f32,
    /// Synthetischer Pegel in `[0, 100]`
    pub audio_level: f32,
    pub signaling: SignalingSnapshot,
    /// Letzte Aktivitaet (Unix-Millisekunden)
    #[serde(rename = "lastActivity")]
    pub last_activity_ms: i64,
}

impl Connection {
    /// Prueft ob die Leitung durchgeschaltet ist (Voraussetzung fuer Hoeren/Sprechen)
    pub fn ist_durchgeschaltet(&self) -> bool {
        self.signaling.state == EmZustand::Connected
    }

    /// Prueft ob die Verbindung Audio fuehrt (fuer die Pegel-Telemetrie)
    pub fn ist_aktiv(&self) -> bool {
        self.status == ConnectionStatus::Connected && (self.listening || self.talking)
    }
}

/// Aktueller Zeitpunkt in Unix-Millisekunden
pub fn jetzt_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
