//! Control-Protokoll
//!
//! Definiert alle Nachrichten die ueber die Client-Verbindung zwischen
//! Client und Server ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `request_id: u32`
//! - Broadcast-Events tragen `request_id = 0`
//! - JSON-Serialisierung via serde, Tagged Enum mit camelCase-Namen
//!   (`createConnection`, `connectionUpdate`, ...)

use emlink_core::model::{AudioDevice, Connection};
use emlink_core::types::ConnectionId;
use serde::{Deserialize, Serialize};

/// Request-ID fuer unaufgeforderte Server-Events
pub const EVENT_REQUEST_ID: u32 = 0;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    // Sessions
    DeviceNotFound,
    SessionNotFound,
    NotConnected,
    SessionExists,
    // Server
    ServerFull,
}

// ---------------------------------------------------------------------------
// Eingehende Kommandos
// ---------------------------------------------------------------------------

/// Neue Verbindung anlegen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionRequest {
    /// Anzeigename (leer = Standardname)
    #[serde(default)]
    pub name: String,
    /// Geraet aus der DeviceRegistry
    #[serde(alias = "audioDevice")]
    pub audio_device_id: String,
}

/// Teilaktualisierung einer Verbindung
///
/// Unbekannte Felder werden beim Deserialisieren ignoriert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConnectionRequest {
    #[serde(alias = "connectionId")]
    pub id: ConnectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listening: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talking: Option<bool>,
}

/// Referenz auf eine Verbindung (Toggle-Kommandos)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRef {
    #[serde(alias = "connectionId")]
    pub id: ConnectionId,
}

/// Lautstaerke setzen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVolumeRequest {
    #[serde(alias = "connectionId")]
    pub id: ConnectionId,
    pub volume: f32,
}

// ---------------------------------------------------------------------------
// Ausgehende Events und Antworten
// ---------------------------------------------------------------------------

/// Geraeteliste beim Anmelden eines Beobachters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub devices: Vec<AudioDevice>,
}

/// Verbindungsliste beim Anmelden eines Beobachters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub connections: Vec<Connection>,
}

/// Verbindung wurde entfernt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRemoved {
    pub id: ConnectionId,
}

/// Bestaetigung eines erfolgreich ausgefuehrten Kommandos
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub connection_id: ConnectionId,
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    /// Originaler Timestamp aus dem Ping
    pub echo_timestamp_ms: u64,
    /// Server-eigener Timestamp
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: ControlPayload
// ---------------------------------------------------------------------------

/// Alle moeglichen Control-Nachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControlPayload {
    // Client -> Server
    CreateConnection(CreateConnectionRequest),
    UpdateConnection(UpdateConnectionRequest),
    ToggleListen(ConnectionRef),
    ToggleTalk(ConnectionRef),
    SetVolume(SetVolumeRequest),

    // Server -> Client
    DeviceSnapshot(DeviceSnapshot),
    SessionSnapshot(SessionSnapshot),
    ConnectionUpdate(Connection),
    ConnectionRemoved(ConnectionRemoved),
    Ack(AckResponse),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),

    // Error
    Error(ErrorResponse),
}

impl ControlPayload {
    /// Kurzname fuer Logs und Metrik-Labels
    pub fn art(&self) -> &'static str {
        match self {
            Self::CreateConnection(_) => "createConnection",
            Self::UpdateConnection(_) => "updateConnection",
            Self::ToggleListen(_) => "toggleListen",
            Self::ToggleTalk(_) => "toggleTalk",
            Self::SetVolume(_) => "setVolume",
            Self::DeviceSnapshot(_) => "deviceSnapshot",
            Self::SessionSnapshot(_) => "sessionSnapshot",
            Self::ConnectionUpdate(_) => "connectionUpdate",
            Self::ConnectionRemoved(_) => "connectionRemoved",
            Self::Ack(_) => "ack",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }
}

// ---------------------------------------------------------------------------
// Control-Frame (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Control-Protokoll-Nachricht mit Request/Response-Zuordnung
///
/// Jede Anfrage traegt eine `request_id` die der Client vergibt.
/// Der Server kopiert die ID in die Antwort damit der Client
/// Request und Response zuordnen kann.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Nachrichten-ID fuer Request/Response-Zuordnung
    #[serde(default)]
    pub request_id: u32,
    /// Inhalt der Nachricht
    pub payload: ControlPayload,
}

impl ControlMessage {
    /// Erstellt eine neue Control-Nachricht
    pub fn new(request_id: u32, payload: ControlPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt ein unaufgefordertes Server-Event
    pub fn event(payload: ControlPayload) -> Self {
        Self::new(EVENT_REQUEST_ID, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Ping(PingMessage { timestamp_ms }),
        )
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            ControlPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Bestaetigung
    pub fn ack(request_id: u32, connection_id: ConnectionId) -> Self {
        Self::new(request_id, ControlPayload::Ack(AckResponse { connection_id }))
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            ControlPayload::Error(ErrorResponse {
                code,
                message: message.into(),
            }),
        )
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
