//! emlink-core – Gemeinsame Typen, Datenmodell und Session-Events
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen emlink-Crates gemeinsam genutzt werden: ID-Newtypes, das
//! Verbindungs- und Geraetemodell sowie die Schnittstelle, ueber die die
//! Session-Registry Aenderungen meldet.

pub mod event;
pub mod model;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{KeineSenke, SessionEvent, SessionEventSink};
pub use model::{
    AudioDevice, Connection, ConnectionStatus, DeviceStatus, EmZustand, SignalingSnapshot,
};
pub use types::{ClientId, ConnectionId};
