//! emlink-voice – Sitzungskern
//!
//! Verwaltet die lebenden Verbindungen samt E&M-Signalisierung und
//! synthetischer Pegel-Telemetrie.
//!
//! ## Module
//! - [`em`] – Reine E&M-Zustandsuebergaenge
//! - [`state`] – Session-Registry (Arena + Index, Events unter Lock)
//! - [`telemetry`] – Periodischer Pegel-Sampler
//! - [`error`] – Fehler der Registry-Operationen

pub mod em;
pub mod error;
pub mod state;
pub mod telemetry;

pub use error::{SessionError, SessionResult};
pub use state::{SessionRegistry, VerbindungsPatch};
pub use telemetry::TelemetrySampler;
