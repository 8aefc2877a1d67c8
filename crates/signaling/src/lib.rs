//! emlink-signaling – Client-Gateway und Broadcast
//!
//! Dieser Crate verbindet die Clients mit der Session-Registry: er nimmt
//! Kommandos ueber TCP entgegen, fuehrt sie aus und verteilt jede
//! Aenderung an alle angeschlossenen Beobachter.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Anmeldung: deviceSnapshot, sessionSnapshot
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- SessionHandler (create, update, toggleListen, toggleTalk, setVolume)
//!     |
//!     v
//! SessionRegistry --(SessionEvent, unter Lock)--> BroadcastHub
//!                                                   |
//!                                                   v
//!                                 BeobachterQueue pro Client (drop-oldest)
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use broadcast::{BeobachterQueue, BroadcastHub, HubEvent};
pub use connection::ClientConnection;
pub use dispatcher::{DispatcherContext, MessageDispatcher};
pub use error::{SignalingError, SignalingResult};
pub use server_state::{
    ClientPlatz, KommandoErgebnis, KommandoStatistik, SignalingConfig, SignalingState,
};
pub use tcp::SignalingServer;
