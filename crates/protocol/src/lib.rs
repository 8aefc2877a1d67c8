//! emlink-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichtentypen die zwischen Client und
//! Server ausgetauscht werden, sowie das Frame-Format auf dem Draht.

pub mod control;
pub mod wire;

pub use control::{ControlMessage, ControlPayload, ErrorCode};
pub use wire::{EingangsCodec, FrameCodec, UngueltigerFrame};
