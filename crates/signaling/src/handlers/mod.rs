//! Handler fuer die Control-Nachrichten
//!
//! Jeder Handler ist fuer einen bestimmten Nachrichtentyp zustaendig
//! und hat Zugriff auf den gemeinsamen SignalingState.

pub mod session_handler;
