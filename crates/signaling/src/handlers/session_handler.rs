//! Session-Handler – Anlegen, Aendern, Umschalten und Lautstaerke
//!
//! Uebersetzt die Kommandos der Clients in Registry-Aufrufe. Die Aenderung
//! selbst erreicht alle Beobachter ueber den Broadcast-Hub; der Ausloeser
//! erhaelt zusaetzlich eine Bestaetigung mit seiner Request-ID.

use emlink_core::types::ClientId;
use emlink_protocol::control::{
    ConnectionRef, ControlMessage, CreateConnectionRequest, SetVolumeRequest,
    UpdateConnectionRequest,
};
use emlink_voice::VerbindungsPatch;
use std::sync::Arc;

use crate::error::SignalingResult;
use crate::server_state::SignalingState;

/// Legt die Verbindung des Clients an (E&M-Aufnahme laeuft in der Registry)
pub fn handle_create(
    request: CreateConnectionRequest,
    request_id: u32,
    client_id: ClientId,
    state: &Arc<SignalingState>,
) -> SignalingResult<ControlMessage> {
    let verbindung =
        state
            .registry
            .erstellen(client_id, &request.name, &request.audio_device_id)?;
    Ok(ControlMessage::ack(request_id, verbindung.id))
}

/// Teilaktualisierung; nicht erlaubte Felder kommen gar nicht erst an
pub fn handle_update(
    request: UpdateConnectionRequest,
    request_id: u32,
    state: &Arc<SignalingState>,
) -> SignalingResult<ControlMessage> {
    let patch = VerbindungsPatch {
        name: request.name,
        volume: request.volume,
        listening: request.listening,
        talking: request.talking,
    };
    let verbindung = state.registry.aktualisieren(&request.id, patch)?;
    Ok(ControlMessage::ack(request_id, verbindung.id))
}

pub fn handle_toggle_listen(
    request: ConnectionRef,
    request_id: u32,
    state: &Arc<SignalingState>,
) -> SignalingResult<ControlMessage> {
    let verbindung = state.registry.hoeren_umschalten(&request.id)?;
    Ok(ControlMessage::ack(request_id, verbindung.id))
}

pub fn handle_toggle_talk(
    request: ConnectionRef,
    request_id: u32,
    state: &Arc<SignalingState>,
) -> SignalingResult<ControlMessage> {
    let verbindung = state.registry.sprechen_umschalten(&request.id)?;
    Ok(ControlMessage::ack(request_id, verbindung.id))
}

pub fn handle_set_volume(
    request: SetVolumeRequest,
    request_id: u32,
    state: &Arc<SignalingState>,
) -> SignalingResult<ControlMessage> {
    let verbindung = state
        .registry
        .lautstaerke_setzen(&request.id, request.volume)?;
    Ok(ControlMessage::ack(request_id, verbindung.id))
}
