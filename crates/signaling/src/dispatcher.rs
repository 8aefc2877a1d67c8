//! Message-Dispatcher – Routet ControlMessages an die richtigen Handler
//!
//! Der Dispatcher empfaengt ControlMessages von einer ClientConnection,
//! bestimmt den richtigen Handler und gibt die Antwort zurueck. Abgelehnte
//! Kommandos werden als Error-Response mit passendem Code beantwortet;
//! sie beenden nie die Verbindung.

use emlink_core::types::{ClientId, ConnectionId};
use emlink_protocol::control::{ControlMessage, ControlPayload};
use emlink_protocol::wire::UngueltigerFrame;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};
use crate::handlers::session_handler;
use crate::server_state::{KommandoErgebnis, SignalingState};

/// Statistik-Label fuer Frames, die keine gueltige Nachricht ergeben
pub const UNGUELTIGE_NACHRICHT: &str = "invalid";

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
#[derive(Debug, Clone)]
pub struct DispatcherContext {
    /// Identitaet des Clients (bestimmt die ID seiner Verbindung)
    pub client_id: ClientId,
    /// Peer-Adresse fuer Logs
    pub peer_addr: SocketAddr,
}

impl DispatcherContext {
    pub fn neu(client_id: ClientId, peer_addr: SocketAddr) -> Self {
        Self {
            client_id,
            peer_addr,
        }
    }
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<SignalingState>,
}

impl MessageDispatcher {
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende ControlMessage und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll
    /// (Pong-Antworten des Clients).
    pub fn dispatch(
        &self,
        message: ControlMessage,
        ctx: &DispatcherContext,
    ) -> Option<ControlMessage> {
        let request_id = message.request_id;
        let art = message.payload.art();

        let ergebnis: SignalingResult<ControlMessage> = match message.payload {
            // -------------------------------------------------------------------
            // Session-Kommandos
            // -------------------------------------------------------------------
            ControlPayload::CreateConnection(req) => {
                session_handler::handle_create(req, request_id, ctx.client_id, &self.state)
            }
            ControlPayload::UpdateConnection(req) => {
                session_handler::handle_update(req, request_id, &self.state)
            }
            ControlPayload::ToggleListen(req) => {
                session_handler::handle_toggle_listen(req, request_id, &self.state)
            }
            ControlPayload::ToggleTalk(req) => {
                session_handler::handle_toggle_talk(req, request_id, &self.state)
            }
            ControlPayload::SetVolume(req) => {
                session_handler::handle_set_volume(req, request_id, &self.state)
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            ControlPayload::Ping(ping) => {
                let jetzt = chrono::Utc::now().timestamp_millis().max(0) as u64;
                return Some(ControlMessage::pong(request_id, ping.timestamp_ms, jetzt));
            }
            ControlPayload::Pong(_) => return None,

            // -------------------------------------------------------------------
            // Server -> Client Nachrichten sind als Eingang ungueltig
            // -------------------------------------------------------------------
            andere => Err(SignalingError::protokoll(format!(
                "Nachricht '{}' ist nur vom Server erlaubt",
                andere.art()
            ))),
        };

        Some(match ergebnis {
            Ok(antwort) => {
                self.state.statistik.erfassen(art, KommandoErgebnis::Ok);
                antwort
            }
            Err(e) => {
                self.state
                    .statistik
                    .erfassen(art, KommandoErgebnis::Abgelehnt);
                tracing::debug!(
                    peer = %ctx.peer_addr,
                    client = %ctx.client_id,
                    kommando = art,
                    fehler = %e,
                    "Kommando abgelehnt"
                );
                ControlMessage::error(request_id, e.fehler_code(), e.to_string())
            }
        })
    }

    /// Beantwortet einen Frame, der sich nicht als Nachricht lesen liess
    ///
    /// Die Verbindung bleibt offen; der Client bekommt `INVALID_REQUEST`
    /// mit der geretteten `request_id`.
    pub fn ungueltig_beantworten(
        &self,
        frame: UngueltigerFrame,
        ctx: &DispatcherContext,
    ) -> ControlMessage {
        let e = SignalingError::protokoll(frame.grund);
        self.state
            .statistik
            .erfassen(UNGUELTIGE_NACHRICHT, KommandoErgebnis::Abgelehnt);
        tracing::debug!(
            peer = %ctx.peer_addr,
            client = %ctx.client_id,
            request_id = frame.request_id,
            fehler = %e,
            "Ungueltige Nachricht abgelehnt"
        );
        ControlMessage::error(frame.request_id, e.fehler_code(), e.to_string())
    }

    /// Aufraeumen beim Verbindungsende
    ///
    /// Entfernt die Verbindung des Clients (falls vorhanden) und meldet
    /// seinen Beobachter ab. Mehrfacher Aufruf ist unschaedlich.
    pub fn client_cleanup(&self, ctx: &DispatcherContext) {
        let id = ConnectionId::from(ctx.client_id);
        if self.state.registry.entfernen(&id).is_some() {
            tracing::debug!(client = %ctx.client_id, "Verbindung beim Trennen entfernt");
        }
        self.state.hub.abmelden(&ctx.client_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BroadcastHub;
    use crate::server_state::SignalingConfig;
    use emlink_audio::{DeviceRegistry, StatischeGeraeteQuelle};
    use emlink_protocol::control::{
        ConnectionRef, CreateConnectionRequest, ErrorCode, SetVolumeRequest,
        UpdateConnectionRequest,
    };
    use emlink_voice::SessionRegistry;

    fn state() -> Arc<SignalingState> {
        let geraete = DeviceRegistry::neu(Arc::new(StatischeGeraeteQuelle::usb_standard()));
        geraete.entdecken();
        let hub = BroadcastHub::neu(64);
        let registry = Arc::new(SessionRegistry::neu(geraete, Arc::new(hub.clone())));
        SignalingState::neu(SignalingConfig::default(), registry, hub)
    }

    fn ctx() -> DispatcherContext {
        DispatcherContext::neu(ClientId::new(), "127.0.0.1:40000".parse().unwrap())
    }

    fn anlegen(d: &MessageDispatcher, ctx: &DispatcherContext, geraet: &str) -> ControlMessage {
        d.dispatch(
            ControlMessage::new(
                1,
                ControlPayload::CreateConnection(CreateConnectionRequest {
                    name: "Studio A".to_string(),
                    audio_device_id: geraet.to_string(),
                }),
            ),
            ctx,
        )
        .expect("Antwort erwartet")
    }

    fn fehler_code(antwort: &ControlMessage) -> Option<ErrorCode> {
        match &antwort.payload {
            ControlPayload::Error(e) => Some(e.code),
            _ => None,
        }
    }

    #[test]
    fn anlegen_wird_bestaetigt() {
        let state = state();
        let d = MessageDispatcher::neu(Arc::clone(&state));
        let ctx = ctx();

        let antwort = anlegen(&d, &ctx, "usb0");
        assert_eq!(antwort.request_id, 1);
        match antwort.payload {
            ControlPayload::Ack(ack) => {
                assert_eq!(ack.connection_id, ConnectionId::from(ctx.client_id))
            }
            andere => panic!("Erwartet Ack, erhalten {}", andere.art()),
        }
        assert_eq!(state.registry.anzahl(), 1);
        assert_eq!(
            state.statistik.anzahl("createConnection", KommandoErgebnis::Ok),
            1
        );
    }

    #[test]
    fn unbekanntes_geraet_ergibt_fehler_code() {
        let state = state();
        let d = MessageDispatcher::neu(Arc::clone(&state));
        let antwort = anlegen(&d, &ctx(), "usb7");
        assert_eq!(fehler_code(&antwort), Some(ErrorCode::DeviceNotFound));
        assert_eq!(antwort.request_id, 1);
        assert_eq!(
            state
                .statistik
                .anzahl("createConnection", KommandoErgebnis::Abgelehnt),
            1
        );
    }

    #[test]
    fn zweites_anlegen_ergibt_session_exists() {
        let d = MessageDispatcher::neu(state());
        let ctx = ctx();
        anlegen(&d, &ctx, "usb0");
        assert_eq!(
            fehler_code(&anlegen(&d, &ctx, "usb1")),
            Some(ErrorCode::SessionExists)
        );
    }

    #[test]
    fn kommandos_auf_unbekannte_verbindung() {
        let d = MessageDispatcher::neu(state());
        let id = ConnectionId::from(ClientId::new());
        let nachrichten = [
            ControlPayload::ToggleListen(ConnectionRef { id }),
            ControlPayload::ToggleTalk(ConnectionRef { id }),
            ControlPayload::SetVolume(SetVolumeRequest { id, volume: 0.5 }),
            ControlPayload::UpdateConnection(UpdateConnectionRequest {
                id,
                name: Some("X".to_string()),
                volume: None,
                listening: None,
                talking: None,
            }),
        ];
        for payload in nachrichten {
            let antwort = d.dispatch(ControlMessage::new(9, payload), &ctx()).unwrap();
            assert_eq!(fehler_code(&antwort), Some(ErrorCode::SessionNotFound));
        }
    }

    #[test]
    fn lautstaerke_ueber_dispatcher_begrenzt() {
        let state = state();
        let d = MessageDispatcher::neu(Arc::clone(&state));
        let ctx = ctx();
        anlegen(&d, &ctx, "usb0");
        let id = ConnectionId::from(ctx.client_id);

        d.dispatch(
            ControlMessage::new(2, ControlPayload::SetVolume(SetVolumeRequest { id, volume: 5.0 })),
            &ctx,
        );
        assert_eq!(state.registry.get(&id).unwrap().volume, 1.0);
    }

    #[test]
    fn ping_wird_mit_pong_beantwortet() {
        let d = MessageDispatcher::neu(state());
        let antwort = d.dispatch(ControlMessage::ping(5, 1234), &ctx()).unwrap();
        assert_eq!(antwort.request_id, 5);
        match antwort.payload {
            ControlPayload::Pong(p) => assert_eq!(p.echo_timestamp_ms, 1234),
            andere => panic!("Erwartet Pong, erhalten {}", andere.art()),
        }
        assert!(d.dispatch(ControlMessage::pong(5, 1, 2), &ctx()).is_none());
    }

    #[test]
    fn server_nachricht_vom_client_ist_ungueltig() {
        let d = MessageDispatcher::neu(state());
        let antwort = d
            .dispatch(
                ControlMessage::event(ControlPayload::SessionSnapshot(
                    emlink_protocol::control::SessionSnapshot {
                        connections: Vec::new(),
                    },
                )),
                &ctx(),
            )
            .unwrap();
        assert_eq!(fehler_code(&antwort), Some(ErrorCode::InvalidRequest));
    }

    #[test]
    fn ungueltiger_frame_wird_beantwortet() {
        let state = state();
        let d = MessageDispatcher::neu(Arc::clone(&state));
        let ctx = ctx();
        anlegen(&d, &ctx, "usb0");

        let antwort = d.ungueltig_beantworten(
            UngueltigerFrame {
                request_id: 4,
                grund: "unknown variant `muteAll`".to_string(),
            },
            &ctx,
        );
        assert_eq!(antwort.request_id, 4);
        assert_eq!(fehler_code(&antwort), Some(ErrorCode::InvalidRequest));
        assert_eq!(
            state
                .statistik
                .anzahl(UNGUELTIGE_NACHRICHT, KommandoErgebnis::Abgelehnt),
            1
        );
        // Bestehende Verbindung bleibt unberuehrt
        assert_eq!(state.registry.anzahl(), 1);
    }

    #[test]
    fn cleanup_entfernt_verbindung_und_beobachter() {
        let state = state();
        let d = MessageDispatcher::neu(Arc::clone(&state));
        let ctx = ctx();
        let _queue = state.beobachter_anmelden(ctx.client_id);
        anlegen(&d, &ctx, "usb0");

        d.client_cleanup(&ctx);
        assert_eq!(state.registry.anzahl(), 0);
        assert!(!state.hub.ist_angemeldet(&ctx.client_id));

        // Zweiter Aufruf ist unschaedlich
        d.client_cleanup(&ctx);
    }
}
