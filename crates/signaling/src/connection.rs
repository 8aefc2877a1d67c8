//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Beim Aufbau wird der Client als Beobachter am Hub
//! angemeldet (Geraete- und Sitzungs-Snapshot), beim Abbau wird seine
//! Verbindung aus der Registry entfernt.
//!
//! Ein sauber gerahmter, aber unlesbarer Frame (unbekannter `type`, falscher
//! Feldtyp) wird mit `INVALID_REQUEST` beantwortet; die Verbindung bleibt offen.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Jeder empfangene Frame zaehlt als Lebenszeichen
//! - Nach `verbindungs_timeout_sek` ohne Frame wird die Verbindung getrennt

use emlink_core::types::ClientId;
use emlink_protocol::{
    control::{ControlMessage, ErrorCode},
    wire::EingangsCodec,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::broadcast::HubEvent;
use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::error::SignalingResult;
use crate::server_state::SignalingState;

type ClientFramed = Framed<TcpStream, EingangsCodec>;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via `EingangsCodec`, dispatcht an `MessageDispatcher`,
/// liefert Hub-Events aus und sendet Antworten zurueck.
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    client_id: ClientId,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer Client-Identitaet
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            client_id: ClientId::new(),
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung getrennt wird oder ein Shutdown-Signal
    /// eingeht. Danach wird die Verbindung des Clients immer entfernt.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(peer = %peer_addr, client = %self.client_id, "Neue Verbindung");

        let mut framed = Framed::new(stream, EingangsCodec::new());
        let ctx = DispatcherContext::neu(self.client_id, peer_addr);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));
        let queue = self.state.beobachter_anmelden(self.client_id);

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + keepalive_intervall;
        let mut ping_request_id: u32 = 0;

        loop {
            let jetzt = Instant::now();

            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                break;
            }

            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(Ok(nachricht))) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                peer = %peer_addr,
                                request_id = nachricht.request_id,
                                art = nachricht.payload.art(),
                                "Nachricht empfangen"
                            );

                            if let Some(antwort) = dispatcher.dispatch(nachricht, &ctx) {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }
                        }
                        Some(Ok(Err(ungueltig))) => {
                            letzter_empfang = Instant::now();
                            let antwort = dispatcher.ungueltig_beantworten(ungueltig, &ctx);
                            if let Err(e) = framed.send(antwort).await {
                                tracing::warn!(peer = %peer_addr, fehler = %e, "Senden fehlgeschlagen");
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Events aus dem Hub
                event = queue.empfangen() => {
                    match event {
                        Some(HubEvent::Nachholen) => {
                            self.state.beobachter_nachholen(&queue);
                        }
                        Some(event) => {
                            if let Err(e) = hub_event_senden(&mut framed, event).await {
                                tracing::warn!(peer = %peer_addr, fehler = %e, "Broadcast-Senden fehlgeschlagen");
                                break;
                            }
                        }
                        None => {
                            tracing::debug!(peer = %peer_addr, "Beobachter-Queue geschlossen");
                            break;
                        }
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if Instant::now() >= naechster_ping {
                        ping_request_id = ping_request_id.wrapping_add(1);
                        let ts = chrono::Utc::now().timestamp_millis().max(0) as u64;
                        if let Err(e) = framed.send(ControlMessage::ping(ping_request_id, ts)).await {
                            tracing::warn!(peer = %peer_addr, fehler = %e, "Ping-Senden fehlgeschlagen");
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal, Verbindung wird getrennt");
                        let abschied = ControlMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende (Verbindung entfernen, Beobachter abmelden)
        dispatcher.client_cleanup(&ctx);
        tracing::info!(peer = %peer_addr, client = %self.client_id, "Verbindungs-Task beendet");
    }
}

/// Schreibt alle Nachrichten eines Hub-Eintrags und flusht einmal
async fn hub_event_senden(framed: &mut ClientFramed, event: HubEvent) -> SignalingResult<()> {
    for nachricht in event.in_nachrichten() {
        framed.feed(nachricht).await?;
    }
    framed.flush().await?;
    Ok(())
}
