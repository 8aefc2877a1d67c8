//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task mit einer `ClientConnection`.
//! Registry und Hub sind `Send + Sync`, die Tasks laufen daher auf dem
//! Multi-Thread-Runtime.
//!
//! Beim Shutdown wartet der Server auf alle Verbindungs-Tasks, damit jeder
//! Client seinen Abschied erhaelt und seine Verbindung entfernt ist, bevor
//! `starten` zurueckkehrt.

use emlink_protocol::{control::ControlMessage, wire::FrameCodec};
use futures_util::SinkExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

use crate::connection::ClientConnection;
use crate::error::{SignalingError, SignalingResult};
use crate::server_state::{ClientPlatz, SignalingState};

/// Obergrenze fuer das Warten auf Verbindungs-Tasks beim Shutdown
const ABSCHLUSS_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP-Signaling-Server
pub struct SignalingServer {
    state: Arc<SignalingState>,
    listener: TcpListener,
}

impl SignalingServer {
    /// Bindet den Socket
    ///
    /// Port 0 waehlt einen freien Port (siehe `lokale_addr`).
    pub async fn binden(
        state: Arc<SignalingState>,
        bind_addr: SocketAddr,
    ) -> SignalingResult<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self { state, listener })
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_addr(&self) -> SignalingResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn starten(
        self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        tracing::info!(
            adresse = %self.lokale_addr()?,
            server = %self.state.config.server_name,
            "TCP Signaling-Server gestartet"
        );

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.annehmen(&mut tasks, stream, peer_addr, &shutdown_rx)
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Beendete Tasks laufend einsammeln
                Some(ergebnis) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = ergebnis {
                        tracing::warn!(fehler = %e, "Verbindungs-Task abgebrochen");
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        drop(self.listener);
        tasks_abschliessen(tasks).await;
        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }

    fn annehmen(
        &self,
        tasks: &mut JoinSet<()>,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: &tokio::sync::watch::Receiver<bool>,
    ) {
        // Platz synchron reservieren, damit ein Accept-Burst das Limit nicht umgeht
        let Some(platz) = self.state.platz_reservieren() else {
            tracing::warn!(
                peer = %peer_addr,
                max = self.state.config.max_clients,
                "Server voll, Verbindung abgelehnt"
            );
            tasks.spawn(server_voll_melden(stream));
            return;
        };

        tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
        let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr);
        let shutdown_rx = shutdown_rx.clone();
        tasks.spawn(async move {
            let _platz: ClientPlatz = platz;
            verbindung.verarbeiten(stream, shutdown_rx).await;
        });
    }
}

/// Wartet begrenzt auf alle Verbindungs-Tasks; Nachzuegler werden abgebrochen
async fn tasks_abschliessen(mut tasks: JoinSet<()>) {
    let offen = tasks.len();
    if offen == 0 {
        return;
    }
    tracing::debug!(offen, "Warte auf Verbindungs-Tasks");

    let warten = async {
        while let Some(ergebnis) = tasks.join_next().await {
            if let Err(e) = ergebnis {
                tracing::warn!(fehler = %e, "Verbindungs-Task abgebrochen");
            }
        }
    };
    if tokio::time::timeout(ABSCHLUSS_TIMEOUT, warten).await.is_err() {
        tracing::warn!(
            offen = tasks.len(),
            "Verbindungs-Tasks nicht rechtzeitig beendet, breche ab"
        );
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
    }
}

/// Sendet eine ServerFull-Antwort und schliesst die Verbindung
async fn server_voll_melden(stream: TcpStream) {
    let mut framed = Framed::new(stream, FrameCodec::new());
    let fehler = SignalingError::ServerVoll;
    let antwort = ControlMessage::error(0, fehler.fehler_code(), fehler.to_string());
    if let Err(e) = framed.send(antwort).await {
        tracing::debug!(fehler = %e, "ServerFull-Antwort nicht zustellbar");
    }
}
