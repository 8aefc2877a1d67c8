//! Wire-Format der Client-Verbindung
//!
//! Frame-basiertes Protokoll: Laenge (u32 big-endian) + JSON-Payload.
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! |   Laenge (u32 BE, ohne Kopf)      | JSON      |
//! +--------+--------+--------+--------+----...----+
//! ```

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::control::ControlMessage;

/// Standard-maximale Frame-Groesse (256 KiB reichen fuer grosse Snapshots)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

fn ungueltig(nachricht: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, nachricht)
}

/// tokio-util Codec fuer `Framed<TcpStream, FrameCodec>`
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Codec mit Standard-Limit
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Codec mit eigenem Limit
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Trennt den naechsten vollstaendigen Frame ab (ohne Laengen-Feld)
    fn frame_abtrennen(&self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if length > self.max_frame_size {
            return Err(ungueltig(format!(
                "Frame zu gross: {length} Bytes (Maximum: {} Bytes)",
                self.max_frame_size
            )));
        }

        let total = LENGTH_FIELD_SIZE + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        Ok(Some(src.split_to(length)))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = ControlMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(payload) = self.frame_abtrennen(src)? else {
            return Ok(None);
        };

        serde_json::from_slice(&payload)
            .map(Some)
            .map_err(|e| ungueltig(format!("JSON-Deserialisierung fehlgeschlagen: {e}")))
    }
}

impl Encoder<ControlMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&item)
            .map_err(|e| ungueltig(format!("JSON-Serialisierung fehlgeschlagen: {e}")))?;

        if json.len() > self.max_frame_size {
            return Err(ungueltig(format!(
                "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                json.len(),
                self.max_frame_size
            )));
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server-seitiger Eingang
// ---------------------------------------------------------------------------

/// Vollstaendig gelesener Frame, dessen Inhalt keine gueltige Nachricht ist
///
/// `request_id` ist aus dem JSON gerettet, sofern es lesbar war, sonst 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UngueltigerFrame {
    pub request_id: u32,
    pub grund: String,
}

/// Codec fuer die Server-Seite einer Client-Verbindung
///
/// Framing-Fehler (zu grosser Frame, IO) beenden den Stream wie bei
/// `FrameCodec`. Ein sauber gerahmter Frame mit unbekanntem `type` oder
/// ungueltigen Feldern wird dagegen als `Err(UngueltigerFrame)` geliefert,
/// damit die Verbindung beantworten und weiterlesen kann.
#[derive(Debug, Clone, Default)]
pub struct EingangsCodec {
    frames: FrameCodec,
}

impl EingangsCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            frames: FrameCodec::with_max_size(max_frame_size),
        }
    }
}

impl Decoder for EingangsCodec {
    type Item = Result<ControlMessage, UngueltigerFrame>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(payload) = self.frames.frame_abtrennen(src)? else {
            return Ok(None);
        };
        Ok(Some(nachricht_lesen(&payload)))
    }
}

impl Encoder<ControlMessage> for EingangsCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.frames.encode(item, dst)
    }
}

fn nachricht_lesen(payload: &[u8]) -> Result<ControlMessage, UngueltigerFrame> {
    let wert: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| UngueltigerFrame {
            request_id: 0,
            grund: format!("kein gueltiges JSON: {e}"),
        })?;

    let request_id = wert
        .get("request_id")
        .and_then(serde_json::Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .unwrap_or(0);

    serde_json::from_value(wert).map_err(|e| UngueltigerFrame {
        request_id,
        grund: format!("ungueltige Nachricht: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ConnectionRef, ControlPayload};
    use emlink_core::types::{ClientId, ConnectionId};

    fn toggle_nachricht(request_id: u32) -> ControlMessage {
        ControlMessage::new(
            request_id,
            ControlPayload::ToggleListen(ConnectionRef {
                id: ConnectionId::from(ClientId::new()),
            }),
        )
    }

    #[test]
    fn mehrere_frames_in_einem_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for i in 1..=3u32 {
            codec.encode(toggle_nachricht(i), &mut buf).unwrap();
        }

        for i in 1..=3u32 {
            let msg = codec.decode(&mut buf).unwrap().expect("Nachricht erwartet");
            assert_eq!(msg.request_id, i);
            assert!(matches!(msg.payload, ControlPayload::ToggleListen(_)));
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn unvollstaendiger_frame_wartet_auf_daten() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(toggle_nachricht(1), &mut buf).unwrap();

        let mut teil = buf.split_to(buf.len() - 3);
        assert!(codec.decode(&mut teil).unwrap().is_none());

        // Rest nachreichen
        teil.unsplit(buf);
        assert!(codec.decode(&mut teil).unwrap().is_some());
    }

    #[test]
    fn zu_grosser_frame_wird_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(16);
        let mut buf = BytesMut::new();
        buf.put_u32(17);
        buf.put_slice(&[b'x'; 17]);
        assert!(codec.decode(&mut buf).is_err());

        let mut ziel = BytesMut::new();
        assert!(codec.encode(toggle_nachricht(1), &mut ziel).is_err());
    }

    #[test]
    fn kaputtes_json_ist_fehler() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(5);
        buf.put_slice(b"{nope");
        assert!(codec.decode(&mut buf).is_err());
    }

    fn roh(json: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(json.len() as u32);
        buf.put_slice(json);
        buf
    }

    #[test]
    fn unbekannter_typ_beendet_eingang_nicht() {
        let mut codec = EingangsCodec::new();
        let mut buf = roh(br#"{"request_id":2,"payload":{"type":"muteAll"}}"#);
        codec.encode(toggle_nachricht(3), &mut buf).unwrap();

        let fehler = codec
            .decode(&mut buf)
            .unwrap()
            .expect("Frame erwartet")
            .unwrap_err();
        assert_eq!(fehler.request_id, 2);
        assert!(fehler.grund.contains("muteAll"), "{}", fehler.grund);

        // Der naechste Frame im selben Buffer ist unberuehrt
        let naechste = codec.decode(&mut buf).unwrap().expect("Frame erwartet").unwrap();
        assert_eq!(naechste.request_id, 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn falscher_feldtyp_rettet_request_id() {
        let mut codec = EingangsCodec::new();
        let mut buf = roh(
            br#"{"request_id":7,"payload":{"type":"setVolume","id":"x","volume":"laut"}}"#,
        );
        let fehler = codec.decode(&mut buf).unwrap().unwrap().unwrap_err();
        assert_eq!(fehler.request_id, 7);
    }

    #[test]
    fn kaputtes_json_im_eingang_hat_request_id_null() {
        let mut codec = EingangsCodec::new();
        let mut buf = roh(b"{nope");
        let fehler = codec.decode(&mut buf).unwrap().unwrap().unwrap_err();
        assert_eq!(fehler.request_id, 0);
    }

    #[test]
    fn zu_grosser_frame_bleibt_im_eingang_fatal() {
        let mut codec = EingangsCodec::with_max_size(16);
        let mut buf = roh(&[b'x'; 17]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
