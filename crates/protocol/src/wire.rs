//! Wire-Format fuer den TCP/TLS-Kontrollkanal
//!
//! Frame-basiertes Protokoll: Typ(u16 big-endian) + Laenge(u32 big-endian)
//! + Protobuf-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+--------+--------+----...----+
//! | Typ (u16 BE)    | Laenge (u32 BE)                   | Payload    |
//! +--------+--------+--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 6 Header-Bytes).

use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use crate::control::ControlMessage;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (8 MiB, Mumble-Servergrenze)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Groesse des Frame-Headers in Bytes
pub const HEADER_SIZE: usize = 6;

// ---------------------------------------------------------------------------
// MumbleCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer den Mumble-Kontrollkanal
///
/// Implementiert `Encoder<ControlMessage>` und `Decoder` fuer die Nutzung
/// mit `tokio_util::codec::Framed` ueber dem TLS-Stream.
#[derive(Debug, Clone)]
pub struct MumbleCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl MumbleCodec {
    /// Erstellt einen neuen `MumbleCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `MumbleCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for MumbleCodec {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Decoder-Implementierung
// ---------------------------------------------------------------------------

impl Decoder for MumbleCodec {
    type Item = ControlMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        // Header lesen ohne den Buffer zu veraendern
        let typ = u16::from_be_bytes([src[0], src[1]]);
        let length = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;

        if length > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame zu gross: {} Bytes (Maximum: {} Bytes)",
                    length, self.max_frame_size
                ),
            ));
        }

        let total_size = HEADER_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(length).freeze();

        // Ein kaputter Payload verwirft nur diesen Frame, nicht den Stream
        match ControlMessage::aus_frame(typ, payload.clone()) {
            Ok(nachricht) => Ok(Some(nachricht)),
            Err(e) => Ok(Some(ControlMessage::Fehlerhaft {
                typ,
                payload,
                fehler: e.to_string(),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Encoder-Implementierung
// ---------------------------------------------------------------------------

impl Encoder<ControlMessage> for MumbleCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload();

        if payload.len() > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Nachricht zu gross: {} Bytes (Maximum: {} Bytes)",
                    payload.len(),
                    self.max_frame_size
                ),
            ));
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u16(item.typ());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
