//! PCM-Framing fuer Mikrofon-Audio aus dem Browser
//!
//! Der Browser liefert rohe PCM-Bytes (i16 little-endian, 48 kHz, mono) in
//! beliebig grossen Stuecken. Der `FrameBuffer` schneidet daraus exakte
//! 20ms-Frames und behaelt den Rest fuer den naechsten Aufruf.

use funkbruecke_core::{FRAME_BYTES, FRAME_SAMPLES};

use crate::codec::PcmFrame;

/// Puffer fuer unvollstaendige PCM-Frames
///
/// Der zurueckbehaltene Rest ist immer kuerzer als ein Frame und hat eine
/// gerade Byte-Anzahl.
#[derive(Debug, Default, Clone)]
pub struct FrameBuffer {
    rest: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            rest: Vec::with_capacity(FRAME_BYTES),
        }
    }

    /// Haengt PCM-Bytes an und gibt alle vollstaendigen Frames zurueck
    pub fn push(&mut self, pcm: &[u8]) -> Vec<PcmFrame> {
        let mut daten = std::mem::take(&mut self.rest);
        daten.extend_from_slice(pcm);

        let mut frames = Vec::with_capacity(daten.len() / FRAME_BYTES);
        let mut chunks = daten.chunks_exact(FRAME_BYTES);
        for chunk in &mut chunks {
            let mut frame = [0i16; FRAME_SAMPLES];
            for (sample, bytes) in frame.iter_mut().zip(chunk.chunks_exact(2)) {
                *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
            }
            frames.push(frame);
        }

        // Ungerades Restbyte verwerfen
        let rest = chunks.remainder();
        let gerade = rest.len() & !1;
        self.rest.clear();
        self.rest.extend_from_slice(&rest[..gerade]);

        frames
    }

    /// Anzahl der zurueckbehaltenen Bytes
    pub fn rest_bytes(&self) -> usize {
        self.rest.len()
    }

    /// Verwirft den zurueckbehaltenen Rest
    pub fn leeren(&mut self) {
        self.rest.clear();
    }
}

/// Wandelt dekodierte Samples in i16-LE-Bytes fuer den Browser
pub fn pcm_zu_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    bytes
}
