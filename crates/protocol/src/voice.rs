//! Voice-Protokoll (Legacy-Format, getunnelt ueber TCP)
//!
//! Definiert die binaere Paketstruktur fuer Sprachdaten, wie sie im
//! `UDPTunnel`-Frame transportiert wird. Opus-Encoding erfolgt in der Bruecke.
//!
//! ## Paketformat (Client -> Server)
//!
//! ```text
//! Feld          Typ      Beschreibung
//! ----------    ------   -----------
//! Header        u8       Typ (obere 3 Bit, 4 = Opus) | Ziel (untere 5 Bit)
//! Sequenz       varint   Frame-Zaehler (10ms-Einheiten)
//! Opus-Header   varint   Laenge | 0x2000 fuer den letzten Frame
//! Nutzdaten     N        Opus-Bytes
//! ```
//!
//! Server -> Client traegt zusaetzlich direkt nach dem Header die Session
//! des Absenders als varint. Das Ziel-Feld ist dort der Kontext
//! (0 = normal, 1..=30 = Whisper, 31 = Loopback).

use std::io;

/// Pakettyp fuer Opus in den oberen drei Header-Bits
pub const AUDIO_TYP_OPUS: u8 = 4;

/// Pakettyp fuer UDP-Pings (werden ueber TCP nicht erwartet, aber toleriert)
pub const AUDIO_TYP_PING: u8 = 1;

/// Markiert im Opus-Header den letzten Frame eines Sprachstroms
pub const TERMINATOR_BIT: u64 = 0x2000;

/// Maximale Opus-Nutzdatenlaenge (13 Bit im Opus-Header)
pub const MAX_OPUS_LAENGE: usize = 0x1FFF;

/// Normales Sprechen ohne Whisper-Ziel
pub const ZIEL_NORMAL: u8 = 0;

// ---------------------------------------------------------------------------
// Varint (Mumble-eigene Kodierung, nicht Protobuf)
// ---------------------------------------------------------------------------

/// Schreibt eine nicht-negative Zahl im Mumble-Varint-Format
pub fn varint_schreiben(buf: &mut Vec<u8>, wert: u64) {
    if wert < 0x80 {
        buf.push(wert as u8);
    } else if wert < 0x4000 {
        buf.push(((wert >> 8) as u8) | 0x80);
        buf.push(wert as u8);
    } else if wert < 0x20_0000 {
        buf.push(((wert >> 16) as u8) | 0xC0);
        buf.push((wert >> 8) as u8);
        buf.push(wert as u8);
    } else if wert < 0x1000_0000 {
        buf.push(((wert >> 24) as u8) | 0xE0);
        buf.push((wert >> 16) as u8);
        buf.push((wert >> 8) as u8);
        buf.push(wert as u8);
    } else if wert <= u32::MAX as u64 {
        buf.push(0xF0);
        buf.extend_from_slice(&(wert as u32).to_be_bytes());
    } else {
        buf.push(0xF4);
        buf.extend_from_slice(&wert.to_be_bytes());
    }
}

/// Liest eine Mumble-Varint und gibt (Wert, gelesene Bytes) zurueck
///
/// # Fehler
/// - `UnexpectedEof` wenn die Varint abgeschnitten ist
/// - `InvalidData` bei verschachtelter Negation oder nicht negierbarem Wert
pub fn varint_lesen(buf: &[u8]) -> io::Result<(i64, usize)> {
    let b0 = *buf.first().ok_or_else(abgeschnitten)?;

    if b0 & 0xFC != 0xF8 {
        return varint_einfach_lesen(buf);
    }

    // Negative Zahl: genau eine Ebene, die innere Form darf selbst nicht negativ sein
    let innen = buf.get(1..).ok_or_else(abgeschnitten)?;
    if innen.first().is_some_and(|b| b & 0xF8 == 0xF8) {
        return Err(ungueltige_varint("verschachtelte Negation"));
    }
    let (wert, n) = varint_einfach_lesen(innen)?;
    let negiert = wert
        .checked_neg()
        .ok_or_else(|| ungueltige_varint("Wert nicht negierbar"))?;
    Ok((negiert, n + 1))
}

/// Alle Formen ausser der Negation mit Praefix `0xF8`
fn varint_einfach_lesen(buf: &[u8]) -> io::Result<(i64, usize)> {
    let b0 = *buf.first().ok_or_else(abgeschnitten)?;

    let bytes = |n: usize| -> io::Result<&[u8]> { buf.get(1..=n).ok_or_else(abgeschnitten) };

    if b0 & 0x80 == 0 {
        Ok(((b0 & 0x7F) as i64, 1))
    } else if b0 & 0xC0 == 0x80 {
        let b = bytes(1)?;
        Ok(((((b0 & 0x3F) as i64) << 8) | b[0] as i64, 2))
    } else if b0 & 0xE0 == 0xC0 {
        let b = bytes(2)?;
        Ok(((((b0 & 0x1F) as i64) << 16) | (b[0] as i64) << 8 | b[1] as i64, 3))
    } else if b0 & 0xF0 == 0xE0 {
        let b = bytes(3)?;
        Ok((
            (((b0 & 0x0F) as i64) << 24) | (b[0] as i64) << 16 | (b[1] as i64) << 8 | b[2] as i64,
            4,
        ))
    } else if b0 & 0xFC == 0xF0 {
        let b = bytes(4)?;
        Ok((u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64, 5))
    } else if b0 & 0xFC == 0xF4 {
        let b = bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok((u64::from_be_bytes(arr) as i64, 9))
    } else if b0 & 0xFC == 0xF8 {
        Err(ungueltige_varint("unerwartete Negation"))
    } else {
        // 0xFC..=0xFF: byte-invertierte Zwei-Bit-Zahl
        Ok((!((b0 & 0x03) as i64), 1))
    }
}

fn ungueltige_varint(grund: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("Ungueltige Varint: {grund}"))
}

fn abgeschnitten() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "Varint abgeschnitten")
}

fn nicht_negativ(wert: i64, feld: &str) -> io::Result<u64> {
    u64::try_from(wert).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Negativer Wert im Feld {}: {}", feld, wert),
        )
    })
}

// ---------------------------------------------------------------------------
// Ausgehende Pakete
// ---------------------------------------------------------------------------

/// Ein zu sendender Opus-Frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AusgehendesAudio<'a> {
    /// Whisper-Slot (0 = normales Sprechen)
    pub ziel: u8,
    /// Sequenznummer in 10ms-Einheiten
    pub sequenz: u64,
    /// Opus-Nutzdaten
    pub opus: &'a [u8],
    /// Letzter Frame des Sprachstroms
    pub letzter: bool,
}

impl AusgehendesAudio<'_> {
    /// Serialisiert das Paket fuer den `UDPTunnel`
    ///
    /// # Fehler
    /// - `InvalidData` bei Nutzdaten ueber `MAX_OPUS_LAENGE` oder Ziel > 31
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        if self.opus.len() > MAX_OPUS_LAENGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Opus-Nutzdaten zu lang: {} Bytes (Maximum {})",
                    self.opus.len(),
                    MAX_OPUS_LAENGE
                ),
            ));
        }
        if self.ziel > 31 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ungueltiges Ziel: {}", self.ziel),
            ));
        }

        let mut buf = Vec::with_capacity(1 + 9 + 2 + self.opus.len());
        buf.push((AUDIO_TYP_OPUS << 5) | self.ziel);
        varint_schreiben(&mut buf, self.sequenz);

        let mut opus_header = self.opus.len() as u64;
        if self.letzter {
            opus_header |= TERMINATOR_BIT;
        }
        varint_schreiben(&mut buf, opus_header);
        buf.extend_from_slice(self.opus);
        Ok(buf)
    }
}

// ---------------------------------------------------------------------------
// Eingehende Pakete
// ---------------------------------------------------------------------------

/// Ein empfangener Opus-Frame eines anderen Teilnehmers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EingehendesAudio {
    /// Empfangskontext (0 = normal, 1..=30 = Whisper)
    pub kontext: u8,
    /// Session-ID des Absenders auf dem Voice-Server
    pub session: u32,
    /// Sequenznummer des Absenders
    pub sequenz: u64,
    /// Opus-Nutzdaten
    pub opus: Vec<u8>,
    /// Letzter Frame des Sprachstroms
    pub letzter: bool,
}

impl EingehendesAudio {
    /// Deserialisiert ein Paket aus dem `UDPTunnel`
    ///
    /// Gibt `Ok(None)` fuer Pakete zurueck, die kein Opus enthalten
    /// (CELT, Speex, Ping).
    ///
    /// # Fehler
    /// - `UnexpectedEof` bei abgeschnittenen Paketen
    /// - `InvalidData` bei negativen Feldwerten
    pub fn decode(buf: &[u8]) -> io::Result<Option<Self>> {
        let header = *buf.first().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "Leeres Voice-Paket")
        })?;

        let typ = header >> 5;
        if typ != AUDIO_TYP_OPUS {
            return Ok(None);
        }
        let kontext = header & 0x1F;

        let mut pos = 1;
        let (session, n) = varint_lesen(&buf[pos..])?;
        pos += n;
        let (sequenz, n) = varint_lesen(&buf[pos..])?;
        pos += n;
        let (opus_header, n) = varint_lesen(&buf[pos..])?;
        pos += n;

        let session = nicht_negativ(session, "session")?;
        let session = u32::try_from(session).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Session ausserhalb des Wertebereichs: {}", session),
            )
        })?;
        let sequenz = nicht_negativ(sequenz, "sequenz")?;
        let opus_header = nicht_negativ(opus_header, "opus_header")?;

        let laenge = (opus_header & MAX_OPUS_LAENGE as u64) as usize;
        let letzter = opus_header & TERMINATOR_BIT != 0;

        let opus = buf.get(pos..pos + laenge).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Opus-Nutzdaten abgeschnitten: erwartet {} Bytes, vorhanden {}",
                    laenge,
                    buf.len().saturating_sub(pos)
                ),
            )
        })?;

        // Positionsdaten nach den Nutzdaten werden ignoriert
        Ok(Some(Self {
            kontext,
            session,
            sequenz,
            opus: opus.to_vec(),
            letzter,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
